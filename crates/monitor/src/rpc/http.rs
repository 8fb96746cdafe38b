use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mintwatch_domain::decoder::parse_quantity;
use mintwatch_domain::RawLog;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use url::Url;

use super::types::{JsonRpcRequest, JsonRpcResponse, LogFilter};
use super::{LogSource, TransportError};

/// JSON-RPC over HTTP POST.
pub struct HttpLedgerClient {
    url: Url,
    http: reqwest::Client,
    filter: LogFilter,
    next_id: AtomicU64,
}

impl HttpLedgerClient {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(url: Url, filter: LogFilter, timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url,
            http,
            filter,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<P, R>(&self, method: &'static str, params: P) -> Result<R, TransportError>
    where
        P: Serialize + Send + Sync,
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let response = self
            .http
            .post(self.url.clone())
            .json(&JsonRpcRequest::new(id, method, params))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Http(format!(
                "HTTP {}: {body}",
                status.as_u16()
            )));
        }

        response.json::<JsonRpcResponse<R>>().await?.into_result()
    }
}

#[async_trait]
impl LogSource for HttpLedgerClient {
    async fn current_height(&self) -> Result<u64, TransportError> {
        let hex: String = self.call("eth_blockNumber", json!([])).await?;
        parse_quantity("blockNumber", &hex)
            .map_err(|err| TransportError::InvalidResponse(err.to_string()))
    }

    async fn fetch_range(&self, from: u64, to: u64) -> Result<Vec<RawLog>, TransportError> {
        self.call("eth_getLogs", [self.filter.range_params(from, to)])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::CONTRACT;
    use crate::sink::tests::one_shot_server;
    use mintwatch_domain::Address;
    use std::str::FromStr;

    fn client(url: Url) -> HttpLedgerClient {
        let filter = LogFilter::mints(Address::from_str(CONTRACT).unwrap());
        HttpLedgerClient::new(url, filter, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn current_height_parses_hex_quantity() {
        let (url, server) =
            one_shot_server("200 OK", r#"{"jsonrpc":"2.0","id":1,"result":"0x12a05f2"}"#).await;

        assert_eq!(client(url).current_height().await, Ok(19_531_250));
        assert!(server.await.unwrap().contains(r#""method":"eth_blockNumber""#));
    }

    #[tokio::test]
    async fn fetch_range_sends_hex_block_bounds() {
        let (url, server) =
            one_shot_server("200 OK", r#"{"jsonrpc":"2.0","id":1,"result":[]}"#).await;

        assert_eq!(client(url).fetch_range(100, 105).await, Ok(Vec::new()));
        let request = server.await.unwrap();
        assert!(request.contains(r#""method":"eth_getLogs""#));
        assert!(request.contains(r#""fromBlock":"0x64""#));
        assert!(request.contains(r#""toBlock":"0x69""#));
    }

    #[tokio::test]
    async fn non_success_status_is_http_error() {
        let (url, server) = one_shot_server("502 Bad Gateway", "upstream unavailable").await;

        match client(url).current_height().await {
            Err(TransportError::Http(message)) => {
                assert!(message.starts_with("HTTP 502"));
                assert!(message.contains("upstream unavailable"));
            }
            other => panic!("expected http error, got {other:?}"),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn json_rpc_error_object_is_surfaced() {
        let body = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32005,"message":"query returned more than 10000 results"}}"#;
        let (url, server) = one_shot_server("200 OK", body).await;

        assert_eq!(
            client(url).fetch_range(0, 1_000_000).await,
            Err(TransportError::Rpc {
                code: -32005,
                message: "query returned more than 10000 results".to_string(),
            })
        );
        server.await.unwrap();
    }

    #[tokio::test]
    async fn malformed_height_is_invalid_response() {
        let (url, server) =
            one_shot_server("200 OK", r#"{"jsonrpc":"2.0","id":1,"result":"latest"}"#).await;

        assert!(matches!(
            client(url).current_height().await,
            Err(TransportError::InvalidResponse(_))
        ));
        server.await.unwrap();
    }
}
