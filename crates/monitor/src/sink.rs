use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mintwatch_domain::config::MonitorConfig;
use mintwatch_domain::{MintEvent, NotificationSink, SinkError};
use tracing::info;
use url::Url;

/// Announces mints through the log pipeline only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn notify(&self, event: &MintEvent) -> Result<(), SinkError> {
        info!(
            target: "mintwatch::mint",
            token_id = %event.token_id(),
            minter = %event.minter(),
            block = event.block_height(),
            tx = %event.tx_hash(),
            "new mint"
        );
        Ok(())
    }
}

/// POSTs each event as JSON.
pub struct WebhookSink {
    url: Url,
    http: reqwest::Client,
}

impl WebhookSink {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(url: Url) -> Result<Self, SinkError> {
        let http = reqwest::Client::builder()
            .timeout(Self::DEFAULT_TIMEOUT)
            .build()
            .map_err(SinkError::from_source)?;
        Ok(Self { url, http })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn notify(&self, event: &MintEvent) -> Result<(), SinkError> {
        let response = self
            .http
            .post(self.url.clone())
            .json(event)
            .send()
            .await
            .map_err(SinkError::from_source)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}

/// Webhook when one is configured, the log otherwise.
pub fn build_sink(config: &MonitorConfig) -> Result<Arc<dyn NotificationSink>, SinkError> {
    Ok(match config.webhook_url() {
        Some(url) => Arc::new(WebhookSink::new(url.clone())?),
        None => Arc::new(LogSink),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pipeline::tests::{mint_log, CONTRACT};
    use mintwatch_domain::{Address, EventDecoder};
    use std::str::FromStr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn event() -> MintEvent {
        let decoder = EventDecoder::new(Address::from_str(CONTRACT).unwrap());
        MintEvent::from_record(decoder.decode(&mint_log(42, 103)).unwrap()).unwrap()
    }

    /// Accepts one request, answers with `status` and `body`, and returns
    /// the raw request.
    pub(crate) async fn one_shot_server(
        status: &'static str,
        body: &'static str,
    ) -> (Url, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = Url::parse(&format!("http://{}/hook", listener.local_addr().unwrap())).unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let mut request = Vec::new();
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(split) = text.find("\r\n\r\n") {
                    let length = text
                        .lines()
                        .find_map(|line| {
                            line.to_ascii_lowercase()
                                .strip_prefix("content-length:")
                                .map(|value| value.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if request.len() >= split + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });
        (url, handle)
    }

    #[tokio::test]
    async fn log_sink_always_accepts() {
        assert_eq!(LogSink.notify(&event()).await, Ok(()));
    }

    #[tokio::test]
    async fn webhook_posts_event_json() {
        let (url, server) = one_shot_server("200 OK", "").await;
        let sink = WebhookSink::new(url).unwrap();

        sink.notify(&event()).await.expect("delivered");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /hook"));
        assert!(request.contains("\"tokenId\":\"42\""));
        assert!(request.contains("\"blockHeight\":103"));
    }

    #[tokio::test]
    async fn webhook_reports_rejection_status() {
        let (url, server) = one_shot_server("503 Service Unavailable", "").await;
        let sink = WebhookSink::new(url).unwrap();

        assert_eq!(sink.notify(&event()).await, Err(SinkError::Rejected(503)));
        server.await.unwrap();
    }
}
