use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use mintwatch_domain::decoder::parse_quantity;
use mintwatch_domain::RawLog;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};
use url::Url;

use super::types::{parse_notification, JsonRpcRequest, JsonRpcResponse, LogFilter};
use super::{LogSource, LogStream, StreamEvent, Subscription, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// JSON-RPC over WebSocket. Subscriptions hold a dedicated connection owned
/// by a background task; range queries open a short-lived connection each.
pub struct WsLedgerClient {
    url: Url,
    filter: LogFilter,
    request_timeout: Duration,
    buffer: usize,
    next_id: AtomicU64,
}

impl WsLedgerClient {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DEFAULT_BUFFER: usize = 1024;

    pub fn new(url: Url, filter: LogFilter) -> Self {
        Self {
            url,
            filter,
            request_timeout: Self::DEFAULT_TIMEOUT,
            buffer: Self::DEFAULT_BUFFER,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn open(&self) -> Result<WsStream, TransportError> {
        let (stream, _) = timeout(self.request_timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| TransportError::Timeout)??;
        Ok(stream)
    }

    async fn request<P, R>(
        &self,
        stream: &mut WsStream,
        method: &'static str,
        params: P,
    ) -> Result<R, TransportError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let id = self.next_id();
        let payload = serde_json::to_string(&JsonRpcRequest::new(id, method, params))
            .map_err(|err| TransportError::InvalidResponse(err.to_string()))?;
        stream.send(Message::Text(payload.into())).await?;
        timeout(self.request_timeout, await_response(stream, id))
            .await
            .map_err(|_| TransportError::Timeout)?
    }

    async fn one_shot<P, R>(&self, method: &'static str, params: P) -> Result<R, TransportError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let mut stream = self.open().await?;
        let result = self.request(&mut stream, method, params).await;
        let _ = stream.close(None).await;
        result
    }
}

#[async_trait]
impl LogSource for WsLedgerClient {
    async fn current_height(&self) -> Result<u64, TransportError> {
        let hex: String = self.one_shot("eth_blockNumber", json!([])).await?;
        parse_quantity("blockNumber", &hex)
            .map_err(|err| TransportError::InvalidResponse(err.to_string()))
    }

    async fn fetch_range(&self, from: u64, to: u64) -> Result<Vec<RawLog>, TransportError> {
        self.one_shot("eth_getLogs", [self.filter.range_params(from, to)])
            .await
    }
}

#[async_trait]
impl LogStream for WsLedgerClient {
    async fn subscribe(&self) -> Result<Subscription, TransportError> {
        let mut stream = self.open().await?;
        let subscription: String = self
            .request(
                &mut stream,
                "eth_subscribe",
                json!(["logs", self.filter.subscription_params()]),
            )
            .await?;
        debug!(subscription = %subscription, url = %self.url, "log subscription established");

        let (events_tx, events_rx) = mpsc::channel(self.buffer);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let task = tokio::spawn(pump(
            stream,
            subscription.clone(),
            events_tx,
            cancel_rx,
            self.next_id(),
        ));

        Ok(Subscription::new(subscription, events_rx, cancel_tx).with_task(task))
    }
}

async fn await_response<R>(stream: &mut WsStream, id: u64) -> Result<R, TransportError>
where
    R: DeserializeOwned,
{
    while let Some(message) = stream.next().await {
        match message? {
            Message::Text(text) => {
                let Ok(response) = serde_json::from_str::<JsonRpcResponse<R>>(&text) else {
                    continue;
                };
                if response.id == Some(id) {
                    return response.into_result();
                }
            }
            Message::Close(_) => {
                return Err(TransportError::WebSocket(
                    "closed before response".to_string(),
                ))
            }
            _ => {}
        }
    }
    Err(TransportError::WebSocket(
        "stream ended before response".to_string(),
    ))
}

/// Forwards notifications until the server drops the connection or the
/// handle is cancelled, in which case it unsubscribes and closes.
async fn pump(
    stream: WsStream,
    subscription: String,
    events: mpsc::Sender<StreamEvent>,
    mut cancel: oneshot::Receiver<()>,
    unsubscribe_id: u64,
) {
    let (mut write, mut read) = stream.split();

    let reason = loop {
        tokio::select! {
            biased;
            _ = &mut cancel => {
                let request =
                    JsonRpcRequest::new(unsubscribe_id, "eth_unsubscribe", [subscription.as_str()]);
                if let Ok(payload) = serde_json::to_string(&request) {
                    let _ = write.send(Message::Text(payload.into())).await;
                }
                let _ = write.close().await;
                debug!(subscription = %subscription, "log subscription closed");
                return;
            }
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => match parse_notification(&text, &subscription) {
                    Some(Ok(log)) => {
                        if events.send(StreamEvent::Log(log)).await.is_err() {
                            let _ = write.close().await;
                            return;
                        }
                    }
                    Some(Err(err)) => warn!(%err, subscription = %subscription, "dropping malformed notification"),
                    None => trace!("ignoring non-notification message"),
                },
                Some(Ok(Message::Close(frame))) => break format!("closed by server: {frame:?}"),
                Some(Ok(_)) => {}
                Some(Err(err)) => break err.to_string(),
                None => break "stream ended".to_string(),
            }
        }
    };

    let _ = events.send(StreamEvent::Closed(reason)).await;
}
