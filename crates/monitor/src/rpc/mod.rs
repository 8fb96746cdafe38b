//! Ledger transports. Polling and streaming are two capability sets behind
//! one [`LedgerClient`] value so the engine never branches on mode flags.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mintwatch_domain::RawLog;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::warn;

mod http;
mod types;
mod ws;

pub use http::HttpLedgerClient;
pub use types::{JsonRpcRequest, JsonRpcResponse, LogFilter};
pub use ws::WsLedgerClient;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("http error: {0}")]
    Http(String),
    #[error("websocket error: {0}")]
    WebSocket(String),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("request timed out")]
    Timeout,
}

impl From<reqwest::Error> for TransportError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(value.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(value.to_string())
    }
}

/// Request/response access to the ledger.
#[async_trait]
pub trait LogSource: Send + Sync {
    async fn current_height(&self) -> Result<u64, TransportError>;

    /// Transfer logs of the watched contract in `[from, to]`, inclusive.
    async fn fetch_range(&self, from: u64, to: u64) -> Result<Vec<RawLog>, TransportError>;
}

/// Push access to the ledger.
#[async_trait]
pub trait LogStream: Send + Sync {
    /// Opens a live subscription. Entries may arrive out of order and may be
    /// redelivered across subscriptions.
    async fn subscribe(&self) -> Result<Subscription, TransportError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Log(RawLog),
    /// The transport dropped; no further events follow.
    Closed(String),
}

/// Handle to a live subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: String,
    events: mpsc::Receiver<StreamEvent>,
    cancel: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(
        id: impl Into<String>,
        events: mpsc::Receiver<StreamEvent>,
        cancel: oneshot::Sender<()>,
    ) -> Self {
        Self {
            id: id.into(),
            events,
            cancel: Some(cancel),
            task: None,
        }
    }

    /// Attaches the transport task so [`Subscription::close`] can wait for it.
    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.task = Some(task);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn next(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// Asks the transport task to unsubscribe and close. Idempotent.
    pub fn unsubscribe(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        self.events.close();
    }

    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }

    /// Unsubscribes and waits up to `grace` for the transport task to finish
    /// its teardown.
    pub async fn close(mut self, grace: Duration) {
        self.unsubscribe();
        let Some(task) = self.task.take() else {
            return;
        };
        if timeout(grace, task).await.is_err() {
            warn!(subscription = %self.id, "transport did not close within grace period");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// The transport personality an engine runs against.
#[derive(Clone)]
pub enum LedgerClient {
    Polling(Arc<dyn LogSource>),
    Streaming {
        stream: Arc<dyn LogStream>,
        /// Range queries used to close gaps after a re-subscribe.
        reconcile: Option<Arc<dyn LogSource>>,
    },
}

/// Fetches `[from, to]` in chunks of at most `max_range` blocks. Any chunk
/// failure fails the whole range.
pub async fn fetch_chunked(
    source: &dyn LogSource,
    from: u64,
    to: u64,
    max_range: u64,
) -> Result<Vec<RawLog>, TransportError> {
    if to < from {
        return Ok(Vec::new());
    }
    let span = max_range.max(1);
    let mut logs = Vec::new();
    let mut start = from;
    loop {
        let end = start.saturating_add(span - 1).min(to);
        logs.extend(source.fetch_range(start, end).await?);
        if end == to {
            break;
        }
        start = end + 1;
    }
    Ok(logs)
}
