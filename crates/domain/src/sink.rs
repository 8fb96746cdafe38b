use async_trait::async_trait;
use thiserror::Error;

use crate::model::MintEvent;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("delivery failed: {0}")]
    Delivery(String),
    #[error("sink rejected event with status {0}")]
    Rejected(u16),
}

impl SinkError {
    pub fn from_source(err: impl std::fmt::Display) -> Self {
        Self::Delivery(err.to_string())
    }
}

/// Downstream channel that announces mints. The engine calls it once per
/// novel event and never retries; retry policy belongs to the sink.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: &MintEvent) -> Result<(), SinkError>;
}
