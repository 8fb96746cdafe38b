use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use mintwatch_domain::config::{ConfigError, MonitorConfig, MonitorMode};
use mintwatch_domain::decoder::parse_quantity;
use mintwatch_domain::services::telemetry::TelemetryError;
use mintwatch_domain::{
    Cursor, CursorError, CursorStore, DedupCache, EventDecoder, InMemoryCursorStore,
    NotificationSink, RawLog, SinkError,
};
use thiserror::Error;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::pipeline::{BatchSummary, EntryPipeline};
use crate::rpc::{
    fetch_chunked, HttpLedgerClient, LedgerClient, LogFilter, LogSource, LogStream, StreamEvent,
    Subscription, TransportError, WsLedgerClient,
};
use crate::supervisor::ReconnectSupervisor;

/// How long shutdown waits for the transport to unsubscribe and close.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("cursor error: {0}")]
    Cursor(#[from] CursorError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),
    #[error("endpoint `{url}` cannot serve {mode:?} mode")]
    Scheme { url: String, mode: MonitorMode },
}

/// Result of one polling tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// First successful query set the cursor; nothing was scanned.
    Initialized(Cursor),
    /// The tip has not moved past the cursor.
    Idle,
    Advanced {
        from: u64,
        to: u64,
        summary: BatchSummary,
    },
}

/// Pull-mode engine. Each tick runs to completion before the next starts,
/// which makes it the cursor's only writer.
pub struct PollingEngine<C = InMemoryCursorStore> {
    source: Arc<dyn LogSource>,
    cursor: C,
    pipeline: EntryPipeline,
    start_height: Option<u64>,
    max_block_range: u64,
}

impl<C: CursorStore> PollingEngine<C> {
    pub fn new(
        source: Arc<dyn LogSource>,
        cursor: C,
        pipeline: EntryPipeline,
        start_height: Option<u64>,
        max_block_range: u64,
    ) -> Self {
        Self {
            source,
            cursor,
            pipeline,
            start_height,
            max_block_range,
        }
    }

    pub fn cursor(&self) -> Option<Cursor> {
        self.cursor.get()
    }

    /// Operator override for the cursor, including rewinds.
    pub fn reset_cursor(&mut self, height: u64) -> Cursor {
        warn!(height, "cursor reset by operator");
        self.cursor.reset(height)
    }

    /// One polling cycle. On error the cursor is left untouched so the same
    /// range is retried on the next tick.
    pub async fn tick(&mut self) -> Result<TickOutcome, MonitorError> {
        let tip = match self.source.current_height().await {
            Ok(tip) => {
                counter!("monitor_rpc_calls_total", "result" => "ok").increment(1);
                tip
            }
            Err(err) => {
                counter!("monitor_rpc_calls_total", "result" => "error").increment(1);
                return Err(err.into());
            }
        };

        let Some(cursor) = self.cursor.get() else {
            let cursor = self.cursor.initialize(self.start_height.unwrap_or(tip));
            info!(
                height = cursor.last_confirmed_height,
                explicit = self.start_height.is_some(),
                "cursor initialized"
            );
            gauge!("monitor_last_height").set(cursor.last_confirmed_height as f64);
            return Ok(TickOutcome::Initialized(cursor));
        };

        if tip <= cursor.last_confirmed_height {
            debug!(tip, cursor = cursor.last_confirmed_height, "no new blocks");
            return Ok(TickOutcome::Idle);
        }

        let from = cursor.next_height();
        debug!(from_height = from, to_height = tip, "scanning range");
        let logs = match fetch_chunked(self.source.as_ref(), from, tip, self.max_block_range).await
        {
            Ok(logs) => {
                counter!("monitor_rpc_calls_total", "result" => "ok").increment(1);
                logs
            }
            Err(err) => {
                counter!("monitor_rpc_calls_total", "result" => "error").increment(1);
                return Err(err.into());
            }
        };

        let summary = self.pipeline.process_batch(logs).await;
        let cursor = self.cursor.advance(tip)?;
        gauge!("monitor_last_height").set(cursor.last_confirmed_height as f64);
        if summary.emitted > 0 {
            info!(
                from_height = from,
                to_height = tip,
                emitted = summary.emitted,
                "range processed"
            );
        }

        Ok(TickOutcome::Advanced {
            from,
            to: tip,
            summary,
        })
    }

    /// Ticks every `period` until `shutdown` fires. An in-flight tick is
    /// always allowed to finish.
    pub async fn run(&mut self, period: Duration, shutdown: CancellationToken) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(err) = self.tick().await {
                        warn!(%err, "polling tick failed; retrying next tick");
                    }
                }
            }
        }
        info!("polling engine stopped");
    }
}

/// Push-mode engine: one subscription at a time, reconnecting with backoff.
pub struct StreamingEngine {
    stream: Arc<dyn LogStream>,
    reconcile: Option<Arc<dyn LogSource>>,
    supervisor: ReconnectSupervisor,
    pipeline: EntryPipeline,
    max_block_range: u64,
    last_seen: Option<u64>,
}

impl StreamingEngine {
    pub fn new(
        stream: Arc<dyn LogStream>,
        reconcile: Option<Arc<dyn LogSource>>,
        supervisor: ReconnectSupervisor,
        pipeline: EntryPipeline,
        max_block_range: u64,
    ) -> Self {
        Self {
            stream,
            reconcile,
            supervisor,
            pipeline,
            max_block_range,
            last_seen: None,
        }
    }

    pub fn supervisor(&self) -> &ReconnectSupervisor {
        &self.supervisor
    }

    /// Resume point for gap reconciliation: the highest height pushed on
    /// the stream or reported as tip after a subscribe.
    pub fn last_seen(&self) -> Option<u64> {
        self.last_seen
    }

    pub async fn run(&mut self, shutdown: CancellationToken) {
        while !shutdown.is_cancelled() {
            self.supervisor.connect();

            let attempt = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                attempt = self.stream.subscribe() => attempt,
            };

            let delay = match attempt {
                Ok(mut subscription) => {
                    self.supervisor.on_subscribed();
                    info!(
                        subscription = subscription.id(),
                        established = self.supervisor.established(),
                        "subscribed to mint logs"
                    );
                    self.sync_with_tip().await;

                    match self.consume(&mut subscription, &shutdown).await {
                        Some(reason) => {
                            warn!(%reason, "subscription lost");
                            self.supervisor.on_failure()
                        }
                        None => {
                            subscription.close(SHUTDOWN_GRACE).await;
                            break;
                        }
                    }
                }
                Err(err) => {
                    warn!(%err, "subscribe failed");
                    self.supervisor.on_failure()
                }
            };

            if let Some(delay) = delay {
                counter!("monitor_reconnects_total").increment(1);
                info!(delay_ms = delay.as_millis() as u64, "reconnect scheduled");
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = sleep(delay) => {}
                }
            }
        }

        self.supervisor.unsubscribe();
        info!("streaming engine stopped");
    }

    /// Drains the subscription. Returns the close reason, or `None` when
    /// shutdown was requested.
    async fn consume(
        &mut self,
        subscription: &mut Subscription,
        shutdown: &CancellationToken,
    ) -> Option<String> {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return None,
                event = subscription.next() => match event {
                    Some(StreamEvent::Log(raw)) => self.handle(&raw).await,
                    Some(StreamEvent::Closed(reason)) => return Some(reason),
                    None => return Some("subscription channel closed".to_string()),
                },
            }
        }
    }

    /// Processes one pushed entry.
    pub async fn handle(&mut self, raw: &RawLog) {
        if let Some(height) = raw
            .block_number
            .as_deref()
            .and_then(|value| parse_quantity("blockNumber", value).ok())
        {
            self.observe(height);
        }
        self.pipeline.process_raw(raw).await;
    }

    fn observe(&mut self, height: u64) {
        self.last_seen = Some(self.last_seen.map_or(height, |seen| seen.max(height)));
    }

    /// Runs after every subscribe. Replays `[last_seen, tip]` when an earlier
    /// subscription left a resume point, then records the tip so a quiet
    /// first session still leaves one. Overlap is absorbed by the dedup cache.
    async fn sync_with_tip(&mut self) {
        let Some(source) = self.reconcile.clone() else {
            return;
        };

        let tip = match source.current_height().await {
            Ok(tip) => tip,
            Err(err) => {
                warn!(%err, "tip query failed; gap reconciliation skipped");
                return;
            }
        };

        if let Some(from) = self.last_seen.filter(|from| *from <= tip) {
            match fetch_chunked(source.as_ref(), from, tip, self.max_block_range).await {
                Ok(logs) => {
                    let summary = self.pipeline.process_batch(logs).await;
                    info!(
                        from_height = from,
                        to_height = tip,
                        recovered = summary.emitted,
                        "gap reconciled"
                    );
                }
                Err(err) => {
                    warn!(%err, from_height = from, to_height = tip, "gap reconciliation failed");
                    return;
                }
            }
        }
        self.observe(tip);
    }
}

/// Builds the transport matching the configured mode.
pub fn build_client(config: &MonitorConfig) -> Result<LedgerClient, MonitorError> {
    let filter = LogFilter::mints(config.contract_address());
    let url = config.rpc_url().clone();
    let scheme_ok = match config.mode() {
        MonitorMode::Poll => matches!(url.scheme(), "http" | "https"),
        MonitorMode::Stream => matches!(url.scheme(), "ws" | "wss"),
    };
    if !scheme_ok {
        return Err(MonitorError::Scheme {
            url: url.to_string(),
            mode: config.mode(),
        });
    }

    Ok(match config.mode() {
        MonitorMode::Poll => LedgerClient::Polling(Arc::new(HttpLedgerClient::new(
            url,
            filter,
            HttpLedgerClient::DEFAULT_TIMEOUT,
        )?)),
        MonitorMode::Stream => {
            let client = Arc::new(WsLedgerClient::new(url, filter));
            let reconcile: Option<Arc<dyn LogSource>> = if config.reconcile() {
                Some(client.clone())
            } else {
                None
            };
            LedgerClient::Streaming {
                stream: client,
                reconcile,
            }
        }
    })
}

/// Runs the engine matching `client` until `shutdown` fires.
pub async fn run_monitor(
    config: &MonitorConfig,
    client: LedgerClient,
    sink: Arc<dyn NotificationSink>,
    shutdown: CancellationToken,
) {
    let pipeline = EntryPipeline::new(
        EventDecoder::new(config.contract_address()),
        DedupCache::with_capacity(config.dedup_capacity()),
        sink,
    );

    match client {
        LedgerClient::Polling(source) => {
            info!(
                contract = %config.contract_address(),
                interval_ms = config.poll_interval().as_millis() as u64,
                "starting polling engine"
            );
            PollingEngine::new(
                source,
                InMemoryCursorStore::new(),
                pipeline,
                config.start_height(),
                config.max_block_range(),
            )
            .run(config.poll_interval(), shutdown)
            .await;
        }
        LedgerClient::Streaming { stream, reconcile } => {
            info!(contract = %config.contract_address(), "starting streaming engine");
            StreamingEngine::new(
                stream,
                reconcile,
                ReconnectSupervisor::new(config.base_backoff(), config.max_backoff()),
                pipeline,
                config.max_block_range(),
            )
            .run(shutdown)
            .await;
        }
    }
}
