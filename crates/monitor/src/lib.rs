//! Mint monitor: ledger transports, the entry pipeline and the polling and
//! streaming engines. `main.rs` wires these into the `mintwatch` daemon.

pub mod lookback;
pub mod pipeline;
pub mod rpc;
pub mod sink;
pub mod supervisor;
pub mod worker;

pub use pipeline::{BatchSummary, EntryOutcome, EntryPipeline};
pub use rpc::{
    HttpLedgerClient, LedgerClient, LogSource, LogStream, StreamEvent, Subscription,
    TransportError, WsLedgerClient,
};
pub use sink::{build_sink, LogSink, WebhookSink};
pub use supervisor::{Backoff, ConnectionState, ReconnectSupervisor};
pub use worker::{
    build_client, run_monitor, MonitorError, PollingEngine, StreamingEngine, TickOutcome,
};
