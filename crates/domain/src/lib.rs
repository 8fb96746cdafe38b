//! Transport-free building blocks of the mint monitor: the data model, the
//! Transfer log decoder, deduplication, the progress cursor, the sink
//! contract and environment/telemetry wiring shared by the binaries.

pub mod config;
pub mod cursor;
pub mod decoder;
pub mod model;
pub mod services;
pub mod sink;

pub use cursor::{CursorError, CursorStore, InMemoryCursorStore};
pub use decoder::{is_mint, DecodeError, EventDecoder, TRANSFER_TOPIC};
pub use model::{
    Address, Cursor, EventKey, MintEvent, RawLog, TokenId, TransferRecord, B256, NULL_ADDRESS,
};
pub use services::cache::DedupCache;
pub use sink::{NotificationSink, SinkError};
