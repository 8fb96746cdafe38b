//! Data structures shared by the decoder, the engines and the sinks.

use std::fmt;

use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

pub use alloy_primitives::{Address, B256};

/// The all-zero account; a transfer originating here is a mint.
pub const NULL_ADDRESS: Address = Address::ZERO;

/// Token identifier. ERC-721 ids are full 256-bit words, so this never
/// overflows regardless of supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TokenId(U256);

impl TokenId {
    pub fn new(value: U256) -> Self {
        Self(value)
    }

    pub fn from_word(word: B256) -> Self {
        Self(U256::from_be_bytes(word.0))
    }

    pub fn as_u256(&self) -> U256 {
        self.0
    }
}

impl From<u64> for TokenId {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Serialize for TokenId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

/// A log entry exactly as `eth_getLogs` / `eth_subscribe("logs")` return it.
/// Quantities stay hex strings until the decoder validates them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub address: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
    pub block_number: Option<String>,
    pub block_hash: Option<String>,
    pub transaction_hash: Option<String>,
    pub log_index: Option<String>,
    #[serde(default)]
    pub removed: Option<bool>,
}

impl RawLog {
    /// Returns `true` if the node retracted this log during a reorg.
    pub fn is_removed(&self) -> bool {
        self.removed.unwrap_or(false)
    }
}

/// A decoded `Transfer(address,address,uint256)` entry. Only the decoder
/// builds these, so every instance was validated against the event shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    from: Address,
    to: Address,
    token_id: TokenId,
    block_height: u64,
    block_hash: B256,
    tx_hash: B256,
    log_index: u64,
}

impl TransferRecord {
    pub(crate) fn new(
        from: Address,
        to: Address,
        token_id: TokenId,
        block_height: u64,
        block_hash: B256,
        tx_hash: B256,
        log_index: u64,
    ) -> Self {
        Self {
            from,
            to,
            token_id,
            block_height,
            block_hash,
            tx_hash,
            log_index,
        }
    }

    pub fn from(&self) -> Address {
        self.from
    }

    pub fn to(&self) -> Address {
        self.to
    }

    pub fn token_id(&self) -> TokenId {
        self.token_id
    }

    pub fn block_height(&self) -> u64 {
        self.block_height
    }

    pub fn block_hash(&self) -> B256 {
        self.block_hash
    }

    pub fn tx_hash(&self) -> B256 {
        self.tx_hash
    }

    pub fn log_index(&self) -> u64 {
        self.log_index
    }

    /// Position used to order entries within a polled range.
    pub fn position(&self) -> (u64, u64) {
        (self.block_height, self.log_index)
    }
}

/// Deduplication identity of a mint: the same on-ledger log always maps to
/// the same key, no matter how many times a subscription redelivers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub block_hash: B256,
    pub tx_hash: B256,
    pub token_id: TokenId,
}

impl EventKey {
    pub fn of(record: &TransferRecord) -> Self {
        Self {
            block_hash: record.block_hash,
            tx_hash: record.tx_hash,
            token_id: record.token_id,
        }
    }
}

/// A transfer out of the null address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MintEvent {
    #[serde(flatten)]
    record: TransferRecord,
    #[serde(skip)]
    key: EventKey,
    observed_at: DateTime<Utc>,
}

impl MintEvent {
    /// Promotes a record to a mint; `None` when the source is not the null
    /// address.
    pub fn from_record(record: TransferRecord) -> Option<Self> {
        if !crate::decoder::is_mint(&record) {
            return None;
        }
        let key = EventKey::of(&record);
        Some(Self {
            record,
            key,
            observed_at: Utc::now(),
        })
    }

    pub fn record(&self) -> &TransferRecord {
        &self.record
    }

    pub fn key(&self) -> &EventKey {
        &self.key
    }

    pub fn token_id(&self) -> TokenId {
        self.record.token_id
    }

    /// The receiving account of the mint.
    pub fn minter(&self) -> Address {
        self.record.to
    }

    pub fn block_height(&self) -> u64 {
        self.record.block_height
    }

    pub fn tx_hash(&self) -> B256 {
        self.record.tx_hash
    }

    pub fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }
}

/// Last block height whose logs were fully processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cursor {
    pub last_confirmed_height: u64,
}

impl Cursor {
    pub fn new(last_confirmed_height: u64) -> Self {
        Self {
            last_confirmed_height,
        }
    }

    /// First height not yet scanned.
    pub fn next_height(&self) -> u64 {
        self.last_confirmed_height.saturating_add(1)
    }
}
