//! Turns raw log entries into typed transfer records.

use std::str::FromStr;

use alloy_primitives::{b256, Address, B256};
use thiserror::Error;

use crate::model::{RawLog, TokenId, TransferRecord, NULL_ADDRESS};

/// `keccak256("Transfer(address,address,uint256)")`.
pub const TRANSFER_TOPIC: B256 =
    b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef");

/// The null address left-padded to a topic word, used to pre-filter mints in
/// log queries.
pub const NULL_ADDRESS_TOPIC: B256 = B256::ZERO;

/// ERC-721 transfers index all three arguments: signature + from + to + id.
const EXPECTED_TOPICS: usize = 4;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("log emitted by unexpected contract `{0}`")]
    UnexpectedContract(String),
    #[error("expected {EXPECTED_TOPICS} topics, found {0}")]
    TopicCount(usize),
    #[error("topic0 `{0}` is not the Transfer signature")]
    Signature(String),
    #[error("malformed {field}: `{value}`")]
    Malformed { field: &'static str, value: String },
    #[error("topic `{0}` does not hold a left-padded address")]
    AddressPadding(String),
    #[error("log is still pending (missing {0})")]
    Pending(&'static str),
}

/// Stateless decoder bound to the watched contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventDecoder {
    contract: Address,
}

impl EventDecoder {
    pub fn new(contract: Address) -> Self {
        Self { contract }
    }

    pub fn decode(&self, raw: &RawLog) -> Result<TransferRecord, DecodeError> {
        let emitter = parse_address(&raw.address)?;
        if emitter != self.contract {
            return Err(DecodeError::UnexpectedContract(raw.address.clone()));
        }

        if raw.topics.len() != EXPECTED_TOPICS {
            return Err(DecodeError::TopicCount(raw.topics.len()));
        }
        let topics = raw
            .topics
            .iter()
            .map(|topic| parse_word("topic", topic))
            .collect::<Result<Vec<_>, _>>()?;
        if topics[0] != TRANSFER_TOPIC {
            return Err(DecodeError::Signature(raw.topics[0].clone()));
        }

        let from = address_from_topic(&topics[1], &raw.topics[1])?;
        let to = address_from_topic(&topics[2], &raw.topics[2])?;
        let token_id = TokenId::from_word(topics[3]);

        let block_height = parse_quantity(
            "blockNumber",
            raw.block_number
                .as_deref()
                .ok_or(DecodeError::Pending("blockNumber"))?,
        )?;
        let block_hash = parse_word(
            "blockHash",
            raw.block_hash
                .as_deref()
                .ok_or(DecodeError::Pending("blockHash"))?,
        )?;
        let tx_hash = parse_word(
            "transactionHash",
            raw.transaction_hash
                .as_deref()
                .ok_or(DecodeError::Pending("transactionHash"))?,
        )?;
        let log_index = match raw.log_index.as_deref() {
            Some(value) => parse_quantity("logIndex", value)?,
            None => 0,
        };

        Ok(TransferRecord::new(
            from,
            to,
            token_id,
            block_height,
            block_hash,
            tx_hash,
            log_index,
        ))
    }
}

/// A mint is a transfer out of the null address. Addresses are compared as
/// bytes, so the hex casing of the source log does not matter.
pub fn is_mint(record: &TransferRecord) -> bool {
    record.from() == NULL_ADDRESS
}

fn parse_address(value: &str) -> Result<Address, DecodeError> {
    Address::from_str(value.trim()).map_err(|_| DecodeError::Malformed {
        field: "address",
        value: value.to_string(),
    })
}

fn parse_word(field: &'static str, value: &str) -> Result<B256, DecodeError> {
    B256::from_str(value.trim()).map_err(|_| DecodeError::Malformed {
        field,
        value: value.to_string(),
    })
}

fn address_from_topic(word: &B256, original: &str) -> Result<Address, DecodeError> {
    if word.0[..12].iter().any(|byte| *byte != 0) {
        return Err(DecodeError::AddressPadding(original.to_string()));
    }
    Ok(Address::from_slice(&word.0[12..]))
}

/// Parses a JSON-RPC hex quantity such as `0x67`.
pub fn parse_quantity(field: &'static str, value: &str) -> Result<u64, DecodeError> {
    let malformed = || DecodeError::Malformed {
        field,
        value: value.to_string(),
    };
    let digits = value.trim().strip_prefix("0x").ok_or_else(malformed)?;
    if digits.is_empty() {
        return Err(malformed());
    }
    u64::from_str_radix(digits, 16).map_err(|_| malformed())
}

/// Left-pads an address into a 32-byte topic word.
pub fn address_topic(address: Address) -> B256 {
    address.into_word()
}
