//! Environment-driven configuration shared by the monitor binaries.

use std::{env, str::FromStr, time::Duration};

use alloy_primitives::Address;
use thiserror::Error;
use url::Url;

use crate::services::cache::DedupCache;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 15_000;
pub const DEFAULT_BASE_BACKOFF_MS: u64 = 1_000;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 60_000;
pub const DEFAULT_MAX_BLOCK_RANGE: u64 = 2_000;
pub const DEFAULT_LOOKBACK_BLOCKS: u64 = 8_000;

/// Which transport personality drives the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorMode {
    /// Periodic `eth_blockNumber` + `eth_getLogs` over HTTP.
    Poll,
    /// Persistent `eth_subscribe("logs")` over WebSocket.
    Stream,
}

impl MonitorMode {
    /// `ws://` and `wss://` endpoints stream, everything else polls.
    pub fn infer(url: &Url) -> Self {
        match url.scheme() {
            "ws" | "wss" => Self::Stream,
            _ => Self::Poll,
        }
    }
}

impl FromStr for MonitorMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "poll" | "polling" => Ok(Self::Poll),
            "stream" | "streaming" | "subscribe" => Ok(Self::Stream),
            _ => Err(ConfigError::InvalidMode(value.to_string())),
        }
    }
}

/// Everything the mint monitor needs to boot, derived from `.env`/process
/// variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    contract_address: Address,
    rpc_url: Url,
    mode: MonitorMode,
    start_height: Option<u64>,
    poll_interval: Duration,
    dedup_capacity: usize,
    base_backoff: Duration,
    max_backoff: Duration,
    max_block_range: u64,
    reconcile: bool,
    lookback_blocks: u64,
    webhook_url: Option<Url>,
}

impl MonitorConfig {
    /// Loads configuration by hydrating `.env` (if present) and reading the
    /// process variables. Missing or malformed entries surface as
    /// `ConfigError` so binaries can refuse to start.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let contract_address = parse_address("MINT_CONTRACT_ADDRESS")?;
        let rpc_url = parse_url("MINT_RPC_URL", get_required_var("MINT_RPC_URL")?)?;
        let mode = match get_optional_var("MINT_MODE") {
            Some(value) => value.parse()?,
            None => MonitorMode::infer(&rpc_url),
        };

        let base_backoff_ms = parse_u64_or("MINT_BASE_BACKOFF_MS", DEFAULT_BASE_BACKOFF_MS)?;
        let max_backoff_ms = parse_u64_or("MINT_MAX_BACKOFF_MS", DEFAULT_MAX_BACKOFF_MS)?;
        if base_backoff_ms == 0 || base_backoff_ms > max_backoff_ms {
            return Err(ConfigError::InvalidBackoff {
                base_ms: base_backoff_ms,
                max_ms: max_backoff_ms,
            });
        }

        let dedup_capacity = parse_u64_or(
            "MINT_DEDUP_CAPACITY",
            DedupCache::DEFAULT_CAPACITY as u64,
        )?;
        let max_block_range = parse_u64_or("MINT_MAX_BLOCK_RANGE", DEFAULT_MAX_BLOCK_RANGE)?;
        let poll_interval_ms = parse_u64_or("MINT_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)?;
        for (key, value) in [
            ("MINT_DEDUP_CAPACITY", dedup_capacity),
            ("MINT_MAX_BLOCK_RANGE", max_block_range),
            ("MINT_POLL_INTERVAL_MS", poll_interval_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero { key });
            }
        }

        let webhook_url = get_optional_var("MINT_WEBHOOK_URL")
            .map(|value| parse_url("MINT_WEBHOOK_URL", value))
            .transpose()?;

        Ok(Self {
            contract_address,
            rpc_url,
            mode,
            start_height: get_optional_var("MINT_START_HEIGHT")
                .map(|value| parse_number("MINT_START_HEIGHT", &value))
                .transpose()?,
            poll_interval: Duration::from_millis(poll_interval_ms),
            dedup_capacity: dedup_capacity as usize,
            base_backoff: Duration::from_millis(base_backoff_ms),
            max_backoff: Duration::from_millis(max_backoff_ms),
            max_block_range,
            reconcile: parse_bool_or("MINT_RECONCILE", true)?,
            lookback_blocks: parse_u64_or("MINT_LOOKBACK_BLOCKS", DEFAULT_LOOKBACK_BLOCKS)?,
            webhook_url,
        })
    }

    pub fn contract_address(&self) -> Address {
        self.contract_address
    }

    pub fn rpc_url(&self) -> &Url {
        &self.rpc_url
    }

    pub fn mode(&self) -> MonitorMode {
        self.mode
    }

    pub fn start_height(&self) -> Option<u64> {
        self.start_height
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn dedup_capacity(&self) -> usize {
        self.dedup_capacity
    }

    pub fn base_backoff(&self) -> Duration {
        self.base_backoff
    }

    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    pub fn max_block_range(&self) -> u64 {
        self.max_block_range
    }

    pub fn reconcile(&self) -> bool {
        self.reconcile
    }

    pub fn lookback_blocks(&self) -> u64 {
        self.lookback_blocks
    }

    pub fn webhook_url(&self) -> Option<&Url> {
        self.webhook_url.as_ref()
    }
}

fn get_required_var(key: &'static str) -> Result<String, ConfigError> {
    get_optional_var(key).ok_or(ConfigError::MissingVar { key })
}

fn get_optional_var(key: &'static str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn parse_number(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .parse()
        .map_err(|source| ConfigError::InvalidNumber { key, source })
}

fn parse_u64_or(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match get_optional_var(key) {
        Some(value) => parse_number(key, &value),
        None => Ok(default),
    }
}

fn parse_bool_or(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    let Some(value) = get_optional_var(key) else {
        return Ok(default);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool { key, value }),
    }
}

fn parse_address(key: &'static str) -> Result<Address, ConfigError> {
    let value = get_required_var(key)?;
    Address::from_str(&value).map_err(|_| ConfigError::InvalidAddress { key, value })
}

fn parse_url(key: &'static str, value: String) -> Result<Url, ConfigError> {
    Url::parse(&value).map_err(|source| ConfigError::InvalidUrl { key, source })
}

pub fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("MINTWATCH_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted when `.env` hydration or environment parsing fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable `{key}`")]
    MissingVar { key: &'static str },
    #[error("invalid integer in `{key}`: {source}")]
    InvalidNumber {
        key: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("`{key}` must be greater than zero")]
    Zero { key: &'static str },
    #[error("invalid boolean in `{key}`: `{value}`")]
    InvalidBool { key: &'static str, value: String },
    #[error("invalid address in `{key}`: `{value}`")]
    InvalidAddress { key: &'static str, value: String },
    #[error("invalid url in `{key}`: {source}")]
    InvalidUrl {
        key: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("unknown monitor mode `{0}` (expected `poll` or `stream`)")]
    InvalidMode(String),
    #[error("base backoff {base_ms}ms must be non-zero and not exceed max backoff {max_ms}ms")]
    InvalidBackoff { base_ms: u64, max_ms: u64 },
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    pub(crate) static ENV_GUARD: Mutex<()> = Mutex::new(());

    const OPTIONAL: [&str; 10] = [
        "MINT_MODE",
        "MINT_START_HEIGHT",
        "MINT_POLL_INTERVAL_MS",
        "MINT_DEDUP_CAPACITY",
        "MINT_BASE_BACKOFF_MS",
        "MINT_MAX_BACKOFF_MS",
        "MINT_MAX_BLOCK_RANGE",
        "MINT_RECONCILE",
        "MINT_LOOKBACK_BLOCKS",
        "MINT_WEBHOOK_URL",
    ];

    fn set_env() {
        env::set_var("MINTWATCH_SKIP_DOTENV", "1");
        env::set_var(
            "MINT_CONTRACT_ADDRESS",
            "0x9bf567ddf41b425264626d1b8b2c7f7c660b1c42",
        );
        env::set_var("MINT_RPC_URL", "https://eth-mainnet.example/v2/key");
        for key in OPTIONAL {
            env::remove_var(key);
        }
    }

    #[test]
    fn config_loader_applies_defaults() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env();

        let config = MonitorConfig::load_from_env().expect("config loads");
        assert_eq!(
            config.contract_address(),
            Address::from_str("0x9bf567ddf41b425264626d1b8b2c7f7c660b1c42").unwrap()
        );
        assert_eq!(config.mode(), MonitorMode::Poll);
        assert_eq!(config.start_height(), None);
        assert_eq!(config.poll_interval(), Duration::from_millis(15_000));
        assert_eq!(config.dedup_capacity(), DedupCache::DEFAULT_CAPACITY);
        assert_eq!(config.base_backoff(), Duration::from_millis(1_000));
        assert_eq!(config.max_backoff(), Duration::from_millis(60_000));
        assert_eq!(config.max_block_range(), 2_000);
        assert!(config.reconcile());
        assert!(config.webhook_url().is_none());
    }

    #[test]
    fn config_loader_reads_overrides() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env();
        env::set_var("MINT_RPC_URL", " wss://eth-mainnet.example/ws ");
        env::set_var("MINT_START_HEIGHT", "19000000");
        env::set_var("MINT_POLL_INTERVAL_MS", "5000");
        env::set_var("MINT_DEDUP_CAPACITY", "16");
        env::set_var("MINT_RECONCILE", "off");
        env::set_var("MINT_WEBHOOK_URL", "https://hooks.example/mint");

        let config = MonitorConfig::load_from_env().expect("config loads");
        assert_eq!(config.mode(), MonitorMode::Stream);
        assert_eq!(config.start_height(), Some(19_000_000));
        assert_eq!(config.poll_interval(), Duration::from_millis(5_000));
        assert_eq!(config.dedup_capacity(), 16);
        assert!(!config.reconcile());
        assert_eq!(
            config.webhook_url().map(Url::as_str),
            Some("https://hooks.example/mint")
        );

        set_env();
    }

    #[test]
    fn explicit_mode_overrides_url_scheme() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env();
        env::set_var("MINT_MODE", "stream");

        let config = MonitorConfig::load_from_env().expect("config loads");
        assert_eq!(config.mode(), MonitorMode::Stream);

        env::set_var("MINT_MODE", "sideways");
        assert!(matches!(
            MonitorConfig::load_from_env(),
            Err(ConfigError::InvalidMode(_))
        ));
        set_env();
    }

    #[test]
    fn missing_contract_prevents_startup() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env();
        env::set_var("MINT_CONTRACT_ADDRESS", "   ");

        let err = MonitorConfig::load_from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingVar {
                key: "MINT_CONTRACT_ADDRESS"
            }
        ));
        set_env();
    }

    #[test]
    fn malformed_values_are_rejected() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env();
        env::set_var("MINT_CONTRACT_ADDRESS", "0x1234");
        assert!(matches!(
            MonitorConfig::load_from_env(),
            Err(ConfigError::InvalidAddress { .. })
        ));

        set_env();
        env::set_var("MINT_START_HEIGHT", "latest");
        assert!(matches!(
            MonitorConfig::load_from_env(),
            Err(ConfigError::InvalidNumber {
                key: "MINT_START_HEIGHT",
                ..
            })
        ));

        set_env();
        env::set_var("MINT_BASE_BACKOFF_MS", "90000");
        assert!(matches!(
            MonitorConfig::load_from_env(),
            Err(ConfigError::InvalidBackoff { .. })
        ));

        set_env();
        env::set_var("MINT_DEDUP_CAPACITY", "0");
        assert!(matches!(
            MonitorConfig::load_from_env(),
            Err(ConfigError::Zero {
                key: "MINT_DEDUP_CAPACITY"
            })
        ));

        set_env();
        env::set_var("MINT_POLL_INTERVAL_MS", "0");
        assert!(matches!(
            MonitorConfig::load_from_env(),
            Err(ConfigError::Zero {
                key: "MINT_POLL_INTERVAL_MS"
            })
        ));
        set_env();
    }
}
