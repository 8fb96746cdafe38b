//! Prints the most recent mints of the configured contract.

use std::io;
use std::sync::Arc;

use mintwatch_domain::config::MonitorConfig;
use mintwatch_domain::services::telemetry::{init_telemetry, TelemetryConfig};
use mintwatch_domain::EventDecoder;
use mintwatch_monitor::lookback::{format_row, recent_mints, DEFAULT_LIMIT};
use mintwatch_monitor::rpc::{HttpLedgerClient, LogFilter, LogSource, WsLedgerClient};
use mintwatch_monitor::MonitorError;

#[tokio::main]
async fn main() -> io::Result<()> {
    if let Err(err) = run().await {
        eprintln!("[recent_mints] failed: {err}");
        return Err(io::Error::other(err.to_string()));
    }
    Ok(())
}

async fn run() -> Result<(), MonitorError> {
    let config = MonitorConfig::load_from_env()?;
    let _telemetry = init_telemetry(&TelemetryConfig::from_env("MONITOR"))?;

    let filter = LogFilter::mints(config.contract_address());
    let url = config.rpc_url().clone();
    let source: Arc<dyn LogSource> = match url.scheme() {
        "ws" | "wss" => Arc::new(WsLedgerClient::new(url, filter)),
        _ => Arc::new(HttpLedgerClient::new(
            url,
            filter,
            HttpLedgerClient::DEFAULT_TIMEOUT,
        )?),
    };

    let decoder = EventDecoder::new(config.contract_address());
    let mints = recent_mints(
        source.as_ref(),
        &decoder,
        config.lookback_blocks(),
        config.max_block_range(),
        DEFAULT_LIMIT,
    )
    .await?;

    if mints.is_empty() {
        println!("no mints in the last {} blocks", config.lookback_blocks());
    }
    for mint in &mints {
        println!("{}", format_row(mint));
    }
    Ok(())
}
