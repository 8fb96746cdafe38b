//! Daemon that watches one contract for mints and announces each exactly once.

use std::io;

use mintwatch_domain::config::MonitorConfig;
use mintwatch_domain::services::telemetry::{init_telemetry, TelemetryConfig};
use mintwatch_monitor::{build_client, build_sink, run_monitor, MonitorError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> io::Result<()> {
    if let Err(err) = bootstrap().await {
        eprintln!("[mintwatch] bootstrap failed: {err}");
        return Err(io::Error::other(err.to_string()));
    }

    Ok(())
}

async fn bootstrap() -> Result<(), MonitorError> {
    let config = MonitorConfig::load_from_env()?;
    let telemetry_config = TelemetryConfig::from_env("MONITOR");
    let telemetry = init_telemetry(&telemetry_config)?;
    let sink = build_sink(&config)?;
    let client = build_client(&config)?;

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown requested"),
            Err(err) => warn!(%err, "ctrl-c handler unavailable; shutting down"),
        }
        trigger.cancel();
    });

    info!(
        mode = ?config.mode(),
        rpc = %config.rpc_url(),
        "mintwatch starting"
    );
    run_monitor(&config, client, sink, shutdown).await;
    debug!(snapshot = %telemetry.render_metrics(), "final metrics");
    Ok(())
}
