//! Bounded historical query used by the `recent_mints` binary.

use std::collections::HashSet;

use mintwatch_domain::{EventDecoder, MintEvent};
use tracing::{debug, warn};

use crate::rpc::{fetch_chunked, LogSource, TransportError};

pub const DEFAULT_LIMIT: usize = 25;

/// The `limit` highest-numbered mints in the last `lookback` blocks up to
/// the tip, listed in ascending token id order.
pub async fn recent_mints(
    source: &dyn LogSource,
    decoder: &EventDecoder,
    lookback: u64,
    max_range: u64,
    limit: usize,
) -> Result<Vec<MintEvent>, TransportError> {
    let tip = source.current_height().await?;
    let from = tip.saturating_sub(lookback);
    debug!(from_height = from, to_height = tip, "querying recent mints");

    let logs = fetch_chunked(source, from, tip, max_range).await?;
    let mut seen = HashSet::new();
    let mut mints: Vec<MintEvent> = logs
        .iter()
        .filter(|raw| !raw.is_removed())
        .filter_map(|raw| match decoder.decode(raw) {
            Ok(record) => MintEvent::from_record(record),
            Err(err) => {
                warn!(%err, tx = ?raw.transaction_hash, "skipping undecodable log");
                None
            }
        })
        .filter(|event| seen.insert(*event.key()))
        .collect();

    mints.sort_by(|a, b| b.token_id().cmp(&a.token_id()));
    mints.truncate(limit);
    mints.reverse();
    Ok(mints)
}

/// `tokenId | to | block | tx`
pub fn format_row(event: &MintEvent) -> String {
    format!(
        "{} | {} | {} | {}",
        event.token_id(),
        event.minter(),
        event.block_height(),
        event.tx_hash()
    )
}
