use std::sync::Arc;

use metrics::{counter, histogram};
use mintwatch_domain::{
    DedupCache, EventDecoder, EventKey, MintEvent, NotificationSink, RawLog, TransferRecord,
};
use tracing::{debug, info, warn};

/// What happened to a single raw entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    Emitted,
    Duplicate,
    NotMint,
    Removed,
    Invalid,
}

impl EntryOutcome {
    fn label(self) -> &'static str {
        match self {
            Self::Emitted => "emitted",
            Self::Duplicate => "duplicate",
            Self::NotMint => "not_mint",
            Self::Removed => "removed",
            Self::Invalid => "decode_error",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub emitted: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub invalid: usize,
}

impl BatchSummary {
    fn record(&mut self, outcome: EntryOutcome) {
        match outcome {
            EntryOutcome::Emitted => self.emitted += 1,
            EntryOutcome::Duplicate => self.duplicates += 1,
            EntryOutcome::NotMint | EntryOutcome::Removed => self.skipped += 1,
            EntryOutcome::Invalid => self.invalid += 1,
        }
    }
}

/// Decode -> mint filter -> dedup -> sink. Owned by exactly one engine, so
/// every call is serialized by construction.
pub struct EntryPipeline {
    decoder: EventDecoder,
    cache: DedupCache,
    sink: Arc<dyn NotificationSink>,
}

impl EntryPipeline {
    pub fn new(decoder: EventDecoder, cache: DedupCache, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            decoder,
            cache,
            sink,
        }
    }

    /// Handles one pushed entry. Decode failures are logged and dropped.
    pub async fn process_raw(&mut self, raw: &RawLog) -> EntryOutcome {
        let outcome = match self.decode(raw) {
            Ok(record) => self.process_record(record).await,
            Err(outcome) => outcome,
        };
        counter!("monitor_entries_total", "result" => outcome.label()).increment(1);
        outcome
    }

    /// Handles a polled range: all entries are decoded first and then
    /// processed in ascending (block, log index) order.
    pub async fn process_batch(&mut self, logs: Vec<RawLog>) -> BatchSummary {
        histogram!("monitor_batch_entries").record(logs.len() as f64);

        let mut summary = BatchSummary::default();
        let mut records = Vec::with_capacity(logs.len());
        for raw in &logs {
            match self.decode(raw) {
                Ok(record) => records.push(record),
                Err(outcome) => {
                    counter!("monitor_entries_total", "result" => outcome.label()).increment(1);
                    summary.record(outcome);
                }
            }
        }
        records.sort_by_key(TransferRecord::position);

        for record in records {
            let outcome = self.process_record(record).await;
            counter!("monitor_entries_total", "result" => outcome.label()).increment(1);
            summary.record(outcome);
        }
        summary
    }

    fn decode(&self, raw: &RawLog) -> Result<TransferRecord, EntryOutcome> {
        if raw.is_removed() {
            debug!(tx = ?raw.transaction_hash, "skipping log removed by reorg");
            return Err(EntryOutcome::Removed);
        }
        self.decoder.decode(raw).map_err(|err| {
            warn!(%err, tx = ?raw.transaction_hash, "dropping undecodable log");
            EntryOutcome::Invalid
        })
    }

    async fn process_record(&mut self, record: TransferRecord) -> EntryOutcome {
        let Some(event) = MintEvent::from_record(record) else {
            return EntryOutcome::NotMint;
        };
        let key: EventKey = *event.key();
        if !self.cache.remember(key) {
            debug!(
                token_id = %event.token_id(),
                tx = %event.tx_hash(),
                "suppressing duplicate mint"
            );
            return EntryOutcome::Duplicate;
        }
        self.emit(&event).await;
        EntryOutcome::Emitted
    }

    async fn emit(&self, event: &MintEvent) {
        match self.sink.notify(event).await {
            Ok(()) => {
                counter!("monitor_notifications_total", "result" => "ok").increment(1);
                info!(
                    token_id = %event.token_id(),
                    minter = %event.minter(),
                    block = event.block_height(),
                    "mint announced"
                );
            }
            Err(err) => {
                counter!("monitor_notifications_total", "result" => "error").increment(1);
                warn!(
                    ?err,
                    token_id = %event.token_id(),
                    block = event.block_height(),
                    "notification sink failed"
                );
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use mintwatch_domain::decoder::TRANSFER_TOPIC;
    use mintwatch_domain::{Address, SinkError, TokenId};
    use std::str::FromStr;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    pub const CONTRACT: &str = "0x9bf567ddf41b425264626d1b8b2c7f7c660b1c42";
    pub const ZERO: &str = "0x0000000000000000000000000000000000000000";
    pub const ALICE: &str = "0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

    /// Records every event and can be told to fail.
    #[derive(Default)]
    pub struct MockSink {
        pub events: Mutex<Vec<MintEvent>>,
        pub failing: AtomicBool,
    }

    impl MockSink {
        pub fn token_ids(&self) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .map(|event| event.token_id().to_string())
                .collect()
        }
    }

    #[async_trait]
    impl NotificationSink for MockSink {
        async fn notify(&self, event: &MintEvent) -> Result<(), SinkError> {
            self.events.lock().unwrap().push(event.clone());
            if self.failing.load(Ordering::SeqCst) {
                return Err(SinkError::Delivery("channel unavailable".to_string()));
            }
            Ok(())
        }
    }

    fn topic(address: &str) -> String {
        format!("0x{:0>64}", address.trim_start_matches("0x").to_ascii_lowercase())
    }

    pub fn transfer_log(from: &str, to: &str, token_id: u64, block: u64, log_index: u64) -> RawLog {
        RawLog {
            address: CONTRACT.to_string(),
            topics: vec![
                format!("{TRANSFER_TOPIC:#x}"),
                topic(from),
                topic(to),
                format!("0x{token_id:064x}"),
            ],
            data: "0x".to_string(),
            block_number: Some(format!("{block:#x}")),
            block_hash: Some(format!("0x{block:064x}")),
            transaction_hash: Some(format!("0x{:064x}", token_id + 1_000)),
            log_index: Some(format!("{log_index:#x}")),
            removed: None,
        }
    }

    pub fn mint_log(token_id: u64, block: u64) -> RawLog {
        transfer_log(ZERO, ALICE, token_id, block, 0)
    }

    pub fn pipeline(sink: Arc<MockSink>, capacity: usize) -> EntryPipeline {
        EntryPipeline::new(
            EventDecoder::new(Address::from_str(CONTRACT).unwrap()),
            DedupCache::with_capacity(capacity),
            sink,
        )
    }

    #[tokio::test]
    async fn emits_each_mint_once() {
        let sink = Arc::new(MockSink::default());
        let mut pipeline = pipeline(sink.clone(), 16);

        assert_eq!(pipeline.process_raw(&mint_log(42, 103)).await, EntryOutcome::Emitted);
        assert_eq!(pipeline.process_raw(&mint_log(42, 103)).await, EntryOutcome::Duplicate);
        assert_eq!(pipeline.process_raw(&mint_log(42, 103)).await, EntryOutcome::Duplicate);

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].token_id(), TokenId::from(42));
        assert_eq!(events[0].block_height(), 103);
    }

    #[tokio::test]
    async fn never_emits_transfers_from_real_accounts() {
        let sink = Arc::new(MockSink::default());
        let mut pipeline = pipeline(sink.clone(), 16);

        let burn = transfer_log(ALICE, ZERO, 7, 10, 0);
        assert_eq!(pipeline.process_raw(&burn).await, EntryOutcome::NotMint);
        let lowercase = transfer_log(&ALICE.to_ascii_lowercase(), ALICE, 8, 10, 1);
        assert_eq!(pipeline.process_raw(&lowercase).await, EntryOutcome::NotMint);
        assert!(sink.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn undecodable_and_removed_logs_are_dropped() {
        let sink = Arc::new(MockSink::default());
        let mut pipeline = pipeline(sink.clone(), 16);

        let mut garbage = mint_log(1, 1);
        garbage.topics.truncate(2);
        assert_eq!(pipeline.process_raw(&garbage).await, EntryOutcome::Invalid);

        let mut removed = mint_log(2, 1);
        removed.removed = Some(true);
        assert_eq!(pipeline.process_raw(&removed).await, EntryOutcome::Removed);

        assert_eq!(pipeline.process_raw(&mint_log(3, 1)).await, EntryOutcome::Emitted);
        assert_eq!(sink.token_ids(), vec!["3"]);
    }

    #[tokio::test]
    async fn sink_failure_still_marks_event_seen() {
        let sink = Arc::new(MockSink::default());
        sink.failing.store(true, Ordering::SeqCst);
        let mut pipeline = pipeline(sink.clone(), 16);

        assert_eq!(pipeline.process_raw(&mint_log(5, 9)).await, EntryOutcome::Emitted);
        assert_eq!(pipeline.process_raw(&mint_log(5, 9)).await, EntryOutcome::Duplicate);
        assert_eq!(sink.events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn batch_is_processed_in_block_then_log_order() {
        let sink = Arc::new(MockSink::default());
        let mut pipeline = pipeline(sink.clone(), 16);

        let logs = vec![
            transfer_log(ZERO, ALICE, 30, 104, 0),
            transfer_log(ZERO, ALICE, 21, 102, 5),
            transfer_log(ZERO, ALICE, 20, 102, 1),
            transfer_log(ALICE, ALICE, 99, 101, 0),
            transfer_log(ZERO, ALICE, 20, 102, 1),
        ];
        let summary = pipeline.process_batch(logs).await;

        assert_eq!(sink.token_ids(), vec!["20", "21", "30"]);
        assert_eq!(
            summary,
            BatchSummary {
                emitted: 3,
                duplicates: 1,
                skipped: 1,
                invalid: 0,
            }
        );
    }

    #[tokio::test]
    async fn evicted_keys_are_emitted_again() {
        let sink = Arc::new(MockSink::default());
        let mut pipeline = pipeline(sink.clone(), 2);

        for id in [1, 2, 3, 1] {
            pipeline.process_raw(&mint_log(id, 50)).await;
        }
        assert_eq!(sink.token_ids(), vec!["1", "2", "3", "1"]);
    }
}
