use std::collections::{HashSet, VecDeque};

use crate::model::EventKey;

/// Bounded FIFO set of recently emitted event keys.
///
/// Suppresses redeliveries caused by reconnects, replays and overlapping
/// ranges, but only while a key is retained: once `capacity` newer keys have
/// been remembered the oldest is forgotten and a late redelivery of it would
/// be emitted again. This is an at-most-once guarantee over the retention
/// window, not over unbounded time.
#[derive(Debug, Clone)]
pub struct DedupCache {
    capacity: usize,
    keys: HashSet<EventKey>,
    order: VecDeque<EventKey>,
}

impl DedupCache {
    pub const DEFAULT_CAPACITY: usize = 4096;

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            keys: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    pub fn has(&self, key: &EventKey) -> bool {
        self.keys.contains(key)
    }

    /// Records `key`, evicting the oldest entry when full. Returns `false`
    /// if the key was already present.
    pub fn remember(&mut self, key: EventKey) -> bool {
        if !self.keys.insert(key) {
            return false;
        }
        self.order.push_back(key);
        if self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.keys.remove(&evicted);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }
}
