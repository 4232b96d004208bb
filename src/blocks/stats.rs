// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Counters owned by one block body instance.
///
/// Shared with driver code through `Block::counters`, so a scenario can read
/// them while the block runs and reset them before the next scenario.
#[derive(Debug, Default)]
pub struct StageCounters {
    items: AtomicU64,
    tags: AtomicU64,
    offset_mismatches: AtomicU64,
    last_offset_delta: AtomicI64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageSnapshot {
    pub items: u64,
    pub tags: u64,
    pub offset_mismatches: u64,
    /// `item value - tag value` at the most recent mismatch
    pub last_offset_delta: i64,
}

impl StageCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_items(&self, n: u64) {
        self.items.fetch_add(n, Ordering::Release);
    }

    pub fn add_tags(&self, n: u64) {
        self.tags.fetch_add(n, Ordering::Release);
    }

    pub fn record_mismatch(&self, delta: i64) {
        self.offset_mismatches.fetch_add(1, Ordering::Release);
        self.last_offset_delta.store(delta, Ordering::Release);
    }

    pub fn items(&self) -> u64 {
        self.items.load(Ordering::Acquire)
    }

    pub fn tags(&self) -> u64 {
        self.tags.load(Ordering::Acquire)
    }

    pub fn offset_mismatches(&self) -> u64 {
        self.offset_mismatches.load(Ordering::Acquire)
    }

    pub fn last_offset_delta(&self) -> i64 {
        self.last_offset_delta.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> StageSnapshot {
        StageSnapshot {
            items: self.items(),
            tags: self.tags(),
            offset_mismatches: self.offset_mismatches(),
            last_offset_delta: self.last_offset_delta(),
        }
    }

    pub fn reset(&self) {
        self.items.store(0, Ordering::Release);
        self.tags.store(0, Ordering::Release);
        self.offset_mismatches.store(0, Ordering::Release);
        self.last_offset_delta.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_clears_everything() {
        let counters = StageCounters::new();
        counters.add_items(10);
        counters.add_tags(2);
        counters.record_mismatch(-2000);
        assert_eq!(
            counters.snapshot(),
            StageSnapshot {
                items: 10,
                tags: 2,
                offset_mismatches: 1,
                last_offset_delta: -2000
            }
        );
        counters.reset();
        assert_eq!(counters.snapshot(), StageSnapshot::default());
    }
}
