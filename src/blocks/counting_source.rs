// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::blocks::StageCounters;
use crate::buffer::WorkIo;
use crate::errors::BlockError;
use crate::traits::{Block, IoSignature, WorkResult};
use std::sync::Arc;

/// Tag key written by [`CountingSource`].
pub const COUNT_TAG_KEY: &str = "item_count";

/// Tags a [`CountingSource`] of `item_count` items writes whose offset, moved
/// forward by `shift` items, still falls inside the stream. Tags moved past the
/// last item have nothing to land on and are never delivered.
pub fn tags_within_stream(item_count: u64, tag_interval: u64, shift: u64) -> u64 {
    if tag_interval == 0 {
        return 0;
    }
    item_count.saturating_sub(shift) / tag_interval
}

/// Source of `u32` items whose value equals their stream position.
///
/// Every `tag_interval`-th item (positions `interval - 1`, `2 * interval - 1`, ...)
/// carries a [`COUNT_TAG_KEY`] tag whose value is the item's own value, so
/// `floor(item_count / tag_interval)` tags are written in total. An interval of
/// zero disables tagging. Ends the stream after `item_count` items.
pub struct CountingSource {
    name: String,
    item_count: u64,
    tag_interval: u64,
    next: u64,
    counters: Arc<StageCounters>,
}

impl CountingSource {
    pub fn new(item_count: u64, tag_interval: u64) -> Self {
        Self {
            name: "counting_source".to_string(),
            item_count,
            tag_interval,
            next: 0,
            counters: Arc::new(StageCounters::new()),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Items emitted so far.
    pub fn emitted(&self) -> u64 {
        self.next
    }
}

impl Block for CountingSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn signature(&self) -> IoSignature {
        IoSignature::source(4)
    }

    fn counters(&self) -> Option<Arc<StageCounters>> {
        Some(self.counters.clone())
    }

    fn work(&mut self, io: &mut WorkIo<'_>) -> Result<WorkResult, BlockError> {
        if self.next >= self.item_count {
            return Ok(WorkResult::Done);
        }
        let remaining = self.item_count - self.next;
        let n = (io.noutput_items() as u64).min(remaining) as usize;

        let out = io.output(0)?;
        let base = out.nitems_written();
        let mut tags = 0;
        for i in 0..n {
            // the stream value wraps with the item type
            let value = self.next as u32;
            out.set(i, value)?;
            if self.tag_interval > 0 && (self.next + 1) % self.tag_interval == 0 {
                out.add_tag(base + i as u64, COUNT_TAG_KEY, value)?;
                tags += 1;
            }
            self.next += 1;
        }
        self.counters.add_items(n as u64);
        self.counters.add_tags(tags);

        if self.next >= self.item_count {
            Ok(WorkResult::Finished(n))
        } else {
            Ok(WorkResult::Produced(n))
        }
    }
}
