// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::blocks::StageCounters;
use crate::buffer::WorkIo;
use crate::errors::BlockError;
use crate::traits::{Block, IoSignature, WorkResult};
use std::sync::Arc;

/// Sink that counts `u32` items and checks every delivered tag against the
/// item it annotates.
///
/// A tag whose value differs from the item value at the tag's offset is an
/// offset mismatch. The sink records it and keeps going.
pub struct CountingSink {
    name: String,
    counters: Arc<StageCounters>,
}

impl CountingSink {
    pub fn new() -> Self {
        Self {
            name: "counting_sink".to_string(),
            counters: Arc::new(StageCounters::new()),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Default for CountingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Block for CountingSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn signature(&self) -> IoSignature {
        IoSignature::sink(4)
    }

    fn counters(&self) -> Option<Arc<StageCounters>> {
        Some(self.counters.clone())
    }

    fn work(&mut self, io: &mut WorkIo<'_>) -> Result<WorkResult, BlockError> {
        let n = io.noutput_items();
        let input = io.input(0)?;

        for tag in input.tags() {
            let Some(item) = input.at_offset::<u32>(tag.offset) else {
                continue;
            };
            let expected = tag.value.as_i64().unwrap_or_default();
            if i64::from(item) != expected {
                self.counters.record_mismatch(i64::from(item) - expected);
            }
        }
        self.counters.add_tags(input.tags().len() as u64);
        self.counters.add_items(n as u64);

        Ok(WorkResult::Produced(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{InputItems, Tag};

    fn words(values: impl Iterator<Item = u32>) -> Vec<u8> {
        values.flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_matching_tags_are_not_mismatches() {
        let data = words(200..300);
        let tags = vec![Tag::new(201, "item_count", 201u32), Tag::new(250, "item_count", 250u32)];
        let mut sink = CountingSink::new();
        let input = InputItems::new(&data, 4, 200, 0, &tags);
        let mut io = WorkIo::new(100, vec![input], vec![]);

        assert_eq!(sink.work(&mut io).unwrap(), WorkResult::Produced(100));
        let snapshot = sink.counters.snapshot();
        assert_eq!(snapshot.items, 100);
        assert_eq!(snapshot.tags, 2);
        assert_eq!(snapshot.offset_mismatches, 0);
    }

    #[test]
    fn test_shifted_items_are_reported_with_delta() {
        // items delayed by 20 without telling anyone: value at offset k is k - 20
        let data = words((200..300).map(|v| v - 20));
        let tags = vec![Tag::new(230, "item_count", 230u32)];
        let mut sink = CountingSink::new();
        let input = InputItems::new(&data, 4, 200, 0, &tags);
        let mut io = WorkIo::new(100, vec![input], vec![]);

        sink.work(&mut io).unwrap();
        assert_eq!(sink.counters.offset_mismatches(), 1);
        assert_eq!(sink.counters.last_offset_delta(), -20);
    }

    #[test]
    fn test_lookback_does_not_shift_tag_lookup() {
        // ten look-back items before the cursor at 110
        let data = words(100..130);
        let tags = vec![Tag::new(115, "item_count", 115u32)];
        let mut sink = CountingSink::new();
        let input = InputItems::new(&data, 4, 100, 10, &tags);
        let mut io = WorkIo::new(20, vec![input], vec![]);

        sink.work(&mut io).unwrap();
        assert_eq!(sink.counters.offset_mismatches(), 0);
        assert_eq!(sink.counters.items(), 20);
    }
}
