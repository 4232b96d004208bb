// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Per-output-port channel buffer: one writer, any number of independent readers.
//!
//! The buffer is a ring of `capacity` items addressed by absolute offset
//! (`offset % capacity`). It never forgets how many items were ever written
//! (`produced`) and tracks, per reader, how many items that reader has consumed
//! together with the look-back (`history`) and granularity (`alignment`) it needs.
//!
//! # Retention
//!
//! A reader's window starts at `max(consumed - history, oldest)`, where `oldest`
//! is the first item the ring still holds. The writer may only overwrite items
//! that lie before every reader's window start, which gives the two counter
//! invariants the scheduler relies on:
//!
//! ```text
//! consumed <= produced                       for every reader
//! produced - min(window start) <= capacity
//! ```
//!
//! Tags are dropped exactly when the ring overwrites the item they annotate.
//!
//! # Sizing
//!
//! Required capacity is `max(history + alignment)` over the readers plus the
//! writer's alignment plus a safety margin. Buffers only ever grow; growing
//! copies every retained item so existing look-back is preserved for readers
//! that attach later or raise their history.

use crate::buffer::tags::{Tag, TagStore};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, Notify};

pub type ReaderId = u64;

/// What a consumer needs from the buffer it reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderRequirements {
    pub history: usize,
    pub alignment: usize,
}

#[derive(Debug)]
struct ReaderCursor {
    consumed: u64,
    requirements: ReaderRequirements,
    wakeup: Arc<Notify>,
}

/// Snapshot of one reader as seen by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderStatus {
    /// Produced but not yet consumed by this reader
    pub available: usize,
    pub writer_done: bool,
}

/// Result of copying a reader's window out of the ring.
#[derive(Debug, Clone)]
pub struct WindowCopy {
    /// Absolute offset of the first item copied (start of look-back)
    pub window_start: u64,
    /// Absolute offset of the first new item
    pub consumed: u64,
    /// Look-back items actually present before `consumed`
    pub lookback: usize,
    /// Tags on the new items only
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReaderStats {
    pub reader: ReaderId,
    pub consumed: u64,
    pub history: usize,
    pub alignment: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BufferStats {
    pub capacity: usize,
    pub item_size: usize,
    pub produced: u64,
    pub oldest_retained: u64,
    pub writer_done: bool,
    pub pending_tags: usize,
    pub readers: Vec<ReaderStats>,
}

/// Ring storage and cursors. Always accessed through [`ChannelBuffer::lock`].
#[derive(Debug)]
pub struct ChannelState {
    item_size: usize,
    capacity: usize,
    data: Vec<u8>,
    produced: u64,
    oldest: u64,
    writer_alignment: usize,
    writer_done: bool,
    writer_wakeup: Arc<Notify>,
    readers: BTreeMap<ReaderId, ReaderCursor>,
    tags: TagStore,
}

impl ChannelState {
    pub fn new(
        item_size: usize,
        capacity: usize,
        writer_alignment: usize,
        writer_wakeup: Arc<Notify>,
    ) -> Self {
        let capacity = capacity.max(1);
        Self {
            item_size,
            capacity,
            data: vec![0; capacity * item_size],
            produced: 0,
            oldest: 0,
            writer_alignment: writer_alignment.max(1),
            writer_done: false,
            writer_wakeup,
            readers: BTreeMap::new(),
            tags: TagStore::new(),
        }
    }

    pub fn item_size(&self) -> usize {
        self.item_size
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn produced(&self) -> u64 {
        self.produced
    }

    pub fn oldest_retained(&self) -> u64 {
        self.oldest
    }

    pub fn writer_done(&self) -> bool {
        self.writer_done
    }

    pub fn reader_count(&self) -> usize {
        self.readers.len()
    }

    pub fn has_reader(&self, reader: ReaderId) -> bool {
        self.readers.contains_key(&reader)
    }

    pub fn consumed(&self, reader: ReaderId) -> Option<u64> {
        self.readers.get(&reader).map(|c| c.consumed)
    }

    fn window_start(&self, cursor: &ReaderCursor) -> u64 {
        cursor
            .consumed
            .saturating_sub(cursor.requirements.history as u64)
            .max(self.oldest)
    }

    /// First absolute offset some reader may still look at.
    fn retain_from(&self) -> u64 {
        self.readers
            .values()
            .map(|c| self.window_start(c))
            .min()
            .unwrap_or(self.produced)
    }

    /// Items the writer may append without clobbering anything a reader needs.
    pub fn space(&self) -> usize {
        let held = (self.produced - self.retain_from()) as usize;
        self.capacity.saturating_sub(held)
    }

    pub fn reader_status(&self, reader: ReaderId) -> Option<ReaderStatus> {
        self.readers.get(&reader).map(|c| ReaderStatus {
            available: (self.produced - c.consumed) as usize,
            writer_done: self.writer_done,
        })
    }

    pub fn required_capacity(&self, margin: usize) -> usize {
        self.required_capacity_for(margin, self.writer_alignment, None)
    }

    /// Capacity that would be required after changing the writer alignment
    /// and/or one reader's requirements. Nothing is modified.
    pub fn required_capacity_for(
        &self,
        margin: usize,
        writer_alignment: usize,
        reader: Option<(ReaderId, ReaderRequirements)>,
    ) -> usize {
        let reader_need = self
            .readers
            .iter()
            .map(|(id, c)| match reader {
                Some((changed, requirements)) if changed == *id => requirements,
                _ => c.requirements,
            })
            .chain(reader.map(|(_, requirements)| requirements))
            .map(|r| r.history + r.alignment)
            .max()
            .unwrap_or(0);
        reader_need + writer_alignment.max(1) + margin
    }

    /// Grow the ring to `required` items, keeping every retained item in place
    /// by absolute offset. Returns `(old, new)` capacity when it grew.
    pub fn ensure_capacity(&mut self, required: usize) -> Option<(usize, usize)> {
        if required <= self.capacity {
            return None;
        }
        let retained = (self.produced - self.oldest) as usize;
        let mut held = Vec::new();
        self.copy_out(self.oldest, retained, &mut held);

        let old_capacity = self.capacity;
        self.capacity = required;
        self.data = vec![0; required * self.item_size];
        self.place(self.oldest, &held);
        Some((old_capacity, required))
    }

    pub fn add_reader(
        &mut self,
        reader: ReaderId,
        requirements: ReaderRequirements,
        wakeup: Arc<Notify>,
    ) -> u64 {
        self.readers.insert(
            reader,
            ReaderCursor {
                consumed: self.produced,
                requirements,
                wakeup,
            },
        );
        self.produced
    }

    pub fn remove_reader(&mut self, reader: ReaderId) -> Option<ReaderRequirements> {
        let removed = self.readers.remove(&reader).map(|c| c.requirements);
        if removed.is_some() {
            self.writer_wakeup.notify_one();
        }
        removed
    }

    pub fn reader_requirements(&self, reader: ReaderId) -> Option<ReaderRequirements> {
        self.readers.get(&reader).map(|c| c.requirements)
    }

    /// Returns the previous requirements.
    pub fn set_reader_requirements(
        &mut self,
        reader: ReaderId,
        requirements: ReaderRequirements,
    ) -> Option<ReaderRequirements> {
        let cursor = self.readers.get_mut(&reader)?;
        let previous = cursor.requirements;
        cursor.requirements = requirements;
        self.writer_wakeup.notify_one();
        Some(previous)
    }

    pub fn set_reader_wakeup(&mut self, reader: ReaderId, wakeup: Arc<Notify>) {
        if let Some(cursor) = self.readers.get_mut(&reader) {
            cursor.wakeup = wakeup;
        }
    }

    pub fn writer_alignment(&self) -> usize {
        self.writer_alignment
    }

    /// Returns the previous alignment.
    pub fn set_writer_alignment(&mut self, alignment: usize) -> usize {
        std::mem::replace(&mut self.writer_alignment, alignment.max(1))
    }

    pub fn set_writer_wakeup(&mut self, wakeup: Arc<Notify>) {
        self.writer_wakeup = wakeup;
    }

    /// Copy `n` new items plus the reader's look-back into `out`.
    pub fn read_window(&self, reader: ReaderId, n: usize, out: &mut Vec<u8>) -> Option<WindowCopy> {
        let cursor = self.readers.get(&reader)?;
        let n = n.min((self.produced - cursor.consumed) as usize);
        let window_start = self.window_start(cursor);
        let lookback = (cursor.consumed - window_start) as usize;
        self.copy_out(window_start, lookback + n, out);
        Some(WindowCopy {
            window_start,
            consumed: cursor.consumed,
            lookback,
            tags: self.tags.in_window(cursor.consumed, cursor.consumed + n as u64),
        })
    }

    /// Append whole items and their tags, then wake every reader.
    pub fn write(&mut self, items: &[u8], tags: Vec<Tag>) -> usize {
        let count = items.len() / self.item_size;
        debug_assert!(count <= self.space(), "writer overran the slowest reader");
        self.place(self.produced, &items[..count * self.item_size]);
        self.produced += count as u64;
        self.oldest = self
            .oldest
            .max(self.produced.saturating_sub(self.capacity as u64));

        for tag in tags {
            self.tags.insert(tag);
        }
        self.tags.prune_before(self.oldest);

        for cursor in self.readers.values() {
            cursor.wakeup.notify_one();
        }
        count
    }

    /// Advance a reader past `n` items and wake the writer.
    pub fn consume(&mut self, reader: ReaderId, n: usize) -> bool {
        let produced = self.produced;
        match self.readers.get_mut(&reader) {
            Some(cursor) => {
                debug_assert!(cursor.consumed + n as u64 <= produced);
                cursor.consumed = (cursor.consumed + n as u64).min(produced);
                self.writer_wakeup.notify_one();
                true
            }
            None => false,
        }
    }

    /// End of stream from the writer.
    pub fn mark_done(&mut self) {
        self.writer_done = true;
        for cursor in self.readers.values() {
            cursor.wakeup.notify_one();
        }
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            capacity: self.capacity,
            item_size: self.item_size,
            produced: self.produced,
            oldest_retained: self.oldest,
            writer_done: self.writer_done,
            pending_tags: self.tags.len(),
            readers: self
                .readers
                .iter()
                .map(|(id, c)| ReaderStats {
                    reader: *id,
                    consumed: c.consumed,
                    history: c.requirements.history,
                    alignment: c.requirements.alignment,
                })
                .collect(),
        }
    }

    fn slot(&self, offset: u64) -> usize {
        (offset % self.capacity as u64) as usize
    }

    fn copy_out(&self, start: u64, count: usize, out: &mut Vec<u8>) {
        let size = self.item_size;
        out.clear();
        out.reserve(count * size);
        let first = self.slot(start);
        let run = count.min(self.capacity - first);
        out.extend_from_slice(&self.data[first * size..(first + run) * size]);
        if run < count {
            out.extend_from_slice(&self.data[..(count - run) * size]);
        }
    }

    fn place(&mut self, start: u64, bytes: &[u8]) {
        let size = self.item_size;
        let count = bytes.len() / size;
        let first = self.slot(start);
        let run = count.min(self.capacity - first);
        self.data[first * size..(first + run) * size].copy_from_slice(&bytes[..run * size]);
        if run < count {
            self.data[..(count - run) * size].copy_from_slice(&bytes[run * size..count * size]);
        }
    }
}

/// Shared handle to one output port's buffer.
///
/// The buffer outlives any particular writer: a replaced block hands its
/// buffers to its successor, so `produced` keeps counting across the swap.
#[derive(Debug)]
pub struct ChannelBuffer {
    state: Mutex<ChannelState>,
    next_reader: AtomicU64,
}

impl ChannelBuffer {
    pub fn new(
        item_size: usize,
        capacity: usize,
        writer_alignment: usize,
        writer_wakeup: Arc<Notify>,
    ) -> Self {
        Self {
            state: Mutex::new(ChannelState::new(
                item_size,
                capacity,
                writer_alignment,
                writer_wakeup,
            )),
            next_reader: AtomicU64::new(0),
        }
    }

    pub fn next_reader_id(&self) -> ReaderId {
        self.next_reader.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn lock(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().await
    }

    pub async fn stats(&self) -> BufferStats {
        self.state.lock().await.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn words(values: &[u32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn decode(bytes: &[u8]) -> Vec<u32> {
        bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    fn state(capacity: usize) -> ChannelState {
        ChannelState::new(4, capacity, 1, Arc::new(Notify::new()))
    }

    fn reqs(history: usize, alignment: usize) -> ReaderRequirements {
        ReaderRequirements { history, alignment }
    }

    #[test]
    fn test_space_tracks_slowest_reader_window() {
        let mut st = state(8);
        st.add_reader(0, reqs(2, 1), Arc::new(Notify::new()));
        st.add_reader(1, reqs(0, 1), Arc::new(Notify::new()));
        assert_eq!(st.space(), 8);

        st.write(&words(&[0, 1, 2, 3, 4, 5]), vec![]);
        assert_eq!(st.space(), 2);

        st.consume(1, 6);
        assert_eq!(st.space(), 2, "reader 0 still pins everything");

        st.consume(0, 5);
        // reader 0 window now starts at 5 - 2 = 3
        assert_eq!(st.space(), 5);
    }

    #[test]
    fn test_no_readers_means_unbounded_overwrite() {
        let mut st = state(4);
        st.write(&words(&[1, 2, 3, 4]), vec![]);
        assert_eq!(st.space(), 4);
        st.write(&words(&[5, 6]), vec![]);
        assert_eq!(st.oldest_retained(), 2);
    }

    #[test]
    fn test_read_window_includes_available_lookback_only() {
        let mut st = state(16);
        st.add_reader(0, reqs(4, 1), Arc::new(Notify::new()));
        st.write(&words(&[10, 11, 12]), vec![]);

        let mut out = Vec::new();
        let window = st.read_window(0, 3, &mut out).unwrap();
        assert_eq!(window.lookback, 0, "no items exist before the first one");
        assert_eq!(decode(&out), vec![10, 11, 12]);

        st.consume(0, 3);
        st.write(&words(&[13, 14]), vec![]);
        let window = st.read_window(0, 2, &mut out).unwrap();
        assert_eq!(window.window_start, 0);
        assert_eq!(window.consumed, 3);
        assert_eq!(window.lookback, 3);
        assert_eq!(decode(&out), vec![10, 11, 12, 13, 14]);
    }

    #[test]
    fn test_window_wraps_around_ring() {
        let mut st = state(5);
        st.add_reader(0, reqs(1, 1), Arc::new(Notify::new()));
        let mut out = Vec::new();
        for chunk in [[0u32, 1, 2], [3, 4, 5], [6, 7, 8]] {
            st.write(&words(&chunk), vec![]);
            let n = st.reader_status(0).unwrap().available;
            let window = st.read_window(0, n, &mut out).unwrap();
            let values = decode(&out);
            assert_eq!(values.len(), window.lookback + n);
            assert_eq!(*values.last().unwrap(), chunk[2]);
            st.consume(0, n);
        }
        assert_eq!(decode(&out), vec![5, 6, 7, 8]);
    }

    #[test]
    fn test_tags_only_cover_new_items_and_age_with_ring() {
        let mut st = state(4);
        st.add_reader(0, reqs(0, 1), Arc::new(Notify::new()));
        st.write(
            &words(&[0, 1, 2]),
            vec![Tag::new(1, "k", json!(1)), Tag::new(6, "future", json!(6))],
        );
        let mut out = Vec::new();
        let window = st.read_window(0, 3, &mut out).unwrap();
        assert_eq!(window.tags.len(), 1);
        assert_eq!(window.tags[0].offset, 1);

        st.consume(0, 3);
        st.write(&words(&[3, 4, 5]), vec![]);
        // ring of 4 now holds offsets 2..6, tag at 1 is gone with its item
        assert_eq!(st.oldest_retained(), 2);
        assert_eq!(st.stats().pending_tags, 1);
    }

    #[test]
    fn test_grow_preserves_retained_items() {
        let mut st = state(4);
        st.add_reader(0, reqs(0, 1), Arc::new(Notify::new()));
        st.write(&words(&[0, 1, 2]), vec![]);
        st.consume(0, 3);
        st.write(&words(&[3, 4, 5]), vec![]);
        assert_eq!(st.oldest_retained(), 2);

        assert_eq!(st.ensure_capacity(10), Some((4, 10)));
        assert_eq!(st.ensure_capacity(6), None, "buffers never shrink");

        st.set_reader_requirements(0, reqs(8, 1));
        let mut out = Vec::new();
        let window = st.read_window(0, 3, &mut out).unwrap();
        // history of 8 asked for, only offsets 2..3 survived the old ring
        assert_eq!(window.window_start, 2);
        assert_eq!(window.lookback, 1);
        assert_eq!(decode(&out), vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_new_reader_starts_at_produced() {
        let mut st = state(8);
        st.add_reader(0, reqs(0, 1), Arc::new(Notify::new()));
        st.write(&words(&[0, 1, 2, 3]), vec![]);
        assert_eq!(st.add_reader(1, reqs(2, 1), Arc::new(Notify::new())), 4);
        assert_eq!(st.reader_status(1).unwrap().available, 0);
        assert_eq!(st.reader_status(0).unwrap().available, 4);
    }

    #[test]
    fn test_required_capacity_uses_largest_reader_need() {
        let mut st = state(1);
        st.set_writer_alignment(100);
        st.add_reader(0, reqs(5000, 1), Arc::new(Notify::new()));
        st.add_reader(1, reqs(7000, 200), Arc::new(Notify::new()));
        assert_eq!(st.required_capacity(10), 7200 + 100 + 10);
        st.remove_reader(1);
        assert_eq!(st.required_capacity(10), 5001 + 100 + 10);
    }

    #[test]
    fn test_required_capacity_for_previews_changes() {
        let mut st = state(1);
        st.add_reader(0, reqs(5000, 1), Arc::new(Notify::new()));
        st.add_reader(1, reqs(100, 1), Arc::new(Notify::new()));

        // raising reader 1 above reader 0
        assert_eq!(st.required_capacity_for(0, 1, Some((1, reqs(6000, 1)))), 6002);
        // lowering reader 0 leaves reader 1 as the largest
        assert_eq!(st.required_capacity_for(0, 1, Some((0, reqs(10, 1)))), 102);
        // writer alignment change only
        assert_eq!(st.required_capacity_for(0, 200, None), 5201);
        assert_eq!(st.reader_requirements(0), Some(reqs(5000, 1)), "preview only");
    }

    #[test]
    fn test_mark_done_is_visible_to_readers() {
        let mut st = state(4);
        st.add_reader(0, reqs(0, 1), Arc::new(Notify::new()));
        st.mark_done();
        assert_eq!(
            st.reader_status(0),
            Some(ReaderStatus {
                available: 0,
                writer_done: true
            })
        );
    }
}
