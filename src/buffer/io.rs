// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Views over the items a block sees during one `work` call.
//!
//! The scheduler copies each input window (look-back plus new items) out of
//! the upstream ring and hands the block an [`InputItems`] per input port and
//! an [`OutputItems`] per output port. Positions are addressed either relative
//! to the read cursor (`0..len()` for new items, negative for look-back) or by
//! absolute stream offset.

use crate::buffer::item::Item;
use crate::buffer::tags::Tag;
use crate::errors::BlockError;
use crate::graph::PortDirection;
use serde_json::Value;

/// Read-only window on one input port.
#[derive(Debug)]
pub struct InputItems<'a> {
    data: &'a [u8],
    item_size: usize,
    window_start: u64,
    lookback: usize,
    len: usize,
    tags: &'a [Tag],
}

impl<'a> InputItems<'a> {
    pub fn new(
        data: &'a [u8],
        item_size: usize,
        window_start: u64,
        lookback: usize,
        tags: &'a [Tag],
    ) -> Self {
        let total = data.len() / item_size;
        Self {
            data,
            item_size,
            window_start,
            lookback,
            len: total.saturating_sub(lookback),
            tags,
        }
    }

    /// New items granted to this call.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Look-back items present before the cursor. Never more than the
    /// block's history, and fewer when upstream has not produced that many.
    pub fn lookback(&self) -> usize {
        self.lookback
    }

    pub fn item_size(&self) -> usize {
        self.item_size
    }

    /// Absolute offset of the first item in the window (start of look-back).
    pub fn window_start(&self) -> u64 {
        self.window_start
    }

    /// Absolute offset of the first new item; equals the items consumed so far.
    pub fn nitems_read(&self) -> u64 {
        self.window_start + self.lookback as u64
    }

    /// Tags on the new items, ordered by offset.
    pub fn tags(&self) -> &[Tag] {
        self.tags
    }

    /// Position of an absolute offset inside the window:
    /// `offset - window_start`, i.e. `offset - nitems_read + lookback`.
    pub fn local_index(&self, offset: u64) -> Option<usize> {
        let index = offset.checked_sub(self.window_start)? as usize;
        (index < self.lookback + self.len).then_some(index)
    }

    /// Raw bytes of the item at `rel` (relative to the cursor, negative for look-back).
    pub fn item_bytes(&self, rel: isize) -> Option<&'a [u8]> {
        let index = self.lookback as isize + rel;
        if index < 0 || index as usize >= self.lookback + self.len {
            return None;
        }
        let start = index as usize * self.item_size;
        Some(&self.data[start..start + self.item_size])
    }

    pub fn get<T: Item>(&self, rel: isize) -> Option<T> {
        if T::SIZE != self.item_size {
            return None;
        }
        self.item_bytes(rel).map(T::read_from)
    }

    pub fn at_offset<T: Item>(&self, offset: u64) -> Option<T> {
        let index = self.local_index(offset)?;
        self.get(index as isize - self.lookback as isize)
    }

    /// The whole window, look-back first.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Only the new items.
    pub fn new_bytes(&self) -> &'a [u8] {
        &self.data[self.lookback * self.item_size..]
    }
}

/// Writable space on one output port.
#[derive(Debug)]
pub struct OutputItems<'a> {
    port: usize,
    data: &'a mut [u8],
    item_size: usize,
    produced_before: u64,
    tags: Vec<Tag>,
}

impl<'a> OutputItems<'a> {
    pub fn new(port: usize, data: &'a mut [u8], item_size: usize, produced_before: u64) -> Self {
        Self {
            port,
            data,
            item_size,
            produced_before,
            tags: Vec::new(),
        }
    }

    /// Items that may be written by this call.
    pub fn len(&self) -> usize {
        self.data.len() / self.item_size
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn item_size(&self) -> usize {
        self.item_size
    }

    /// Absolute offset that index 0 of this call lands on.
    pub fn nitems_written(&self) -> u64 {
        self.produced_before
    }

    pub fn item_bytes_mut(&mut self, index: usize) -> Result<&mut [u8], BlockError> {
        let len = self.len();
        if index >= len {
            return Err(BlockError::ItemOutOfRange { index, len });
        }
        let start = index * self.item_size;
        Ok(&mut self.data[start..start + self.item_size])
    }

    pub fn set<T: Item>(&mut self, index: usize, value: T) -> Result<(), BlockError> {
        if T::SIZE != self.item_size {
            return Err(BlockError::ItemSizeMismatch {
                requested: T::SIZE,
                item_size: self.item_size,
            });
        }
        value.write_to(self.item_bytes_mut(index)?);
        Ok(())
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        self.data
    }

    /// Attach a tag. Offsets behind this call's first item are rejected.
    pub fn add_tag(
        &mut self,
        offset: u64,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<(), BlockError> {
        self.push_tag(Tag::new(offset, key, value))
    }

    pub fn push_tag(&mut self, tag: Tag) -> Result<(), BlockError> {
        if tag.offset < self.produced_before {
            return Err(BlockError::TagInPast {
                port: self.port,
                offset: tag.offset,
                produced: self.produced_before,
            });
        }
        self.tags.push(tag);
        Ok(())
    }

    fn take_tags(&mut self) -> Vec<Tag> {
        std::mem::take(&mut self.tags)
    }
}

/// Everything one `work` call may touch.
#[derive(Debug)]
pub struct WorkIo<'a> {
    noutput_items: usize,
    inputs: Vec<InputItems<'a>>,
    outputs: Vec<OutputItems<'a>>,
}

impl<'a> WorkIo<'a> {
    pub fn new(
        noutput_items: usize,
        inputs: Vec<InputItems<'a>>,
        outputs: Vec<OutputItems<'a>>,
    ) -> Self {
        Self {
            noutput_items,
            inputs,
            outputs,
        }
    }

    /// Items granted to this call (`max_output_items`).
    pub fn noutput_items(&self) -> usize {
        self.noutput_items
    }

    pub fn input(&self, port: usize) -> Result<&InputItems<'a>, BlockError> {
        self.inputs.get(port).ok_or(BlockError::MissingPort {
            direction: PortDirection::Input,
            port,
        })
    }

    pub fn output(&mut self, port: usize) -> Result<&mut OutputItems<'a>, BlockError> {
        self.outputs.get_mut(port).ok_or(BlockError::MissingPort {
            direction: PortDirection::Output,
            port,
        })
    }

    /// Inputs and outputs at the same time, for pass-through blocks.
    pub fn split(&mut self) -> (&[InputItems<'a>], &mut [OutputItems<'a>]) {
        (&self.inputs, &mut self.outputs)
    }

    /// Tags written by the block, per output port.
    pub(crate) fn take_output_tags(&mut self) -> Vec<Vec<Tag>> {
        self.outputs.iter_mut().map(OutputItems::take_tags).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn words(values: &[u32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_relative_and_absolute_addressing() {
        // window starts at offset 97, three look-back items, two new ones
        let data = words(&[97, 98, 99, 100, 101]);
        let input = InputItems::new(&data, 4, 97, 3, &[]);

        assert_eq!(input.len(), 2);
        assert_eq!(input.nitems_read(), 100);
        assert_eq!(input.get::<u32>(0), Some(100));
        assert_eq!(input.get::<u32>(-3), Some(97));
        assert_eq!(input.get::<u32>(-4), None);
        assert_eq!(input.get::<u32>(2), None);
        assert_eq!(input.local_index(101), Some(4));
        assert_eq!(input.at_offset::<u32>(98), Some(98));
        assert_eq!(input.at_offset::<u32>(96), None);
        assert_eq!(input.get::<u64>(0), None, "wrong item type");
    }

    #[test]
    fn test_output_rejects_tags_in_the_past() {
        let mut data = vec![0u8; 8];
        let mut out = OutputItems::new(0, &mut data, 4, 500);
        assert!(out.add_tag(500, "k", json!(1)).is_ok());
        assert!(out.add_tag(2500, "future", json!(2)).is_ok());
        assert_eq!(
            out.add_tag(499, "k", json!(0)),
            Err(BlockError::TagInPast {
                port: 0,
                offset: 499,
                produced: 500
            })
        );
        assert_eq!(out.take_tags().len(), 2);
    }

    #[test]
    fn test_output_set_checks_range_and_size() {
        let mut data = vec![0u8; 8];
        let mut out = OutputItems::new(0, &mut data, 4, 0);
        out.set(1, 7u32).unwrap();
        assert!(matches!(out.set(2, 1u32), Err(BlockError::ItemOutOfRange { .. })));
        assert!(matches!(out.set(0, 1u16), Err(BlockError::ItemSizeMismatch { .. })));
        assert_eq!(&data[4..], &7u32.to_le_bytes());
    }

    #[test]
    fn test_missing_ports_are_errors() {
        let mut io = WorkIo::new(0, vec![], vec![]);
        assert!(io.input(0).is_err());
        assert!(io.output(1).is_err());
    }
}
