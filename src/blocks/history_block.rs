// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::buffer::WorkIo;
use crate::errors::BlockError;
use crate::graph::{BlockSettings, PortDirection};
use crate::traits::{Block, IoSignature, WorkResult};

/// Pass-through that reads its input through the look-back window.
///
/// Output item `j` is the input item `delay` positions before the item at `j`.
/// With `delay == 0` the block is a plain copy. A delay larger than the
/// look-back the scheduler actually provides (the block's history, or less
/// at stream start) yields zero-filled items for the missing positions.
///
/// The block does not declare its delay on its own; that is a flowgraph
/// setting (`FlowGraph::declare_delay`).
pub struct HistoryBlock {
    name: String,
    delay: usize,
    item_size: usize,
    history: usize,
}

impl HistoryBlock {
    /// `u32` pass-through delaying by `delay` items.
    pub fn new(delay: usize) -> Self {
        Self {
            name: "history_block".to_string(),
            delay,
            item_size: 4,
            history: 0,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_item_size(mut self, item_size: usize) -> Self {
        self.item_size = item_size;
        self
    }

    /// History requested when the block is added to a flowgraph.
    pub fn with_history(mut self, history: usize) -> Self {
        self.history = history;
        self
    }

    pub fn delay(&self) -> usize {
        self.delay
    }
}

impl Block for HistoryBlock {
    fn name(&self) -> &str {
        &self.name
    }

    fn signature(&self) -> IoSignature {
        IoSignature::transform(self.item_size)
    }

    fn settings(&self) -> BlockSettings {
        BlockSettings::default().with_history(self.history)
    }

    fn work(&mut self, io: &mut WorkIo<'_>) -> Result<WorkResult, BlockError> {
        let n = io.noutput_items();
        let delay = self.delay as isize;
        let (inputs, outputs) = io.split();
        let input = inputs.first().ok_or(BlockError::MissingPort {
            direction: PortDirection::Input,
            port: 0,
        })?;
        let output = outputs.first_mut().ok_or(BlockError::MissingPort {
            direction: PortDirection::Output,
            port: 0,
        })?;

        for j in 0..n {
            let target = output.item_bytes_mut(j)?;
            match input.item_bytes(j as isize - delay) {
                Some(source) => target.copy_from_slice(source),
                None => target.fill(0),
            }
        }
        Ok(WorkResult::Produced(n))
    }
}
