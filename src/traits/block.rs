// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The contract every processing stage implements.
//!
//! A block only describes its port shapes and a synchronous `work` body. The
//! scheduler owns everything else: granting aligned, history-satisfying spans,
//! committing items and tags, advancing cursors and propagating end-of-stream.
//!
//! # Examples
//!
//! ```
//! use streamwood::buffer::WorkIo;
//! use streamwood::errors::BlockError;
//! use streamwood::traits::{Block, IoSignature, WorkResult};
//!
//! /// Drops everything it is given.
//! struct NullSink;
//!
//! impl Block for NullSink {
//!     fn name(&self) -> &str {
//!         "null_sink"
//!     }
//!
//!     fn signature(&self) -> IoSignature {
//!         IoSignature::sink(4)
//!     }
//!
//!     fn work(&mut self, io: &mut WorkIo<'_>) -> Result<WorkResult, BlockError> {
//!         Ok(WorkResult::Produced(io.noutput_items()))
//!     }
//! }
//! ```

use crate::blocks::StageCounters;
use crate::buffer::WorkIo;
use crate::errors::BlockError;
use crate::graph::BlockSettings;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Discriminates blocks by port shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    /// Outputs only
    Source,
    /// Inputs only
    Sink,
    /// Inputs and outputs, one input item per output item
    Transform,
}

impl Display for BlockKind {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let kind = match self {
            BlockKind::Source => "source",
            BlockKind::Sink => "sink",
            BlockKind::Transform => "transform",
        };
        write!(f, "{}", kind)
    }
}

/// Item size in bytes for each input and output port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IoSignature {
    pub input_sizes: Vec<usize>,
    pub output_sizes: Vec<usize>,
}

impl IoSignature {
    pub fn new(input_sizes: Vec<usize>, output_sizes: Vec<usize>) -> Self {
        Self {
            input_sizes,
            output_sizes,
        }
    }

    pub fn source(item_size: usize) -> Self {
        Self::new(vec![], vec![item_size])
    }

    pub fn sink(item_size: usize) -> Self {
        Self::new(vec![item_size], vec![])
    }

    /// One input, one output, same item size.
    pub fn transform(item_size: usize) -> Self {
        Self::new(vec![item_size], vec![item_size])
    }

    pub fn inputs(&self) -> usize {
        self.input_sizes.len()
    }

    pub fn outputs(&self) -> usize {
        self.output_sizes.len()
    }

    /// `None` for a signature with no ports at all.
    pub fn kind(&self) -> Option<BlockKind> {
        match (self.input_sizes.is_empty(), self.output_sizes.is_empty()) {
            (true, false) => Some(BlockKind::Source),
            (false, true) => Some(BlockKind::Sink),
            (false, false) => Some(BlockKind::Transform),
            (true, true) => None,
        }
    }
}

/// Which outputs receive the tags a transform consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagPropagation {
    /// Every input tag goes to every output
    #[default]
    AllToAll,
    /// Input port `i` feeds output port `i` only
    OneToOne,
    /// The block handles tags itself
    Dont,
}

/// Outcome of one `work` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkResult {
    /// `n` items consumed from every input and written to every output.
    /// `n` is 0 or a multiple of the block's alignment.
    Produced(usize),
    /// Final `n` items (any count up to the grant), then end-of-stream.
    Finished(usize),
    /// End-of-stream without further items.
    Done,
}

/// A processing stage.
///
/// `work` is called from the block's own execution loop, never concurrently
/// with itself, and always with a grant that satisfies the block's alignment
/// and history (except the single tail call at end of stream).
pub trait Block: Send {
    fn name(&self) -> &str;

    fn signature(&self) -> IoSignature;

    /// Process up to `io.noutput_items()` items.
    fn work(&mut self, io: &mut WorkIo<'_>) -> Result<WorkResult, BlockError>;

    /// Settings the block wants when it is added to a flowgraph.
    fn settings(&self) -> BlockSettings {
        BlockSettings::default()
    }

    /// Counters owned by the block body, if it keeps any.
    fn counters(&self) -> Option<Arc<StageCounters>> {
        None
    }

    /// Called once by the execution loop before the first `work` call.
    fn start(&mut self) -> Result<(), BlockError> {
        Ok(())
    }

    /// Called once after the last `work` call.
    fn stop(&mut self) -> Result<(), BlockError> {
        Ok(())
    }
}
