// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::engine::RunState;
use crate::errors::GraphError;
use thiserror::Error;

/// An operation was attempted in a run state that does not allow it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// Topology and settings may only change while idle or paused
    #[error("Graph edits require the flowgraph to be idle or paused (current state: {state})")]
    NotPaused { state: RunState },

    #[error("Cannot {operation} while {state}")]
    InvalidTransition {
        operation: &'static str,
        state: RunState,
    },
}

/// Failure raised from inside a block's `work` call, or a broken work contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    /// Tags may only be written at or after the output's produced count
    #[error("Tag at offset {offset} on output {port} is behind the produced count {produced}")]
    TagInPast { port: usize, offset: u64, produced: u64 },

    #[error("Block '{block}' broke the work contract: {reason}")]
    ContractViolation { block: String, reason: String },

    #[error("No {direction} port {port} in this invocation")]
    MissingPort {
        direction: crate::graph::PortDirection,
        port: usize,
    },

    #[error("Item {index} is out of range for a window of {len} items")]
    ItemOutOfRange { index: usize, len: usize },

    #[error("Item type of {requested} bytes does not match port item size {item_size}")]
    ItemSizeMismatch { requested: usize, item_size: usize },

    #[error("{0}")]
    Failed(String),
}

/// Top-level error for flowgraph operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    State(#[from] StateError),

    /// A block stopped because its work call failed
    #[error("Block '{block}' failed: {source}")]
    Block {
        block: String,
        #[source]
        source: BlockError,
    },

    /// The execution task itself panicked or was aborted
    #[error("Execution task for block '{block}' did not complete: {reason}")]
    TaskJoin { block: String, reason: String },
}
