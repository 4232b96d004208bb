// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors raised synchronously by graph construction and reconfiguration.
//!
//! Every variant is returned before the topology or any buffer is touched, or
//! after the partial edit has been rolled back, so the graph is always left as
//! it was before the failing call.

use crate::graph::{BlockId, Endpoint, PortDirection};
use thiserror::Error;

/// Configuration and resource errors for graph edits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The block id was never registered with this flowgraph
    #[error("Unknown block {0}")]
    UnknownBlock(BlockId),

    /// A port index outside the block's signature
    #[error("Block '{block}' has no {direction} port {port} ({available} available)")]
    PortOutOfRange {
        block: String,
        direction: PortDirection,
        port: usize,
        available: usize,
    },

    /// Producer and consumer disagree on bytes per item
    #[error("Item size mismatch on {src} -> {dst}: producer writes {src_size} bytes, consumer reads {dst_size} bytes")]
    ItemSizeMismatch {
        src: Endpoint,
        dst: Endpoint,
        src_size: usize,
        dst_size: usize,
    },

    /// An input port accepts a single producer
    #[error("Input {dst} is already fed by {existing}")]
    InputAlreadyConnected { dst: Endpoint, existing: Endpoint },

    #[error("No edge {src} -> {dst}")]
    EdgeNotFound { src: Endpoint, dst: Endpoint },

    #[error("Alignment for block '{block}' must be greater than zero")]
    InvalidAlignment { block: String },

    #[error("Block '{block}' cannot feed itself")]
    SelfLoop { block: String },

    /// Raised at start/unlock for blocks that are part of the graph but not fully wired
    #[error("Block '{block}' has an unconnected {direction} port {port}")]
    UnconnectedPort {
        block: String,
        direction: PortDirection,
        port: usize,
    },

    #[error("Block '{block}' declares a zero item size on {direction} port {port}")]
    InvalidItemSize {
        block: String,
        direction: PortDirection,
        port: usize,
    },

    #[error("Block '{block}' declares no ports")]
    NoPorts { block: String },

    #[error("Cannot replace '{old}' with '{new}': {reason}")]
    IncompatibleReplacement {
        old: String,
        new: String,
        reason: String,
    },

    #[error("Unknown block kind '{0}'")]
    UnknownBlockKind(String),

    #[error("Invalid option '{option}' for block '{block}': {reason}")]
    InvalidOption {
        block: String,
        option: String,
        reason: String,
    },

    /// Resource exhaustion: the buffer cannot hold the history/alignment asked of it
    #[error("Buffer {endpoint} would need {required_items} items ({required_bytes} bytes), above the {limit_bytes} byte limit")]
    BufferTooLarge {
        endpoint: Endpoint,
        required_items: usize,
        required_bytes: usize,
        limit_bytes: usize,
    },
}
