// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for the pause barrier and topology edits.

use crate::graph::{BlockId, Endpoint};
use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// `lock()` raised the pause flag.
///
/// # Log Level
/// `info!` - Start of a reconfiguration window
pub struct PauseRequested<'a> {
    pub name: &'a str,
    pub live_loops: usize,
}

impl Display for PauseRequested<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Pausing flowgraph '{}': waiting for {} live loops",
            self.name, self.live_loops
        )
    }
}

impl StructuredLog for PauseRequested<'_> {
    fn log(&self) {
        tracing::info!(flowgraph = self.name, live_loops = self.live_loops, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "pause",
            span_name = name,
            flowgraph = self.name,
            live_loops = self.live_loops,
        )
    }
}

/// Every live loop parked; edits are allowed.
///
/// # Log Level
/// `info!` - Graph is quiescent
pub struct GraphPaused<'a> {
    pub name: &'a str,
    pub parked: usize,
}

impl Display for GraphPaused<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Flowgraph '{}' paused with {} loops parked", self.name, self.parked)
    }
}

impl StructuredLog for GraphPaused<'_> {
    fn log(&self) {
        tracing::info!(flowgraph = self.name, parked = self.parked, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("paused", span_name = name, flowgraph = self.name)
    }
}

/// `unlock()` re-validated the graph and released parked loops.
///
/// # Log Level
/// `info!` - End of a reconfiguration window
pub struct GraphResumed<'a> {
    pub name: &'a str,
    pub spawned: usize,
}

impl Display for GraphResumed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Flowgraph '{}' resumed, {} new loops spawned",
            self.name, self.spawned
        )
    }
}

impl StructuredLog for GraphResumed<'_> {
    fn log(&self) {
        tracing::info!(flowgraph = self.name, spawned = self.spawned, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("resumed", span_name = name, flowgraph = self.name)
    }
}

/// An edge was added.
///
/// # Log Level
/// `info!` - Topology change
pub struct EdgeConnected<'a> {
    pub src: Endpoint,
    pub dst: Endpoint,
    pub src_name: &'a str,
    pub dst_name: &'a str,
}

impl Display for EdgeConnected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Connected '{}' {} -> '{}' {}",
            self.src_name, self.src, self.dst_name, self.dst
        )
    }
}

impl StructuredLog for EdgeConnected<'_> {
    fn log(&self) {
        tracing::info!(
            src = %self.src,
            dst = %self.dst,
            src_name = self.src_name,
            dst_name = self.dst_name,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "edge_connected",
            span_name = name,
            src = %self.src,
            dst = %self.dst,
        )
    }
}

/// An edge was removed.
///
/// # Log Level
/// `info!` - Topology change
pub struct EdgeDisconnected {
    pub src: Endpoint,
    pub dst: Endpoint,
}

impl Display for EdgeDisconnected {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Disconnected {} -> {}", self.src, self.dst)
    }
}

impl StructuredLog for EdgeDisconnected {
    fn log(&self) {
        tracing::info!(src = %self.src, dst = %self.dst, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "edge_disconnected",
            span_name = name,
            src = %self.src,
            dst = %self.dst,
        )
    }
}

/// A channel buffer grew to satisfy new reader or writer requirements.
///
/// # Log Level
/// `debug!` - Resource detail
pub struct BufferResized {
    pub endpoint: Endpoint,
    pub from: usize,
    pub to: usize,
}

impl Display for BufferResized {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Buffer at {} grew from {} to {} items",
            self.endpoint, self.from, self.to
        )
    }
}

impl StructuredLog for BufferResized {
    fn log(&self) {
        tracing::debug!(
            endpoint = %self.endpoint,
            from = self.from,
            to = self.to,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("buffer_resized", span_name = name, endpoint = %self.endpoint)
    }
}

/// One block took over another block's cursors and buffers.
///
/// # Log Level
/// `info!` - Topology change
pub struct BlockReplaced<'a> {
    pub old: &'a str,
    pub new: &'a str,
    pub old_id: BlockId,
    pub new_id: BlockId,
}

impl Display for BlockReplaced<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Replaced '{}' {} with '{}' {}",
            self.old, self.old_id, self.new, self.new_id
        )
    }
}

impl StructuredLog for BlockReplaced<'_> {
    fn log(&self) {
        tracing::info!(
            old = self.old,
            new = self.new,
            old_id = self.old_id.0,
            new_id = self.new_id.0,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "block_replaced",
            span_name = name,
            old = self.old,
            new = self.new,
        )
    }
}

/// A scheduling setting of one block changed.
///
/// # Log Level
/// `info!` - Reconfiguration
pub struct SettingChanged<'a> {
    pub block: &'a str,
    pub setting: &'static str,
    pub from: String,
    pub to: String,
}

impl Display for SettingChanged<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Changed {} of '{}' from {} to {}",
            self.setting, self.block, self.from, self.to
        )
    }
}

impl StructuredLog for SettingChanged<'_> {
    fn log(&self) {
        tracing::info!(
            block = self.block,
            setting = self.setting,
            from = %self.from,
            to = %self.to,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "setting_changed",
            span_name = name,
            block = self.block,
            setting = self.setting,
        )
    }
}
