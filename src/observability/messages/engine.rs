// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for block loops and the flowgraph lifecycle.

use crate::engine::RunState;
use crate::errors::BlockError;
use crate::graph::{BlockId, BlockSettings, CounterSnapshot};
use crate::observability::messages::StructuredLog;
use crate::traits::BlockKind;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// A block was registered with a flowgraph.
///
/// # Log Level
/// `debug!` - Construction detail
pub struct BlockAdded<'a> {
    pub block: &'a str,
    pub id: BlockId,
    pub kind: BlockKind,
    pub settings: BlockSettings,
}

impl Display for BlockAdded<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Added {} block '{}' as {} (history={}, alignment={}, declared_delay={})",
            self.kind,
            self.block,
            self.id,
            self.settings.history,
            self.settings.alignment,
            self.settings.declared_delay
        )
    }
}

impl StructuredLog for BlockAdded<'_> {
    fn log(&self) {
        tracing::debug!(
            block = self.block,
            block_id = self.id.0,
            kind = %self.kind,
            history = self.settings.history,
            alignment = self.settings.alignment,
            declared_delay = self.settings.declared_delay,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "block_added",
            span_name = name,
            block = self.block,
            block_id = self.id.0,
        )
    }
}

/// A block's execution loop started.
///
/// # Log Level
/// `debug!` - One per loop spawn
///
/// # Example
/// ```
/// use streamwood::graph::BlockSettings;
/// use streamwood::observability::messages::engine::BlockLoopStarted;
/// use streamwood::traits::BlockKind;
///
/// let msg = BlockLoopStarted {
///     block: "history_block",
///     kind: BlockKind::Transform,
///     settings: BlockSettings::default().with_history(5000),
/// };
///
/// tracing::debug!("{}", msg);
/// ```
pub struct BlockLoopStarted<'a> {
    pub block: &'a str,
    pub kind: BlockKind,
    pub settings: BlockSettings,
}

impl Display for BlockLoopStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Loop started for {} '{}' (history={}, alignment={})",
            self.kind, self.block, self.settings.history, self.settings.alignment
        )
    }
}

impl StructuredLog for BlockLoopStarted<'_> {
    fn log(&self) {
        tracing::debug!(
            block = self.block,
            kind = %self.kind,
            history = self.settings.history,
            alignment = self.settings.alignment,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "block_loop",
            span_name = name,
            block = self.block,
            kind = %self.kind,
        )
    }
}

/// A block's execution loop ended, normally or with an error.
///
/// # Log Level
/// `debug!` - Counters at exit
pub struct BlockLoopExited<'a> {
    pub block: &'a str,
    pub reason: &'a str,
    pub counters: CounterSnapshot,
}

impl Display for BlockLoopExited<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Loop exited for '{}' ({}): produced={}, consumed={}, invocations={}",
            self.block,
            self.reason,
            self.counters.produced,
            self.counters.consumed,
            self.counters.invocations
        )
    }
}

impl StructuredLog for BlockLoopExited<'_> {
    fn log(&self) {
        tracing::debug!(
            block = self.block,
            reason = self.reason,
            produced = self.counters.produced,
            consumed = self.counters.consumed,
            tags_received = self.counters.tags_received,
            tags_emitted = self.counters.tags_emitted,
            invocations = self.counters.invocations,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "block_loop_exited",
            span_name = name,
            block = self.block,
            reason = self.reason,
        )
    }
}

/// A block body failed or broke the work contract.
///
/// # Log Level
/// `error!` - Stops the block and ends its output streams
pub struct BlockFailed<'a> {
    pub block: &'a str,
    pub error: &'a BlockError,
}

impl Display for BlockFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Block '{}' failed: {}", self.block, self.error)
    }
}

impl StructuredLog for BlockFailed<'_> {
    fn log(&self) {
        tracing::error!(
            block = self.block,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "block_failed",
            span_name = name,
            block = self.block,
            error = %self.error,
        )
    }
}

/// `start()` validated the graph and spawned its loops.
///
/// # Log Level
/// `info!` - Important operational event
pub struct FlowgraphStarted<'a> {
    pub name: &'a str,
    pub loops: usize,
    pub edges: usize,
}

impl Display for FlowgraphStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Flowgraph '{}' started: {} loops over {} edges",
            self.name, self.loops, self.edges
        )
    }
}

impl StructuredLog for FlowgraphStarted<'_> {
    fn log(&self) {
        tracing::info!(
            flowgraph = self.name,
            loops = self.loops,
            edges = self.edges,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "flowgraph",
            span_name = name,
            flowgraph = self.name,
            loops = self.loops,
            edges = self.edges,
        )
    }
}

/// Every loop was joined.
///
/// # Log Level
/// `info!` normally, `warn!` when a block failed
pub struct FlowgraphCompleted<'a> {
    pub name: &'a str,
    pub loops_joined: usize,
    pub duration: Duration,
    pub failed: bool,
}

impl Display for FlowgraphCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let outcome = if self.failed { "with a block failure" } else { "cleanly" };
        write!(
            f,
            "Flowgraph '{}' completed {} after {:?}: {} loops joined",
            self.name, outcome, self.duration, self.loops_joined
        )
    }
}

impl StructuredLog for FlowgraphCompleted<'_> {
    fn log(&self) {
        if self.failed {
            tracing::warn!(
                flowgraph = self.name,
                loops_joined = self.loops_joined,
                duration_ms = self.duration.as_millis() as u64,
                failed = self.failed,
                "{}", self
            );
        } else {
            tracing::info!(
                flowgraph = self.name,
                loops_joined = self.loops_joined,
                duration_ms = self.duration.as_millis() as u64,
                failed = self.failed,
                "{}", self
            );
        }
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "flowgraph_completed",
            span_name = name,
            flowgraph = self.name,
            duration = ?self.duration,
        )
    }
}

/// `stop()` cancelled every loop.
///
/// # Log Level
/// `info!` - Important operational event
pub struct FlowgraphStopped<'a> {
    pub name: &'a str,
    pub previous: RunState,
}

impl Display for FlowgraphStopped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Flowgraph '{}' stopped while {}", self.name, self.previous)
    }
}

impl StructuredLog for FlowgraphStopped<'_> {
    fn log(&self) {
        tracing::info!(
            flowgraph = self.name,
            previous = %self.previous,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "flowgraph_stopped",
            span_name = name,
            flowgraph = self.name,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_message_mentions_failure() {
        let msg = FlowgraphCompleted {
            name: "top",
            loops_joined: 4,
            duration: Duration::from_millis(1500),
            failed: true,
        };
        let text = msg.to_string();
        assert!(text.contains("'top'"));
        assert!(text.contains("with a block failure"));
        assert!(text.contains("4 loops joined"));
    }

    #[test]
    fn test_block_failed_includes_error() {
        let error = BlockError::Failed("disk on fire".to_string());
        let msg = BlockFailed {
            block: "sink",
            error: &error,
        };
        assert!(msg.to_string().contains("disk on fire"));
    }
}
