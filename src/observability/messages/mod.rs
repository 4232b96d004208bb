// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for structured logging, grouped by subsystem.
//!
//! * `engine` - block loops and flowgraph lifecycle
//! * `reconfig` - pause, resume and topology edits
//! * `scenario` - scenario driver and watchdog

use tracing::Span;

pub mod engine;
pub mod reconfig;
pub mod scenario;

/// A message that knows how to emit itself as a structured tracing event.
pub trait StructuredLog {
    /// Emit the message at its own level, with its fields attached.
    fn log(&self);

    /// A span carrying the message fields, for work done on its behalf.
    fn span(&self, name: &str) -> Span;
}
