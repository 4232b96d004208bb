// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Structured logging for the engine and the scenario driver.
//!
//! Every diagnostic is a message struct with a `Display` implementation for
//! the human-readable text and a [`StructuredLog`](messages::StructuredLog)
//! implementation that emits the same event with machine-readable fields.
//! Call sites never format log strings themselves.
//!
//! # Architecture
//!
//! Messages are organized by subsystem:
//! * `messages::engine` - block loops and flowgraph lifecycle
//! * `messages::reconfig` - pause barrier and graph edits
//! * `messages::scenario` - scenario driver and watchdog
//!
//! # Usage
//!
//! ```rust
//! use streamwood::observability::messages::engine::FlowgraphStarted;
//! use streamwood::observability::messages::StructuredLog;
//!
//! FlowgraphStarted {
//!     name: "top",
//!     loops: 3,
//!     edges: 2,
//! }
//! .log();
//! ```

pub mod messages;
