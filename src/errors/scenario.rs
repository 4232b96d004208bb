// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::{EngineError, GraphError};
use std::time::Duration;
use thiserror::Error;

/// The scenario driver gave up waiting on the source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchdogError {
    /// The source ran (nearly) out of items before the wait target was reached,
    /// so the reconfiguration step would not happen mid-stream
    #[error("Sample limit reached: source at {produced} of ceiling {ceiling} while waiting for {target}")]
    SampleCeilingReached { target: u64, ceiling: u64, produced: u64 },

    #[error("Timed out after {elapsed:?} waiting for {waiting_for}")]
    Timeout {
        waiting_for: String,
        elapsed: Duration,
    },
}

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("Unknown scenario '{0}'")]
    Unknown(String),

    #[error(transparent)]
    Watchdog(#[from] WatchdogError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    /// A block body did not expose the counters the report needs
    #[error("Block '{0}' has no stage counters")]
    MissingCounters(String),
}
