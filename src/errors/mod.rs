// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod config;
mod execution;
mod graph;
mod scenario;

pub use config::ConfigError;
pub use execution::{BlockError, EngineError, StateError};
pub use graph::GraphError;
pub use scenario::{ScenarioError, WatchdogError};
