// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Execution engine: one loop per block, a cooperative pause barrier and the
//! [`FlowGraph`] facade that ties them to the topology.

pub mod coordinator;
pub mod flowgraph;
pub mod scheduler;

#[cfg(test)]
mod integration_tests;

pub use coordinator::RunState;
pub use flowgraph::FlowGraph;
pub use scheduler::LoopExit;
