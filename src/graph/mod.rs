// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Graph data model: block identity, shared block state and topology.

mod block_handle;
mod topology;

pub use block_handle::{BlockHandle, BlockId, BlockSettings, CounterSnapshot, EngineCounters, LoopState};
pub use topology::{Edge, Endpoint, PortDirection};

pub(crate) use block_handle::{BlockCore, InputBinding, Wiring};
pub(crate) use topology::Topology;
