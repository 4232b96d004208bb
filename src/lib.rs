// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod blocks;        // stage bodies + factory
pub mod buffer;        // channel buffers, tags, work views
pub mod config;        // engine + harness configuration
pub mod engine;        // scheduler, pause barrier, flowgraph facade
pub mod errors;        // error handling
pub mod graph;         // topology and shared block state
pub mod observability;
pub mod scenarios;     // reconfiguration scenario matrix
pub mod traits;        // the block contract
