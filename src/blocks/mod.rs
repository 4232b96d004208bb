// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Block bodies shipped with the engine and the factory that builds them
//! from configuration.

pub mod counting_sink;
pub mod counting_source;
pub mod factory;
pub mod history_block;
pub mod stats;

pub use counting_sink::CountingSink;
pub use counting_source::{CountingSource, COUNT_TAG_KEY, tags_within_stream};
pub use factory::{BlockConfig, BlockFactory};
pub use history_block::HistoryBlock;
pub use stats::{StageCounters, StageSnapshot};
