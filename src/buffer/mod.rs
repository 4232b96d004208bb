// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Channel buffers and the item/tag views handed to blocks.
//!
//! * `item` - typed encoding of fixed-size items
//! * `tags` - offset-addressed sideband metadata
//! * `channel` - the single-writer, multi-reader ring behind every output port
//! * `io` - per-invocation input/output windows

pub mod channel;
pub mod io;
pub mod item;
pub mod tags;

pub use channel::{
    BufferStats, ChannelBuffer, ChannelState, ReaderId, ReaderRequirements, ReaderStats,
    ReaderStatus, WindowCopy,
};
pub use io::{InputItems, OutputItems, WorkIo};
pub use item::Item;
pub use tags::{Tag, TagStore};
