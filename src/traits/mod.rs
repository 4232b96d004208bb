// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod block;

pub use block::{Block, BlockKind, IoSignature, TagPropagation, WorkResult};
