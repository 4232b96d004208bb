// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

/// Upper bound on the items granted to one `work` call
pub const DEFAULT_MAX_NOUTPUT_ITEMS: usize = 4096;
/// Items a buffer holds beyond its readers' history and alignment needs
pub const DEFAULT_BUFFER_MARGIN_ITEMS: usize = 4096;
/// Largest single channel buffer (256 MiB)
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 256 * 1024 * 1024;

/// Items the harness source emits before end-of-stream
pub const DEFAULT_ITEM_COUNT: u64 = 1_000_000;
/// One tag every this many items
pub const DEFAULT_TAG_INTERVAL: u64 = 101;
/// Items the source must advance before each reconfiguration step
pub const DEFAULT_TEST_ITEM_DIFF: u64 = 50_000;
pub const DEFAULT_SOURCE_ALIGNMENT: usize = 100;
/// History of the processing block
pub const DEFAULT_BASE_HISTORY: usize = 5000;
/// Delay applied by the processing block in the delay scenarios
pub const DEFAULT_DELAY: u64 = 2000;
pub const DEFAULT_COMPLETION_TIMEOUT_SECS: u64 = 60;
