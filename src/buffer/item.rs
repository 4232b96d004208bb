// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Typed access to fixed-size items stored as raw bytes.
//!
//! Channel buffers only know about item *sizes*; blocks pick the item type
//! they read and write through this trait. Items are stored little-endian.

/// A fixed-size value that can live in a channel buffer.
pub trait Item: Copy + Send + 'static {
    /// Bytes per item
    const SIZE: usize;

    /// Decode from the first `SIZE` bytes of `bytes`.
    fn read_from(bytes: &[u8]) -> Self;

    /// Encode into the first `SIZE` bytes of `bytes`.
    fn write_to(self, bytes: &mut [u8]);
}

macro_rules! impl_item {
    ($($t:ty),* $(,)?) => {
        $(
            impl Item for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                fn read_from(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$t>()];
                    raw.copy_from_slice(&bytes[..Self::SIZE]);
                    <$t>::from_le_bytes(raw)
                }

                fn write_to(self, bytes: &mut [u8]) {
                    bytes[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_item!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);
