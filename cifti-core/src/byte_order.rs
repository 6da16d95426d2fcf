//! Host byte order detection and in-place swapping
//!
//! Header fields are decoded with explicit-order accessors; bulk payloads and
//! length tables are swapped in place with [`swap_in_place`].

use crate::{FormatError, Result};

/// Byte order of a container or of the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ByteOrder {
    Little,
    Big,
}

/// Whether the host stores multi-byte values most significant byte first
pub const fn host_is_big_endian() -> bool {
    cfg!(target_endian = "big")
}

macro_rules! order_accessors {
    ($(($read:ident, $write:ident, $ty:ty, $n:literal)),* $(,)?) => {
        $(
            #[doc = concat!("Read a `", stringify!($ty), "` at `at` in this byte order")]
            pub fn $read(self, bytes: &[u8], at: usize) -> $ty {
                let mut raw = [0u8; $n];
                raw.copy_from_slice(&bytes[at..at + $n]);
                match self {
                    ByteOrder::Little => <$ty>::from_le_bytes(raw),
                    ByteOrder::Big => <$ty>::from_be_bytes(raw),
                }
            }

            #[doc = concat!("Write a `", stringify!($ty), "` at `at` in this byte order")]
            pub fn $write(self, bytes: &mut [u8], at: usize, value: $ty) {
                let raw = match self {
                    ByteOrder::Little => value.to_le_bytes(),
                    ByteOrder::Big => value.to_be_bytes(),
                };
                bytes[at..at + $n].copy_from_slice(&raw);
            }
        )*
    };
}

impl ByteOrder {
    /// Byte order of the running host
    pub const fn host() -> Self {
        if host_is_big_endian() {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }

    /// The other byte order
    pub const fn opposite(self) -> Self {
        match self {
            ByteOrder::Little => ByteOrder::Big,
            ByteOrder::Big => ByteOrder::Little,
        }
    }

    /// Whether data in this order must be swapped to be read natively
    pub fn needs_swap(self) -> bool {
        self != Self::host()
    }

    order_accessors!(
        (read_i16, write_i16, i16, 2),
        (read_i32, write_i32, i32, 4),
        (read_u32, write_u32, u32, 4),
        (read_i64, write_i64, i64, 8),
        (read_f32, write_f32, f32, 4),
        (read_f64, write_f64, f64, 8),
    );
}

impl core::fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ByteOrder::Little => write!(f, "little-endian"),
            ByteOrder::Big => write!(f, "big-endian"),
        }
    }
}

/// Reverse the byte order of the first `element_count` elements of `buffer`
///
/// Supports 2-, 4- and 8-byte elements; single bytes are left untouched.
pub fn swap_in_place(buffer: &mut [u8], element_count: usize, element_size: usize) -> Result<()> {
    match element_size {
        1 => return Ok(()),
        2 | 4 | 8 => {}
        _ => return Err(FormatError::UnsupportedElementSize),
    }

    let byte_len = element_count
        .checked_mul(element_size)
        .ok_or(FormatError::SizeOverflow)?;
    if byte_len > buffer.len() {
        return Err(FormatError::InsufficientBuffer);
    }

    for element in buffer[..byte_len].chunks_exact_mut(element_size) {
        element.reverse();
    }
    Ok(())
}

/// Swap every element of a typed slice
pub fn swap_elements<T: bytemuck::Pod>(values: &mut [T]) -> Result<()> {
    let count = values.len();
    swap_in_place(
        bytemuck::cast_slice_mut(values),
        count,
        core::mem::size_of::<T>(),
    )
}
