#![no_std]

//! CIFTI Core - container format definitions
//!
//! Byte-level layout of NIfTI-1/NIfTI-2 headers carrying a CIFTI metadata
//! extension, plus the matrix store interface. No I/O lives here.

#[cfg(feature = "alloc")]
extern crate alloc;

pub mod byte_order;
pub mod error;
pub mod format;
pub mod traits;
pub mod validation;

pub use byte_order::{host_is_big_endian, swap_elements, swap_in_place, ByteOrder};
pub use error::*;
pub use format::*;
pub use traits::*;
