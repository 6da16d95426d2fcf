//! Validation utilities for the container format
//!
//! Pure functions on layout and size constraints with no I/O dependencies.

pub mod bounds;
pub mod format;

pub use bounds::{payload_byte_len, row_byte_offset, ELEMENT_SIZE};
pub use format::{align_to_boundary, calculate_padding};
