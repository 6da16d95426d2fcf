//! Binary format definitions for NIfTI-wrapped CIFTI containers
//!
//! Pure data structure definitions for the wire format. No I/O.

pub mod constants;
pub mod extension;
pub mod header;

pub use extension::{trim_blob, ExtensionLayout, ExtensionPrefix};
pub use header::{detect_version, NiftiHeader, NiftiVersion};
