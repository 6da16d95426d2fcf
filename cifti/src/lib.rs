//! CIFTI - connectivity-matrix container engine
//!
//! Reads, writes and randomly accesses large two-dimensional `f32` matrices
//! stored as a NIfTI-1 or NIfTI-2 header, a CIFTI XML extension, then the
//! row-major payload.
//!
//! ## Architecture
//!
//! - **cifti-core**: header and extension layouts, byte order, layout math
//!   and the [`MatrixStore`] trait (no I/O)
//! - **cifti**: metadata parsing, in-memory and on-disk stores, and the
//!   [`CiftiContainer`] that ties them together
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cifti::{CiftiContainer, ContainerConfig, MetadataExtension};
//!
//! fn example() -> cifti::Result<()> {
//!     let metadata = MetadataExtension::for_matrix(3, 4)?;
//!     let mut container = CiftiContainer::create(metadata, ContainerConfig::default())?;
//!     container.set_row(1, &[5.0, 6.0, 7.0, 8.0])?;
//!     container.write("matrix.dscalar.nii")?;
//!
//!     let opened = CiftiContainer::open_path("matrix.dscalar.nii", ContainerConfig::on_disk())?;
//!     let mut row = vec![0.0; opened.column_count()?];
//!     opened.get_row(1, &mut row)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **mmap**: load in-memory payloads through a read-only memory map
//! - **serde**: serializable configuration and header types
//! - **cli**: the `cifti-tool` binary

pub use cifti_core::{
    // Format definitions
    ByteOrder, NiftiHeader, NiftiVersion,
    // Store interface
    CacheMode, MatrixStore,
    // Format errors
    FormatError,
};

pub mod config;
pub mod container;
pub mod error;
pub mod metadata;
pub mod store;

pub use config::ContainerConfig;
pub use container::{reconcile_dims, store_shape, unreconcile_dims, CiftiContainer, ContainerState};
pub use error::{CiftiError, ErrorKind, Result};
pub use metadata::{AxisDecl, AxisKind, AxisMapping, MetadataExtension, MetadataRevision, SeriesUnit};
pub use store::{InMemoryStore, OnDiskStore, PersistentStore};
