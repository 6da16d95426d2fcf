//! Matrix payload backends
//!
//! Two stores implement [`MatrixStore`]: [`InMemoryStore`] keeps the whole
//! payload resident, [`OnDiskStore`] reads and writes rows against the file.
//! [`PersistentStore`] adds what the container needs to save them.

pub(crate) mod file_io;
pub mod in_memory;
pub mod on_disk;

pub use in_memory::InMemoryStore;
pub use on_disk::OnDiskStore;

use crate::error::{CiftiError, Result};
use cifti_core::{ByteOrder, MatrixStore};
use std::path::Path;

/// Store operations tied to container files
pub trait PersistentStore: MatrixStore<Error = CiftiError> + Send + Sync + std::fmt::Debug {
    /// Write the payload into `path` at `vox_offset`, encoded in `order`,
    /// and cut the file off right after it. Bytes before `vox_offset` are kept.
    fn write_to_new_file(&self, path: &Path, vox_offset: u64, order: ByteOrder) -> Result<()>;

    /// File the payload lives in, if any
    fn backing_file(&self) -> Option<&Path>;

    /// Byte order of the payload in the backing file
    fn file_byte_order(&self) -> Option<ByteOrder>;

    /// Payload offset in the backing file
    fn vox_offset(&self) -> Option<u64>;

    /// Overwrite the header and extension region of the backing file
    fn rewrite_prefix(&self, prefix: &[u8]) -> Result<()>;

    /// Push written rows to stable storage
    fn flush(&self) -> Result<()>;

    /// Rows written since the last flush
    fn dirty_row_count(&self) -> Result<usize>;

    fn is_writable(&self) -> bool;
}
