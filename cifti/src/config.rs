//! Container configuration

use crate::metadata::MetadataRevision;
use cifti_core::{ByteOrder, CacheMode, NiftiVersion};
use std::path::{Path, PathBuf};

/// Options controlling how a container is opened and written
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ContainerConfig {
    /// Backing mode for the matrix payload
    pub cache_mode: CacheMode,
    /// On-disk mode only: stage a copy of the container here and bind to it
    pub cache_file: Option<PathBuf>,
    /// Metadata revision emitted on write
    pub writing_revision: MetadataRevision,
    /// Header layout emitted on write
    pub header_version: NiftiVersion,
    /// Byte order emitted on write; `None` keeps the source file's order
    pub byte_order: Option<ByteOrder>,
}

impl ContainerConfig {
    /// Config with the given cache mode and defaults otherwise
    pub fn with_cache_mode(cache_mode: CacheMode) -> Self {
        Self {
            cache_mode,
            ..Self::default()
        }
    }

    pub fn on_disk() -> Self {
        Self::with_cache_mode(CacheMode::OnDisk)
    }

    /// Stage on-disk access through a copy at `path`
    pub fn with_cache_file(mut self, path: impl AsRef<Path>) -> Self {
        self.cache_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_writing_revision(mut self, revision: MetadataRevision) -> Self {
        self.writing_revision = revision;
        self
    }

    pub fn with_header_version(mut self, version: NiftiVersion) -> Self {
        self.header_version = version;
        self
    }

    /// Force the byte order of written files
    pub fn with_byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = Some(order);
        self
    }
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            cache_mode: CacheMode::InMemory,
            cache_file: None,
            writing_revision: MetadataRevision::Cifti2,
            header_version: NiftiVersion::Nifti2,
            byte_order: None,
        }
    }
}
