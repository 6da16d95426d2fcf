//! Error types for container operations
//!
//! Every failure names the offending file and, for I/O, the byte range
//! involved. Nothing is retried internally.

use cifti_core::FormatError;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for container operations
pub type Result<T> = std::result::Result<T, CiftiError>;

/// Broad failure class, for callers that branch on error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed header, extension or metadata
    Format,
    /// Open/seek/read/write failure
    Io,
    /// Operation not allowed in the current container state
    State,
    /// Caller passed an out-of-range index or a wrongly sized buffer
    Usage,
}

#[derive(Error, Debug)]
pub enum CiftiError {
    #[error("format error in {}: {check}", path.display())]
    Format { path: PathBuf, check: String },

    #[error("metadata error: {message}")]
    Metadata { message: String },

    #[error("I/O error on {} at offset {offset} (length {length}): {source}", path.display())]
    Io {
        path: PathBuf,
        offset: u64,
        length: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid state: {message}")]
    State { message: String },

    #[error("{axis} index {index} out of range (length {length})")]
    OutOfRange {
        axis: &'static str,
        index: usize,
        length: usize,
    },

    #[error("buffer length mismatch: expected {expected}, got {actual}")]
    BufferLength { expected: usize, actual: usize },
}

impl CiftiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CiftiError::Format { .. } | CiftiError::Metadata { .. } => ErrorKind::Format,
            CiftiError::Io { .. } => ErrorKind::Io,
            CiftiError::State { .. } => ErrorKind::State,
            CiftiError::OutOfRange { .. } | CiftiError::BufferLength { .. } => ErrorKind::Usage,
        }
    }

    /// Error code for logs and CLI exit reporting
    pub fn error_code(&self) -> &'static str {
        match self {
            CiftiError::Format { .. } => "FORMAT_ERROR",
            CiftiError::Metadata { .. } => "METADATA_ERROR",
            CiftiError::Io { .. } => "IO_ERROR",
            CiftiError::State { .. } => "STATE_ERROR",
            CiftiError::OutOfRange { .. } => "OUT_OF_RANGE",
            CiftiError::BufferLength { .. } => "BUFFER_LENGTH",
        }
    }

    pub(crate) fn format(path: &Path, check: impl Into<String>) -> Self {
        CiftiError::Format {
            path: path.to_path_buf(),
            check: check.into(),
        }
    }

    pub(crate) fn from_format(path: &Path, err: FormatError) -> Self {
        Self::format(path, err.to_string())
    }

    pub(crate) fn metadata(message: impl Into<String>) -> Self {
        CiftiError::Metadata {
            message: message.into(),
        }
    }

    pub(crate) fn io(path: &Path, offset: u64, length: u64, source: std::io::Error) -> Self {
        CiftiError::Io {
            path: path.to_path_buf(),
            offset,
            length,
            source,
        }
    }

    pub(crate) fn state(message: impl Into<String>) -> Self {
        CiftiError::State {
            message: message.into(),
        }
    }

    /// Attach a file to a metadata error so it reads as a format failure of that file
    pub(crate) fn in_file(self, path: &Path) -> Self {
        match self {
            CiftiError::Metadata { message } => Self::format(path, message),
            other => other,
        }
    }
}

pub(crate) fn check_index(axis: &'static str, index: usize, length: usize) -> Result<()> {
    if index >= length {
        return Err(CiftiError::OutOfRange {
            axis,
            index,
            length,
        });
    }
    Ok(())
}

pub(crate) fn check_len(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(CiftiError::BufferLength { expected, actual });
    }
    Ok(())
}
