//! Header extension framing
//!
//! Layout following the fixed header:
//! `extender[4] | esize: u32 | ecode: i32 | blob[esize - 8]`, where `esize`
//! counts its own 8-byte prefix and any trailing padding.

use super::constants::{extension, ALIGNMENT_BOUNDARY};
use crate::validation::format::calculate_padding;
use crate::{ByteOrder, FormatError, Result};

/// Decoded extender + extension prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExtensionPrefix {
    /// Total extension size including the 8-byte prefix
    pub esize: u32,
    pub ecode: i32,
}

impl ExtensionPrefix {
    /// Bytes from end of header to start of the blob
    pub const SIZE: usize = extension::EXTENDER_SIZE + extension::PREFIX_SIZE;

    /// Parse the 12 bytes after the fixed header
    ///
    /// Requires exactly one CIFTI extension to be announced.
    pub fn from_bytes(bytes: &[u8], order: ByteOrder) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(FormatError::InsufficientBuffer);
        }
        if bytes[0] == 0 {
            return Err(FormatError::MissingExtension);
        }
        if bytes[..4] != extension::EXTENDER {
            return Err(FormatError::InvalidExtender);
        }

        let esize = order.read_u32(bytes, 4);
        let ecode = order.read_i32(bytes, 8);
        if ecode != extension::ECODE_CIFTI {
            return Err(FormatError::WrongExtensionCode);
        }
        if (esize as usize) < extension::PREFIX_SIZE {
            return Err(FormatError::InvalidExtensionSize);
        }
        Ok(Self { esize, ecode })
    }

    /// Length of the blob region (metadata plus padding)
    pub const fn blob_len(&self) -> usize {
        self.esize as usize - extension::PREFIX_SIZE
    }

    /// Encode extender and prefix
    pub fn to_bytes(&self, order: ByteOrder) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[..4].copy_from_slice(&extension::EXTENDER);
        order.write_u32(&mut out, 4, self.esize);
        order.write_i32(&mut out, 8, self.ecode);
        out
    }
}

/// Placement of the extension and payload for a given metadata length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtensionLayout {
    pub prefix: ExtensionPrefix,
    /// Zero bytes appended after the metadata
    pub padding: usize,
    /// Payload start, aligned to [`ALIGNMENT_BOUNDARY`]
    pub vox_offset: u64,
}

impl ExtensionLayout {
    /// Compute where a CIFTI extension of `metadata_len` bytes puts the payload
    pub fn for_metadata(header_size: usize, metadata_len: usize) -> Result<Self> {
        let unpadded = header_size
            .checked_add(ExtensionPrefix::SIZE)
            .and_then(|n| n.checked_add(metadata_len))
            .ok_or(FormatError::SizeOverflow)?;
        if unpadded > usize::MAX - ALIGNMENT_BOUNDARY {
            return Err(FormatError::SizeOverflow);
        }
        let padding = calculate_padding(unpadded, ALIGNMENT_BOUNDARY);
        let vox_offset = unpadded + padding;

        let esize = u32::try_from(extension::PREFIX_SIZE + metadata_len + padding)
            .map_err(|_| FormatError::SizeOverflow)?;

        Ok(Self {
            prefix: ExtensionPrefix {
                esize,
                ecode: extension::ECODE_CIFTI,
            },
            padding,
            vox_offset: vox_offset as u64,
        })
    }
}

/// Strip trailing NUL padding from an extension blob
pub fn trim_blob(blob: &[u8]) -> &[u8] {
    let end = blob.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &blob[..end]
}
