//! Error types for container format checks

/// Checks that can fail while decoding or encoding container structures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
    /// Buffer shorter than the structure being decoded or encoded
    InsufficientBuffer,
    /// `sizeof_hdr` is neither 348 nor 540 in either byte order
    UnrecognizedHeaderSize,
    /// Magic string does not match the detected header version
    InvalidMagic,
    /// `dim[0]` outside 1..=7, or a matrix dimension below 1
    InvalidDimensions,
    /// Header declares no matrix dimensions (`dim[0] < 5`)
    NoMatrixDimensions,
    /// Payload datatype is not 32-bit float
    UnsupportedDatatype,
    /// Value does not fit the field width of the target header version
    DimensionOverflow,
    /// `vox_offset` is negative or not integral
    InvalidVoxOffset,
    /// No extension follows the header (first extender byte is zero)
    MissingExtension,
    /// Extender bytes present but not exactly `{1,0,0,0}`
    InvalidExtender,
    /// Extension code is not the CIFTI code
    WrongExtensionCode,
    /// Declared extension size smaller than its own prefix
    InvalidExtensionSize,
    /// Element size not supported by the byte-order codec
    UnsupportedElementSize,
    /// Size or offset arithmetic would overflow
    SizeOverflow,
}

impl core::fmt::Display for FormatError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            FormatError::InsufficientBuffer => "buffer too small for structure",
            FormatError::UnrecognizedHeaderSize => "unrecognized header size field",
            FormatError::InvalidMagic => "invalid header magic",
            FormatError::InvalidDimensions => "invalid dimension array",
            FormatError::NoMatrixDimensions => "header declares no matrix dimensions",
            FormatError::UnsupportedDatatype => "payload datatype is not float32",
            FormatError::DimensionOverflow => "value does not fit target header field",
            FormatError::InvalidVoxOffset => "invalid vox_offset",
            FormatError::MissingExtension => "container requires a header extension",
            FormatError::InvalidExtender => "unrecognized extender bytes",
            FormatError::WrongExtensionCode => "extension code is not CIFTI",
            FormatError::InvalidExtensionSize => "invalid extension size",
            FormatError::UnsupportedElementSize => "unsupported element size for byte swap",
            FormatError::SizeOverflow => "size calculation would overflow",
        };
        write!(f, "{msg}")
    }
}

/// Result type for format operations
pub type Result<T> = core::result::Result<T, FormatError>;
