//! Format constants and magic bytes for NIfTI-1/NIfTI-2 CIFTI containers

/// Alignment boundary for the start of the matrix payload
pub const ALIGNMENT_BOUNDARY: usize = 16;

/// NIfTI datatype code for 32-bit IEEE float
pub const NIFTI_TYPE_FLOAT32: i16 = 16;

/// Bits per element for [`NIFTI_TYPE_FLOAT32`]
pub const FLOAT32_BITPIX: i16 = 32;

/// Index into `dim` of the first matrix dimension (dims 1..=4 are spatial/time)
pub const MATRIX_DIM_START: usize = 5;

/// Most matrix dimensions a `dim` array can hold (`dim[5..=7]`)
pub const MAX_MATRIX_DIMS: usize = 3;

/// NIfTI-1 header layout
pub mod nifti1 {
    pub const HEADER_SIZE: usize = 348;
    pub const MAGIC: [u8; 4] = *b"n+1\0";

    pub const SIZEOF_HDR: usize = 0;
    pub const REGULAR: usize = 38;
    pub const DIM_INFO: usize = 39;
    pub const DIM: usize = 40;
    pub const INTENT_P1: usize = 56;
    pub const INTENT_CODE: usize = 68;
    pub const DATATYPE: usize = 70;
    pub const BITPIX: usize = 72;
    pub const PIXDIM: usize = 76;
    pub const VOX_OFFSET: usize = 108;
    pub const SCL_SLOPE: usize = 112;
    pub const SCL_INTER: usize = 116;
    pub const XYZT_UNITS: usize = 123;
    pub const INTENT_NAME: usize = 328;
    pub const MAGIC_OFFSET: usize = 344;

    /// `vox_offset` is stored as f32; larger offsets lose integer precision
    pub const MAX_EXACT_VOX_OFFSET: i64 = 1 << 24;
}

/// NIfTI-2 header layout
pub mod nifti2 {
    pub const HEADER_SIZE: usize = 540;
    pub const MAGIC: [u8; 8] = *b"n+2\0\r\n\x1a\n";

    pub const SIZEOF_HDR: usize = 0;
    pub const MAGIC_OFFSET: usize = 4;
    pub const DATATYPE: usize = 12;
    pub const BITPIX: usize = 14;
    pub const DIM: usize = 16;
    pub const INTENT_P1: usize = 80;
    pub const PIXDIM: usize = 104;
    pub const VOX_OFFSET: usize = 168;
    pub const SCL_SLOPE: usize = 176;
    pub const SCL_INTER: usize = 184;
    pub const XYZT_UNITS: usize = 500;
    pub const INTENT_CODE: usize = 504;
    pub const INTENT_NAME: usize = 508;
    pub const DIM_INFO: usize = 524;
}

/// Header extension constants
pub mod extension {
    /// Extender bytes announcing that an extension follows the header
    pub const EXTENDER: [u8; 4] = [1, 0, 0, 0];

    /// Size of the extender block
    pub const EXTENDER_SIZE: usize = 4;

    /// Size of the `esize` + `ecode` prefix counted inside `esize`
    pub const PREFIX_SIZE: usize = 8;

    /// Extension code for CIFTI metadata
    pub const ECODE_CIFTI: i32 = 32;
}

/// Intent codes and names identifying the matrix kind
pub mod intent {
    pub const CONN_UNKNOWN: i32 = 3000;
    pub const CONN_DENSE: i32 = 3001;
    pub const CONN_DENSE_SERIES: i32 = 3002;
    pub const CONN_PARCELS: i32 = 3003;
    pub const CONN_PARCEL_SERIES: i32 = 3004;
    pub const CONN_DENSE_SCALAR: i32 = 3006;
    pub const CONN_DENSE_LABEL: i32 = 3007;
    pub const CONN_PARCEL_SCALAR: i32 = 3008;
    pub const CONN_PARCEL_DENSE: i32 = 3009;
    pub const CONN_DENSE_PARCEL: i32 = 3010;

    /// Name stored in `intent_name` for a given code
    pub const fn name(code: i32) -> &'static str {
        match code {
            CONN_DENSE => "ConnDense",
            CONN_DENSE_SERIES => "ConnDenseSeries",
            CONN_PARCELS => "ConnParcels",
            CONN_PARCEL_SERIES => "ConnParcelSries",
            CONN_DENSE_SCALAR => "ConnDenseScalar",
            CONN_DENSE_LABEL => "ConnDenseLabel",
            CONN_PARCEL_SCALAR => "ConnParcelScalr",
            CONN_PARCEL_DENSE => "ConnParcelDense",
            CONN_DENSE_PARCEL => "ConnDenseParcel",
            _ => "ConnUnknown",
        }
    }
}
