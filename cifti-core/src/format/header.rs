//! Fixed NIfTI-1 / NIfTI-2 header definitions
//!
//! Both on-disk layouts decode into one [`NiftiHeader`] with 64-bit fields.
//! The `sizeof_hdr` field doubles as version and byte-order marker: it reads
//! as 348 (NIfTI-1) or 540 (NIfTI-2) only in the order the file was written.

use super::constants::{
    intent, nifti1, nifti2, FLOAT32_BITPIX, MATRIX_DIM_START, MAX_MATRIX_DIMS, NIFTI_TYPE_FLOAT32,
};
use crate::{ByteOrder, FormatError, Result};

#[cfg(feature = "alloc")]
use alloc::vec::Vec;

/// On-disk header layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NiftiVersion {
    /// 348-byte header, 16-bit dimensions, f32 vox_offset
    Nifti1,
    /// 540-byte header, 64-bit dimensions
    #[default]
    Nifti2,
}

impl NiftiVersion {
    /// Size of the fixed header in bytes
    pub const fn header_size(self) -> usize {
        match self {
            NiftiVersion::Nifti1 => nifti1::HEADER_SIZE,
            NiftiVersion::Nifti2 => nifti2::HEADER_SIZE,
        }
    }

    /// Version announced by a `sizeof_hdr` value
    pub const fn from_header_size(size: i32) -> Option<Self> {
        match size {
            348 => Some(NiftiVersion::Nifti1),
            540 => Some(NiftiVersion::Nifti2),
            _ => None,
        }
    }

    pub const fn number(self) -> u8 {
        match self {
            NiftiVersion::Nifti1 => 1,
            NiftiVersion::Nifti2 => 2,
        }
    }
}

/// Detect header version and file byte order from the leading `sizeof_hdr`
pub fn detect_version(bytes: &[u8]) -> Result<(NiftiVersion, ByteOrder)> {
    if bytes.len() < 4 {
        return Err(FormatError::InsufficientBuffer);
    }
    for order in [ByteOrder::Little, ByteOrder::Big] {
        if let Some(version) = NiftiVersion::from_header_size(order.read_i32(bytes, 0)) {
            return Ok((version, order));
        }
    }
    Err(FormatError::UnrecognizedHeaderSize)
}

/// Decoded fixed header
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NiftiHeader {
    /// Layout the header was read from (or will be written as by default)
    pub version: NiftiVersion,
    /// Byte order of the file the header was read from
    pub byte_order: ByteOrder,
    pub dim_info: u8,
    /// `dim[0]` is the dimension count; matrix dims live in `dim[5..]`
    pub dim: [i64; 8],
    pub intent_params: [f64; 3],
    pub intent_code: i32,
    pub datatype: i16,
    pub bitpix: i16,
    pub pixdim: [f64; 8],
    /// Byte offset of the matrix payload
    pub vox_offset: i64,
    pub scl_slope: f64,
    pub scl_inter: f64,
    pub xyzt_units: u8,
    /// NUL-padded intent name
    pub intent_name: [u8; 16],
}

impl Default for NiftiHeader {
    fn default() -> Self {
        Self::new()
    }
}

impl NiftiHeader {
    /// Header for an empty float32 matrix in host byte order
    pub const fn new() -> Self {
        Self {
            version: NiftiVersion::Nifti2,
            byte_order: ByteOrder::host(),
            dim_info: 0,
            dim: [0, 1, 1, 1, 1, 1, 1, 1],
            intent_params: [0.0; 3],
            intent_code: intent::CONN_UNKNOWN,
            datatype: NIFTI_TYPE_FLOAT32,
            bitpix: FLOAT32_BITPIX,
            pixdim: [1.0; 8],
            vox_offset: 0,
            scl_slope: 1.0,
            scl_inter: 0.0,
            xyzt_units: 0,
            intent_name: [0; 16],
        }
    }

    /// Parse a header, detecting version and byte order
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (version, order) = detect_version(bytes)?;
        if bytes.len() < version.header_size() {
            return Err(FormatError::InsufficientBuffer);
        }

        let header = match version {
            NiftiVersion::Nifti1 => Self::parse_nifti1(bytes, order)?,
            NiftiVersion::Nifti2 => Self::parse_nifti2(bytes, order)?,
        };

        let rank = header.dim[0];
        if !(1..=7).contains(&rank) {
            return Err(FormatError::InvalidDimensions);
        }
        if header.vox_offset < 0 {
            return Err(FormatError::InvalidVoxOffset);
        }
        Ok(header)
    }

    fn parse_nifti1(bytes: &[u8], order: ByteOrder) -> Result<Self> {
        if bytes[nifti1::MAGIC_OFFSET..nifti1::MAGIC_OFFSET + 4] != nifti1::MAGIC {
            return Err(FormatError::InvalidMagic);
        }

        let mut dim = [0i64; 8];
        for (i, d) in dim.iter_mut().enumerate() {
            *d = i64::from(order.read_i16(bytes, nifti1::DIM + 2 * i));
        }
        let mut pixdim = [0f64; 8];
        for (i, p) in pixdim.iter_mut().enumerate() {
            *p = f64::from(order.read_f32(bytes, nifti1::PIXDIM + 4 * i));
        }
        let mut intent_params = [0f64; 3];
        for (i, p) in intent_params.iter_mut().enumerate() {
            *p = f64::from(order.read_f32(bytes, nifti1::INTENT_P1 + 4 * i));
        }

        // vox_offset is a float in this layout
        let raw_offset = order.read_f32(bytes, nifti1::VOX_OFFSET);
        if !raw_offset.is_finite() || raw_offset < 0.0 || raw_offset.fract() != 0.0 {
            return Err(FormatError::InvalidVoxOffset);
        }

        let mut intent_name = [0u8; 16];
        intent_name.copy_from_slice(&bytes[nifti1::INTENT_NAME..nifti1::INTENT_NAME + 16]);

        Ok(Self {
            version: NiftiVersion::Nifti1,
            byte_order: order,
            dim_info: bytes[nifti1::DIM_INFO],
            dim,
            intent_params,
            intent_code: i32::from(order.read_i16(bytes, nifti1::INTENT_CODE)),
            datatype: order.read_i16(bytes, nifti1::DATATYPE),
            bitpix: order.read_i16(bytes, nifti1::BITPIX),
            pixdim,
            vox_offset: raw_offset as i64,
            scl_slope: f64::from(order.read_f32(bytes, nifti1::SCL_SLOPE)),
            scl_inter: f64::from(order.read_f32(bytes, nifti1::SCL_INTER)),
            xyzt_units: bytes[nifti1::XYZT_UNITS],
            intent_name,
        })
    }

    fn parse_nifti2(bytes: &[u8], order: ByteOrder) -> Result<Self> {
        if bytes[nifti2::MAGIC_OFFSET..nifti2::MAGIC_OFFSET + 8] != nifti2::MAGIC {
            return Err(FormatError::InvalidMagic);
        }

        let mut dim = [0i64; 8];
        for (i, d) in dim.iter_mut().enumerate() {
            *d = order.read_i64(bytes, nifti2::DIM + 8 * i);
        }
        let mut pixdim = [0f64; 8];
        for (i, p) in pixdim.iter_mut().enumerate() {
            *p = order.read_f64(bytes, nifti2::PIXDIM + 8 * i);
        }
        let mut intent_params = [0f64; 3];
        for (i, p) in intent_params.iter_mut().enumerate() {
            *p = order.read_f64(bytes, nifti2::INTENT_P1 + 8 * i);
        }

        let mut intent_name = [0u8; 16];
        intent_name.copy_from_slice(&bytes[nifti2::INTENT_NAME..nifti2::INTENT_NAME + 16]);

        Ok(Self {
            version: NiftiVersion::Nifti2,
            byte_order: order,
            dim_info: bytes[nifti2::DIM_INFO],
            dim,
            intent_params,
            intent_code: order.read_i32(bytes, nifti2::INTENT_CODE),
            datatype: order.read_i16(bytes, nifti2::DATATYPE),
            bitpix: order.read_i16(bytes, nifti2::BITPIX),
            pixdim,
            vox_offset: order.read_i64(bytes, nifti2::VOX_OFFSET),
            scl_slope: order.read_f64(bytes, nifti2::SCL_SLOPE),
            scl_inter: order.read_f64(bytes, nifti2::SCL_INTER),
            xyzt_units: order.read_i32(bytes, nifti2::XYZT_UNITS) as u8,
            intent_name,
        })
    }

    /// Whether the header was read from a file in non-host byte order
    pub fn needs_byte_swap(&self) -> bool {
        self.byte_order.needs_swap()
    }

    /// Matrix dimensions as stored (`dim[5..=dim[0]]`), empty if none
    pub fn matrix_dims(&self) -> &[i64] {
        let rank = self.dim[0];
        if rank < MATRIX_DIM_START as i64 || rank > 7 {
            return &[];
        }
        &self.dim[MATRIX_DIM_START..=rank as usize]
    }

    /// Store matrix dimensions, marking dims 1..=4 as singleton
    pub fn set_matrix_dims(&mut self, dims: &[i64]) -> Result<()> {
        if dims.is_empty() || dims.len() > MAX_MATRIX_DIMS {
            return Err(FormatError::InvalidDimensions);
        }
        if dims.iter().any(|&d| d < 1) {
            return Err(FormatError::InvalidDimensions);
        }

        self.dim = [0, 1, 1, 1, 1, 1, 1, 1];
        self.dim[0] = (MATRIX_DIM_START - 1 + dims.len()) as i64;
        self.dim[MATRIX_DIM_START..MATRIX_DIM_START + dims.len()].copy_from_slice(dims);
        Ok(())
    }

    /// Check the header describes a float32 matrix payload
    pub fn validate_matrix_payload(&self) -> Result<()> {
        if self.datatype != NIFTI_TYPE_FLOAT32 || self.bitpix != FLOAT32_BITPIX {
            return Err(FormatError::UnsupportedDatatype);
        }
        let dims = self.matrix_dims();
        if dims.is_empty() {
            return Err(FormatError::NoMatrixDimensions);
        }
        if dims.iter().any(|&d| d < 1) {
            return Err(FormatError::InvalidDimensions);
        }
        Ok(())
    }

    /// Intent name up to the first NUL, empty if not valid UTF-8
    pub fn intent_name_str(&self) -> &str {
        let end = self
            .intent_name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.intent_name.len());
        core::str::from_utf8(&self.intent_name[..end]).unwrap_or("")
    }

    /// Set intent code and name; the name is truncated to 15 bytes
    pub fn set_intent(&mut self, code: i32, name: &str) {
        self.intent_code = code;
        self.intent_name = [0; 16];
        let len = name.len().min(15);
        self.intent_name[..len].copy_from_slice(&name.as_bytes()[..len]);
    }

    /// Encode into `out` using the given layout and byte order
    ///
    /// Returns the number of bytes written (the header size).
    pub fn write_to(&self, version: NiftiVersion, order: ByteOrder, out: &mut [u8]) -> Result<usize> {
        let size = version.header_size();
        if out.len() < size {
            return Err(FormatError::InsufficientBuffer);
        }
        let out = &mut out[..size];
        out.fill(0);

        match version {
            NiftiVersion::Nifti1 => self.encode_nifti1(order, out)?,
            NiftiVersion::Nifti2 => self.encode_nifti2(order, out),
        }
        Ok(size)
    }

    fn encode_nifti1(&self, order: ByteOrder, out: &mut [u8]) -> Result<()> {
        let narrow = |v: i64| i16::try_from(v).map_err(|_| FormatError::DimensionOverflow);

        let mut dim = [0i16; 8];
        for (d, &v) in dim.iter_mut().zip(self.dim.iter()) {
            *d = narrow(v)?;
        }
        let intent_code = i16::try_from(self.intent_code).map_err(|_| FormatError::DimensionOverflow)?;
        if self.vox_offset < 0 {
            return Err(FormatError::InvalidVoxOffset);
        }
        if self.vox_offset > nifti1::MAX_EXACT_VOX_OFFSET {
            return Err(FormatError::DimensionOverflow);
        }

        order.write_i32(out, nifti1::SIZEOF_HDR, nifti1::HEADER_SIZE as i32);
        out[nifti1::REGULAR] = b'r';
        out[nifti1::DIM_INFO] = self.dim_info;
        for (i, &d) in dim.iter().enumerate() {
            order.write_i16(out, nifti1::DIM + 2 * i, d);
        }
        for (i, &p) in self.intent_params.iter().enumerate() {
            order.write_f32(out, nifti1::INTENT_P1 + 4 * i, p as f32);
        }
        order.write_i16(out, nifti1::INTENT_CODE, intent_code);
        order.write_i16(out, nifti1::DATATYPE, self.datatype);
        order.write_i16(out, nifti1::BITPIX, self.bitpix);
        for (i, &p) in self.pixdim.iter().enumerate() {
            order.write_f32(out, nifti1::PIXDIM + 4 * i, p as f32);
        }
        order.write_f32(out, nifti1::VOX_OFFSET, self.vox_offset as f32);
        order.write_f32(out, nifti1::SCL_SLOPE, self.scl_slope as f32);
        order.write_f32(out, nifti1::SCL_INTER, self.scl_inter as f32);
        out[nifti1::XYZT_UNITS] = self.xyzt_units;
        out[nifti1::INTENT_NAME..nifti1::INTENT_NAME + 16].copy_from_slice(&self.intent_name);
        out[nifti1::MAGIC_OFFSET..nifti1::MAGIC_OFFSET + 4].copy_from_slice(&nifti1::MAGIC);
        Ok(())
    }

    fn encode_nifti2(&self, order: ByteOrder, out: &mut [u8]) {
        order.write_i32(out, nifti2::SIZEOF_HDR, nifti2::HEADER_SIZE as i32);
        out[nifti2::MAGIC_OFFSET..nifti2::MAGIC_OFFSET + 8].copy_from_slice(&nifti2::MAGIC);
        order.write_i16(out, nifti2::DATATYPE, self.datatype);
        order.write_i16(out, nifti2::BITPIX, self.bitpix);
        for (i, &d) in self.dim.iter().enumerate() {
            order.write_i64(out, nifti2::DIM + 8 * i, d);
        }
        for (i, &p) in self.intent_params.iter().enumerate() {
            order.write_f64(out, nifti2::INTENT_P1 + 8 * i, p);
        }
        for (i, &p) in self.pixdim.iter().enumerate() {
            order.write_f64(out, nifti2::PIXDIM + 8 * i, p);
        }
        order.write_i64(out, nifti2::VOX_OFFSET, self.vox_offset);
        order.write_f64(out, nifti2::SCL_SLOPE, self.scl_slope);
        order.write_f64(out, nifti2::SCL_INTER, self.scl_inter);
        order.write_i32(out, nifti2::XYZT_UNITS, i32::from(self.xyzt_units));
        order.write_i32(out, nifti2::INTENT_CODE, self.intent_code);
        out[nifti2::INTENT_NAME..nifti2::INTENT_NAME + 16].copy_from_slice(&self.intent_name);
        out[nifti2::DIM_INFO] = self.dim_info;
    }

    /// Encode into a freshly allocated buffer
    #[cfg(feature = "alloc")]
    pub fn to_bytes(&self, version: NiftiVersion, order: ByteOrder) -> Result<Vec<u8>> {
        let mut bytes = alloc::vec![0u8; version.header_size()];
        self.write_to(version, order, &mut bytes)?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NiftiHeader {
        let mut header = NiftiHeader::new();
        header.set_matrix_dims(&[4, 3]).unwrap();
        header.vox_offset = 560;
        header.set_intent(intent::CONN_DENSE_SCALAR, "ConnDenseScalar");
        header
    }

    #[test]
    fn test_nifti2_round_trip_both_orders() {
        for order in [ByteOrder::Little, ByteOrder::Big] {
            let mut buf = [0u8; 540];
            let written = sample().write_to(NiftiVersion::Nifti2, order, &mut buf).unwrap();
            assert_eq!(written, 540);

            let parsed = NiftiHeader::from_bytes(&buf).unwrap();
            assert_eq!(parsed.version, NiftiVersion::Nifti2);
            assert_eq!(parsed.byte_order, order);
            assert_eq!(parsed.matrix_dims(), &[4, 3]);
            assert_eq!(parsed.vox_offset, 560);
            assert_eq!(parsed.intent_code, intent::CONN_DENSE_SCALAR);
            assert_eq!(parsed.intent_name_str(), "ConnDenseScalar");
        }
    }

    #[test]
    fn test_nifti1_round_trip() {
        let mut buf = [0u8; 348];
        sample()
            .write_to(NiftiVersion::Nifti1, ByteOrder::Big, &mut buf)
            .unwrap();
        assert_eq!(&buf[344..348], b"n+1\0");

        let parsed = NiftiHeader::from_bytes(&buf).unwrap();
        assert_eq!(parsed.version, NiftiVersion::Nifti1);
        assert_eq!(parsed.byte_order, ByteOrder::Big);
        assert_eq!(parsed.dim[0], 6);
        assert_eq!(parsed.matrix_dims(), &[4, 3]);
        assert_eq!(parsed.vox_offset, 560);
        assert!(parsed.validate_matrix_payload().is_ok());
    }

    #[test]
    fn test_nifti1_rejects_wide_dimension() {
        let mut header = NiftiHeader::new();
        header.set_matrix_dims(&[40_000, 2]).unwrap();
        let mut buf = [0u8; 348];
        assert_eq!(
            header.write_to(NiftiVersion::Nifti1, ByteOrder::Little, &mut buf),
            Err(FormatError::DimensionOverflow)
        );
    }

    #[test]
    fn test_unrecognized_header_size() {
        let mut buf = [0u8; 540];
        buf[0] = 0x7f;
        assert_eq!(
            NiftiHeader::from_bytes(&buf),
            Err(FormatError::UnrecognizedHeaderSize)
        );
        assert_eq!(
            NiftiHeader::from_bytes(&buf[..2]),
            Err(FormatError::InsufficientBuffer)
        );
    }

    #[test]
    fn test_bad_magic() {
        let mut buf = [0u8; 540];
        sample()
            .write_to(NiftiVersion::Nifti2, ByteOrder::Little, &mut buf)
            .unwrap();
        buf[5] = b'x';
        assert_eq!(NiftiHeader::from_bytes(&buf), Err(FormatError::InvalidMagic));
    }

    #[test]
    fn test_truncated_header() {
        let mut buf = [0u8; 540];
        sample()
            .write_to(NiftiVersion::Nifti2, ByteOrder::Little, &mut buf)
            .unwrap();
        assert_eq!(
            NiftiHeader::from_bytes(&buf[..400]),
            Err(FormatError::InsufficientBuffer)
        );
    }

    #[test]
    fn test_matrix_payload_checks() {
        let mut header = sample();
        header.datatype = 64;
        assert_eq!(
            header.validate_matrix_payload(),
            Err(FormatError::UnsupportedDatatype)
        );

        let plain = NiftiHeader::new();
        assert!(plain.matrix_dims().is_empty());
        assert_eq!(
            plain.validate_matrix_payload(),
            Err(FormatError::NoMatrixDimensions)
        );
    }

    #[test]
    fn test_set_matrix_dims_bounds() {
        let mut header = NiftiHeader::new();
        assert_eq!(header.set_matrix_dims(&[]), Err(FormatError::InvalidDimensions));
        assert_eq!(
            header.set_matrix_dims(&[1, 2, 3, 4]),
            Err(FormatError::InvalidDimensions)
        );
        assert_eq!(header.set_matrix_dims(&[0]), Err(FormatError::InvalidDimensions));
        header.set_matrix_dims(&[7]).unwrap();
        assert_eq!(header.dim, [5, 1, 1, 1, 1, 7, 1, 1]);
    }

    #[test]
    fn test_intent_name_truncates() {
        let mut header = NiftiHeader::new();
        header.set_intent(intent::CONN_UNKNOWN, "AVeryLongIntentNameIndeed");
        assert_eq!(header.intent_name_str().len(), 15);
        assert_eq!(header.intent_name[15], 0);
    }
}
