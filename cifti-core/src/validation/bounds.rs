//! Payload size and offset arithmetic with overflow protection

use crate::FormatError;

/// Size of one payload element (float32)
pub const ELEMENT_SIZE: usize = core::mem::size_of::<f32>();

/// Number of elements in a `rows x cols` matrix
pub const fn checked_element_count(rows: usize, cols: usize) -> Result<usize, FormatError> {
    match rows.checked_mul(cols) {
        Some(count) => Ok(count),
        None => Err(FormatError::SizeOverflow),
    }
}

/// Byte length of a `rows x cols` float32 payload
pub const fn payload_byte_len(rows: usize, cols: usize) -> Result<u64, FormatError> {
    let count = match checked_element_count(rows, cols) {
        Ok(count) => count as u64,
        Err(e) => return Err(e),
    };
    match count.checked_mul(ELEMENT_SIZE as u64) {
        Some(len) => Ok(len),
        None => Err(FormatError::SizeOverflow),
    }
}

/// Absolute file offset of the first element of `row`
pub const fn row_byte_offset(vox_offset: u64, row: usize, cols: usize) -> Result<u64, FormatError> {
    let skip = match payload_byte_len(row, cols) {
        Ok(len) => len,
        Err(e) => return Err(e),
    };
    match vox_offset.checked_add(skip) {
        Some(offset) => Ok(offset),
        None => Err(FormatError::SizeOverflow),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_byte_len() {
        assert_eq!(payload_byte_len(3, 4), Ok(48));
        assert_eq!(payload_byte_len(0, 4), Ok(0));
        assert_eq!(
            payload_byte_len(usize::MAX, 2),
            Err(FormatError::SizeOverflow)
        );
    }

    #[test]
    fn test_row_byte_offset() {
        assert_eq!(row_byte_offset(560, 0, 4), Ok(560));
        assert_eq!(row_byte_offset(560, 2, 4), Ok(592));
        assert_eq!(
            row_byte_offset(u64::MAX, 1, 1),
            Err(FormatError::SizeOverflow)
        );
    }
}
