//! Positioned file I/O shared by the stores and the container

use crate::error::{CiftiError, Result};
use cifti_core::{swap_elements, swap_in_place, ByteOrder};
use rayon::prelude::*;
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Bulk copies move at most this many bytes per read/write
pub(crate) const COPY_CHUNK_BYTES: usize = 1024 * 1024;

/// Payloads at least this large are swapped on the rayon pool
const PARALLEL_SWAP_BYTES: usize = 4 * COPY_CHUNK_BYTES;

/// Read as many bytes as the file holds at `offset`, up to `buf.len()`
pub(crate) fn read_up_to_at(mut file: &File, path: &Path, offset: u64, buf: &mut [u8]) -> Result<usize> {
    let len = buf.len() as u64;
    file.seek(SeekFrom::Start(offset))
        .map_err(|e| CiftiError::io(path, offset, len, e))?;

    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(CiftiError::io(path, offset, len, e)),
        }
    }
    Ok(filled)
}

/// Fill `buf` from `offset`, failing on a short read
pub(crate) fn read_exact_at(mut file: &File, path: &Path, offset: u64, buf: &mut [u8]) -> Result<()> {
    let len = buf.len() as u64;
    file.seek(SeekFrom::Start(offset))
        .and_then(|_| file.read_exact(buf))
        .map_err(|e| CiftiError::io(path, offset, len, e))
}

pub(crate) fn write_all_at(mut file: &File, path: &Path, offset: u64, buf: &[u8]) -> Result<()> {
    let len = buf.len() as u64;
    file.seek(SeekFrom::Start(offset))
        .and_then(|_| file.write_all(buf))
        .map_err(|e| CiftiError::io(path, offset, len, e))
}

/// Convert values stored in `order` to host order (or back; the swap is symmetric)
pub(crate) fn swap_if_needed(values: &mut [f32], order: ByteOrder, path: &Path) -> Result<()> {
    if !order.needs_swap() {
        return Ok(());
    }
    swap_elements(values).map_err(|e| CiftiError::from_format(path, e))
}

/// Same as [`swap_if_needed`], split across the rayon pool for large payloads
pub(crate) fn swap_payload(values: &mut [f32], order: ByteOrder, path: &Path) -> Result<()> {
    if !order.needs_swap() {
        return Ok(());
    }
    let bytes: &mut [u8] = bytemuck::cast_slice_mut(values);
    if bytes.len() < PARALLEL_SWAP_BYTES {
        let count = bytes.len() / 4;
        return swap_in_place(bytes, count, 4).map_err(|e| CiftiError::from_format(path, e));
    }
    bytes
        .par_chunks_mut(COPY_CHUNK_BYTES)
        .try_for_each(|chunk| swap_in_place(chunk, chunk.len() / 4, 4))
        .map_err(|e| CiftiError::from_format(path, e))
}

/// Number of whole rows that fit in one copy chunk (at least one)
pub(crate) fn rows_per_chunk(cols: usize) -> usize {
    (COPY_CHUNK_BYTES / (cols * 4).max(1)).max(1)
}

/// Open `path` for writing without truncating it
pub(crate) fn open_for_update(path: &Path) -> Result<File> {
    std::fs::OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| CiftiError::io(path, 0, 0, e))
}

/// Cut or extend the file so it ends exactly at `len`
pub(crate) fn set_file_len(file: &File, path: &Path, len: u64) -> Result<()> {
    file.set_len(len).map_err(|e| CiftiError::io(path, len, 0, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_positioned_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("io.bin");
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .unwrap();

        write_all_at(&file, &path, 8, b"abcd").unwrap();
        let mut buf = [0u8; 4];
        read_exact_at(&file, &path, 8, &mut buf).unwrap();
        assert_eq!(&buf, b"abcd");

        let mut long = [0u8; 8];
        assert_eq!(read_up_to_at(&file, &path, 8, &mut long).unwrap(), 4);
        let err = read_exact_at(&file, &path, 8, &mut long).unwrap_err();
        assert!(err.to_string().contains("offset 8"));
    }

    #[test]
    fn test_swap_payload_matches_serial() {
        let order = ByteOrder::host().opposite();
        let path = Path::new("mem");
        let source: Vec<f32> = (0..(PARALLEL_SWAP_BYTES / 4 + 3)).map(|i| i as f32).collect();

        let mut parallel = source.clone();
        swap_payload(&mut parallel, order, path).unwrap();
        let mut serial = source.clone();
        swap_if_needed(&mut serial, order, path).unwrap();
        assert_eq!(
            bytemuck::cast_slice::<f32, u8>(&parallel),
            bytemuck::cast_slice::<f32, u8>(&serial)
        );

        swap_payload(&mut parallel, order, path).unwrap();
        assert_eq!(parallel, source);
    }

    #[test]
    fn test_rows_per_chunk() {
        assert_eq!(rows_per_chunk(4), COPY_CHUNK_BYTES / 16);
        assert_eq!(rows_per_chunk(COPY_CHUNK_BYTES), 1);
    }
}
