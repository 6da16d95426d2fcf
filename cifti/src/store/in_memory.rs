//! Fully resident matrix store

use super::file_io;
use super::PersistentStore;
use crate::error::{check_index, check_len, CiftiError, Result};
use cifti_core::validation::bounds::{checked_element_count, payload_byte_len};
use cifti_core::{ByteOrder, CacheMode, MatrixStore};
use std::fs::File;
use std::path::Path;
use tracing::debug;

#[cfg(feature = "mmap")]
use memmap2::MmapOptions;

/// Row-major `rows x cols` payload held in host byte order
#[derive(Debug, Clone, PartialEq)]
pub struct InMemoryStore {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl InMemoryStore {
    /// Zero-filled store
    pub fn new(rows: usize, cols: usize) -> Result<Self> {
        let len = element_count(rows, cols)?;
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|e| CiftiError::state(format!("cannot hold {rows}x{cols} matrix: {e}")))?;
        data.resize(len, 0.0);
        Ok(Self { rows, cols, data })
    }

    /// Wrap existing row-major values
    pub fn from_values(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self> {
        check_len(element_count(rows, cols)?, data.len())?;
        Ok(Self { rows, cols, data })
    }

    /// Read the whole payload of an open container file
    pub fn load(
        file: &File,
        path: &Path,
        vox_offset: u64,
        rows: usize,
        cols: usize,
        order: ByteOrder,
    ) -> Result<Self> {
        let byte_len = payload_byte_len(rows, cols).map_err(|e| CiftiError::from_format(path, e))?;

        let file_len = file
            .metadata()
            .map_err(|e| CiftiError::io(path, 0, 0, e))?
            .len();
        if file_len < vox_offset.saturating_add(byte_len) {
            return Err(CiftiError::io(
                path,
                vox_offset,
                byte_len,
                std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("file holds {file_len} bytes"),
                ),
            ));
        }

        let mut store = Self::new(rows, cols)?;
        read_payload(file, path, vox_offset, byte_len, &mut store.data)?;
        file_io::swap_payload(&mut store.data, order, path)?;
        debug!(path = %path.display(), rows, cols, swapped = order.needs_swap(), "payload loaded");
        Ok(store)
    }

    /// Stream every row out of another store
    ///
    /// Rows cut off by the end of a backing file come back as zeros.
    pub fn materialize<S>(source: &S) -> Result<Self>
    where
        S: MatrixStore<Error = CiftiError> + ?Sized,
    {
        let (rows, cols) = source.dimensions();
        let mut store = Self::new(rows, cols)?;
        for (row, out) in store.data.chunks_exact_mut(cols).enumerate() {
            source.get_row(row, out, true)?;
        }
        Ok(store)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Disjoint mutable rows, usable from parallel iterators
    pub fn rows_mut(&mut self) -> std::slice::ChunksExactMut<'_, f32> {
        self.data.chunks_exact_mut(self.cols)
    }

    fn row_range(&self, row: usize) -> std::ops::Range<usize> {
        let start = row * self.cols;
        start..start + self.cols
    }
}

fn element_count(rows: usize, cols: usize) -> Result<usize> {
    if rows == 0 || cols == 0 {
        return Err(CiftiError::state(format!(
            "matrix shape {rows}x{cols} has an empty axis"
        )));
    }
    checked_element_count(rows, cols)
        .map_err(|e| CiftiError::state(format!("cannot hold {rows}x{cols} matrix: {e}")))
}

#[cfg(feature = "mmap")]
fn read_payload(file: &File, path: &Path, vox_offset: u64, byte_len: u64, out: &mut [f32]) -> Result<()> {
    let len = usize::try_from(byte_len).map_err(|_| {
        CiftiError::format(path, "payload too large for this platform")
    })?;
    // SAFETY: Read-only mapping of a range already checked to lie inside the
    // file. The map is copied out and dropped before returning.
    let mmap = unsafe {
        MmapOptions::new()
            .offset(vox_offset)
            .len(len)
            .map(file)
            .map_err(|e| CiftiError::io(path, vox_offset, byte_len, e))?
    };
    bytemuck::cast_slice_mut::<f32, u8>(out).copy_from_slice(&mmap[..]);
    Ok(())
}

#[cfg(not(feature = "mmap"))]
fn read_payload(file: &File, path: &Path, vox_offset: u64, _byte_len: u64, out: &mut [f32]) -> Result<()> {
    let bytes: &mut [u8] = bytemuck::cast_slice_mut(out);
    let mut offset = vox_offset;
    for chunk in bytes.chunks_mut(file_io::COPY_CHUNK_BYTES) {
        file_io::read_exact_at(file, path, offset, chunk)?;
        offset += chunk.len() as u64;
    }
    Ok(())
}

impl MatrixStore for InMemoryStore {
    type Error = CiftiError;

    fn dimensions(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    fn cache_mode(&self) -> CacheMode {
        CacheMode::InMemory
    }

    fn get_row(&self, row: usize, out: &mut [f32], _tolerate_short_read: bool) -> Result<()> {
        check_index("row", row, self.rows)?;
        check_len(self.cols, out.len())?;
        out.copy_from_slice(&self.data[self.row_range(row)]);
        Ok(())
    }

    fn set_row(&mut self, row: usize, values: &[f32]) -> Result<()> {
        check_index("row", row, self.rows)?;
        check_len(self.cols, values.len())?;
        let range = self.row_range(row);
        self.data[range].copy_from_slice(values);
        Ok(())
    }

    fn get_column(&self, column: usize, out: &mut [f32]) -> Result<()> {
        check_index("column", column, self.cols)?;
        check_len(self.rows, out.len())?;
        for (slot, row) in out.iter_mut().zip(self.data.chunks_exact(self.cols)) {
            *slot = row[column];
        }
        Ok(())
    }

    fn set_column(&mut self, column: usize, values: &[f32]) -> Result<()> {
        check_index("column", column, self.cols)?;
        check_len(self.rows, values.len())?;
        for (row, &value) in self.data.chunks_exact_mut(self.cols).zip(values) {
            row[column] = value;
        }
        Ok(())
    }

    fn get_matrix(&self, out: &mut [f32]) -> Result<()> {
        check_len(self.data.len(), out.len())?;
        out.copy_from_slice(&self.data);
        Ok(())
    }

    fn set_matrix(&mut self, values: &[f32]) -> Result<()> {
        check_len(self.data.len(), values.len())?;
        self.data.copy_from_slice(values);
        Ok(())
    }
}

impl PersistentStore for InMemoryStore {
    fn write_to_new_file(&self, path: &Path, vox_offset: u64, order: ByteOrder) -> Result<()> {
        let file = file_io::open_for_update(path)?;
        let rows_per_chunk = file_io::rows_per_chunk(self.cols);
        let mut scratch: Vec<f32> = Vec::with_capacity(rows_per_chunk * self.cols);
        let mut offset = vox_offset;

        for chunk in self.data.chunks(rows_per_chunk * self.cols) {
            let bytes: &[u8] = if order.needs_swap() {
                scratch.clear();
                scratch.extend_from_slice(chunk);
                file_io::swap_if_needed(&mut scratch, order, path)?;
                bytemuck::cast_slice(&scratch)
            } else {
                bytemuck::cast_slice(chunk)
            };
            file_io::write_all_at(&file, path, offset, bytes)?;
            offset += bytes.len() as u64;
        }

        file_io::set_file_len(&file, path, offset)?;
        debug!(path = %path.display(), bytes = offset - vox_offset, "payload written from memory");
        Ok(())
    }

    fn backing_file(&self) -> Option<&Path> {
        None
    }

    fn file_byte_order(&self) -> Option<ByteOrder> {
        None
    }

    fn vox_offset(&self) -> Option<u64> {
        None
    }

    fn rewrite_prefix(&self, _prefix: &[u8]) -> Result<()> {
        Err(CiftiError::state("in-memory store has no backing file"))
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn dirty_row_count(&self) -> Result<usize> {
        Ok(0)
    }

    fn is_writable(&self) -> bool {
        true
    }
}
