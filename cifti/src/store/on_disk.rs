//! File-backed matrix store
//!
//! Rows are read and written with positioned I/O against the container file.
//! One mutex guards the handle so a seek and its read or write are never
//! interleaved with another thread's.

use super::file_io;
use super::PersistentStore;
use crate::error::{check_index, check_len, CiftiError, Result};
use cifti_core::validation::bounds::{payload_byte_len, row_byte_offset, ELEMENT_SIZE};
use cifti_core::{ByteOrder, CacheMode, MatrixStore};
use hashbrown::HashSet;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

struct DiskState {
    file: File,
    /// Rows written since the last flush
    dirty: HashSet<usize>,
}

/// Matrix payload accessed lazily from a file
pub struct OnDiskStore {
    path: PathBuf,
    vox_offset: u64,
    rows: usize,
    cols: usize,
    order: ByteOrder,
    writable: bool,
    state: Mutex<DiskState>,
}

impl std::fmt::Debug for OnDiskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnDiskStore")
            .field("path", &self.path)
            .field("vox_offset", &self.vox_offset)
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .field("order", &self.order)
            .field("writable", &self.writable)
            .finish()
    }
}

impl OnDiskStore {
    /// Bind to the payload of `path`, read-write if permitted, else read-only
    pub fn bind(
        path: impl AsRef<Path>,
        vox_offset: u64,
        rows: usize,
        cols: usize,
        order: ByteOrder,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if rows == 0 || cols == 0 {
            return Err(CiftiError::state(format!(
                "matrix shape {rows}x{cols} has an empty axis"
            )));
        }
        payload_byte_len(rows, cols).map_err(|e| CiftiError::from_format(&path, e))?;

        let (file, writable) = match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(file) => (file, true),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                debug!(path = %path.display(), "binding read-only");
                let file = File::open(&path).map_err(|e| CiftiError::io(&path, 0, 0, e))?;
                (file, false)
            }
            Err(e) => return Err(CiftiError::io(&path, 0, 0, e)),
        };

        Ok(Self {
            path,
            vox_offset,
            rows,
            cols,
            order,
            writable,
            state: Mutex::new(DiskState {
                file,
                dirty: HashSet::new(),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, DiskState>> {
        self.state
            .lock()
            .map_err(|_| CiftiError::state("on-disk store lock poisoned"))
    }

    fn row_offset(&self, row: usize) -> Result<u64> {
        row_byte_offset(self.vox_offset, row, self.cols).map_err(|e| CiftiError::from_format(&self.path, e))
    }

    fn ensure_writable(&self, offset: u64, length: u64) -> Result<()> {
        if self.writable {
            return Ok(());
        }
        Err(CiftiError::io(
            &self.path,
            offset,
            length,
            std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "container file opened read-only",
            ),
        ))
    }

    /// Write one row through a shared reference
    ///
    /// Lets an `Arc<OnDiskStore>` be filled from several threads.
    pub fn write_row(&self, row: usize, values: &[f32]) -> Result<()> {
        check_index("row", row, self.rows)?;
        check_len(self.cols, values.len())?;
        let offset = self.row_offset(row)?;
        self.ensure_writable(offset, (self.cols * ELEMENT_SIZE) as u64)?;

        let mut encoded = values.to_vec();
        file_io::swap_if_needed(&mut encoded, self.order, &self.path)?;

        let mut state = self.lock()?;
        file_io::write_all_at(&state.file, &self.path, offset, bytemuck::cast_slice(&encoded))?;
        state.dirty.insert(row);
        Ok(())
    }

    /// Read one row through a shared reference
    pub fn read_row(&self, row: usize, out: &mut [f32], tolerate_short_read: bool) -> Result<()> {
        check_index("row", row, self.rows)?;
        check_len(self.cols, out.len())?;
        let offset = self.row_offset(row)?;

        let bytes: &mut [u8] = bytemuck::cast_slice_mut(out);
        let wanted = bytes.len();
        let got = {
            let state = self.lock()?;
            file_io::read_up_to_at(&state.file, &self.path, offset, bytes)?
        };

        if got < wanted {
            if !tolerate_short_read {
                return Err(CiftiError::io(
                    &self.path,
                    offset,
                    wanted as u64,
                    std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        format!("row {row} short by {} bytes", wanted - got),
                    ),
                ));
            }
            out.fill(0.0);
            return Ok(());
        }
        file_io::swap_if_needed(out, self.order, &self.path)
    }

    fn sync(&self, state: &mut DiskState) -> Result<()> {
        if state.dirty.is_empty() {
            return Ok(());
        }
        state
            .file
            .sync_data()
            .map_err(|e| CiftiError::io(&self.path, self.vox_offset, 0, e))?;
        debug!(path = %self.path.display(), rows = state.dirty.len(), "flushed dirty rows");
        state.dirty.clear();
        Ok(())
    }
}

impl MatrixStore for OnDiskStore {
    type Error = CiftiError;

    fn dimensions(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    fn cache_mode(&self) -> CacheMode {
        CacheMode::OnDisk
    }

    fn get_row(&self, row: usize, out: &mut [f32], tolerate_short_read: bool) -> Result<()> {
        self.read_row(row, out, tolerate_short_read)
    }

    fn set_row(&mut self, row: usize, values: &[f32]) -> Result<()> {
        self.write_row(row, values)
    }

    fn get_column(&self, column: usize, out: &mut [f32]) -> Result<()> {
        check_index("column", column, self.cols)?;
        check_len(self.rows, out.len())?;

        let state = self.lock()?;
        for (row, slot) in out.iter_mut().enumerate() {
            let offset = self.row_offset(row)? + (column * ELEMENT_SIZE) as u64;
            let mut raw = [0u8; ELEMENT_SIZE];
            file_io::read_exact_at(&state.file, &self.path, offset, &mut raw)?;
            *slot = self.order.read_f32(&raw, 0);
        }
        Ok(())
    }

    fn set_column(&mut self, column: usize, values: &[f32]) -> Result<()> {
        check_index("column", column, self.cols)?;
        check_len(self.rows, values.len())?;
        self.ensure_writable(self.vox_offset, 0)?;

        let path = self.path.clone();
        let offsets = (0..self.rows)
            .map(|row| Ok(self.row_offset(row)? + (column * ELEMENT_SIZE) as u64))
            .collect::<Result<Vec<u64>>>()?;
        let order = self.order;

        let mut state = self.lock()?;
        for (row, (&value, offset)) in values.iter().zip(offsets).enumerate() {
            let mut raw = [0u8; ELEMENT_SIZE];
            order.write_f32(&mut raw, 0, value);
            file_io::write_all_at(&state.file, &path, offset, &raw)?;
            state.dirty.insert(row);
        }
        Ok(())
    }

    fn get_matrix(&self, out: &mut [f32]) -> Result<()> {
        check_len(self.rows * self.cols, out.len())?;
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(out);
        {
            let state = self.lock()?;
            let mut offset = self.vox_offset;
            for chunk in bytes.chunks_mut(file_io::COPY_CHUNK_BYTES) {
                file_io::read_exact_at(&state.file, &self.path, offset, chunk)?;
                offset += chunk.len() as u64;
            }
        }
        file_io::swap_payload(out, self.order, &self.path)
    }

    fn set_matrix(&mut self, values: &[f32]) -> Result<()> {
        check_len(self.rows * self.cols, values.len())?;
        for (row, chunk) in values.chunks_exact(self.cols).enumerate() {
            self.write_row(row, chunk)?;
        }
        Ok(())
    }
}

impl PersistentStore for OnDiskStore {
    fn write_to_new_file(&self, path: &Path, vox_offset: u64, order: ByteOrder) -> Result<()> {
        let dest = file_io::open_for_update(path)?;
        let rows_per_chunk = file_io::rows_per_chunk(self.cols);
        let mut buffer = vec![0f32; rows_per_chunk * self.cols];
        let mut src_offset = self.vox_offset;
        let mut dst_offset = vox_offset;
        let mut row = 0;

        while row < self.rows {
            let count = rows_per_chunk.min(self.rows - row);
            let chunk = &mut buffer[..count * self.cols];
            let bytes: &mut [u8] = bytemuck::cast_slice_mut(chunk);

            let got = {
                let state = self.lock()?;
                file_io::read_up_to_at(&state.file, &self.path, src_offset, bytes)?
            };
            if got < bytes.len() {
                debug!(path = %self.path.display(), row, "source payload ends early; padding with zeros");
                bytes[got..].fill(0);
            }
            if self.order != order {
                let elements = bytes.len() / ELEMENT_SIZE;
                cifti_core::swap_in_place(bytes, elements, ELEMENT_SIZE)
                    .map_err(|e| CiftiError::from_format(path, e))?;
            }

            file_io::write_all_at(&dest, path, dst_offset, bytes)?;
            src_offset += bytes.len() as u64;
            dst_offset += bytes.len() as u64;
            row += count;
        }

        file_io::set_file_len(&dest, path, dst_offset)?;
        debug!(
            from = %self.path.display(),
            to = %path.display(),
            bytes = dst_offset - vox_offset,
            "payload copied"
        );
        Ok(())
    }

    fn backing_file(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn file_byte_order(&self) -> Option<ByteOrder> {
        Some(self.order)
    }

    fn vox_offset(&self) -> Option<u64> {
        Some(self.vox_offset)
    }

    fn rewrite_prefix(&self, prefix: &[u8]) -> Result<()> {
        self.ensure_writable(0, prefix.len() as u64)?;
        if prefix.len() as u64 > self.vox_offset {
            return Err(CiftiError::state(format!(
                "prefix of {} bytes would overwrite payload at {}",
                prefix.len(),
                self.vox_offset
            )));
        }
        let mut state = self.lock()?;
        file_io::write_all_at(&state.file, &self.path, 0, prefix)?;
        state
            .file
            .sync_data()
            .map_err(|e| CiftiError::io(&self.path, 0, prefix.len() as u64, e))
    }

    fn flush(&self) -> Result<()> {
        let mut state = self.lock()?;
        self.sync(&mut state)
    }

    fn dirty_row_count(&self) -> Result<usize> {
        Ok(self.lock()?.dirty.len())
    }

    fn is_writable(&self) -> bool {
        self.writable
    }
}

impl Drop for OnDiskStore {
    fn drop(&mut self) {
        let Ok(state) = self.state.get_mut() else {
            return;
        };
        if state.dirty.is_empty() {
            return;
        }
        if let Err(e) = state.file.sync_data() {
            warn!(path = %self.path.display(), error = %e, "failed to flush on drop");
        }
        state.dirty.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::store::InMemoryStore;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn payload_file(dir: &TempDir, offset: u64, values: &[f32], order: ByteOrder) -> PathBuf {
        let path = dir.path().join("payload.bin");
        let mut bytes = vec![0u8; offset as usize];
        for v in values {
            let raw = match order {
                ByteOrder::Little => v.to_le_bytes(),
                ByteOrder::Big => v.to_be_bytes(),
            };
            bytes.extend_from_slice(&raw);
        }
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_reads_both_orders() {
        let values: Vec<f32> = (1..=12).map(|v| v as f32).collect();
        for order in [ByteOrder::Little, ByteOrder::Big] {
            let dir = TempDir::new().unwrap();
            let path = payload_file(&dir, 32, &values, order);
            let store = OnDiskStore::bind(&path, 32, 3, 4, order).unwrap();

            let mut row = [0.0; 4];
            store.get_row(1, &mut row, false).unwrap();
            assert_eq!(row, [5.0, 6.0, 7.0, 8.0]);

            let mut col = [0.0; 3];
            store.get_column(2, &mut col).unwrap();
            assert_eq!(col, [3.0, 7.0, 11.0]);

            let mut all = vec![0.0; 12];
            store.get_matrix(&mut all).unwrap();
            assert_eq!(all, values);
        }
    }

    #[test]
    fn test_short_read_tolerance() {
        let dir = TempDir::new().unwrap();
        // only the first row and half of the second exist
        let path = payload_file(&dir, 16, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], ByteOrder::host());
        let store = OnDiskStore::bind(&path, 16, 3, 4, ByteOrder::host()).unwrap();

        let mut row = [9.0; 4];
        assert!(store.get_row(1, &mut row, false).is_err());
        store.get_row(1, &mut row, true).unwrap();
        assert_eq!(row, [0.0; 4]);
        store.get_row(2, &mut row, true).unwrap();
        assert_eq!(row, [0.0; 4]);

        let memory = InMemoryStore::materialize(&store).unwrap();
        assert_eq!(&memory.as_slice()[..4], &[1.0, 2.0, 3.0, 4.0]);
        assert!(memory.as_slice()[4..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_writes_track_dirty_rows() {
        let dir = TempDir::new().unwrap();
        let path = payload_file(&dir, 0, &[0.0; 6], ByteOrder::Big);
        let mut store = OnDiskStore::bind(&path, 0, 2, 3, ByteOrder::Big).unwrap();

        store.set_row(1, &[1.0, 2.0, 3.0]).unwrap();
        store.set_column(0, &[7.0, 8.0]).unwrap();
        assert_eq!(store.dirty_row_count().unwrap(), 2);
        store.flush().unwrap();
        assert_eq!(store.dirty_row_count().unwrap(), 0);

        let raw = std::fs::read(&path).unwrap();
        assert_eq!(&raw[0..4], &7.0f32.to_be_bytes());
        assert_eq!(&raw[12..16], &8.0f32.to_be_bytes());
        assert_eq!(&raw[20..24], &3.0f32.to_be_bytes());
    }

    #[test]
    fn test_poisoned_lock_is_state_error() {
        let dir = TempDir::new().unwrap();
        let path = payload_file(&dir, 0, &[0.0; 4], ByteOrder::host());
        let store = Arc::new(OnDiskStore::bind(&path, 0, 2, 2, ByteOrder::host()).unwrap());

        let holder = Arc::clone(&store);
        let joined = std::thread::spawn(move || {
            let _guard = holder.state.lock().unwrap();
            panic!("writer died holding the lock");
        })
        .join();
        assert!(joined.is_err());

        assert_eq!(store.dirty_row_count().unwrap_err().kind(), ErrorKind::State);
        assert_eq!(store.flush().unwrap_err().kind(), ErrorKind::State);
        let mut row = [0.0; 2];
        assert_eq!(store.read_row(0, &mut row, false).unwrap_err().kind(), ErrorKind::State);
    }

    #[test]
    fn test_concurrent_row_writers() {
        let dir = TempDir::new().unwrap();
        let path = payload_file(&dir, 0, &[0.0; 64 * 16], ByteOrder::host());
        let store = Arc::new(OnDiskStore::bind(&path, 0, 64, 16, ByteOrder::host()).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for row in (t..64).step_by(4) {
                        store.write_row(row, &[row as f32; 16]).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut row = [0.0; 16];
        for r in 0..64 {
            store.read_row(r, &mut row, false).unwrap();
            assert!(row.iter().all(|&v| v == r as f32));
        }
    }

    #[test]
    fn test_copy_to_new_file_swaps() {
        let dir = TempDir::new().unwrap();
        let values: Vec<f32> = (0..8).map(|v| v as f32 * 0.5).collect();
        let path = payload_file(&dir, 16, &values, ByteOrder::Little);
        let store = OnDiskStore::bind(&path, 16, 2, 4, ByteOrder::Little).unwrap();

        let dest = dir.path().join("copy.bin");
        std::fs::write(&dest, [0xAAu8; 48]).unwrap();
        store.write_to_new_file(&dest, 32, ByteOrder::Big).unwrap();

        let raw = std::fs::read(&dest).unwrap();
        assert_eq!(raw.len(), 32 + 32);
        assert_eq!(&raw[..32], &[0xAA; 32]);
        assert_eq!(&raw[36..40], &0.5f32.to_be_bytes());
    }
}
