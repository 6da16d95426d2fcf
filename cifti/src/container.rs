//! Container orchestration: open, reconcile, bind, write
//!
//! A [`CiftiContainer`] owns the header, the metadata extension and one
//! matrix store. Legacy axis order is normalized in exactly two places,
//! [`reconcile_dims`] on open and [`unreconcile_dims`] on write, so stores
//! only ever see a `(rows, cols)` matrix.

use crate::config::ContainerConfig;
use crate::error::{CiftiError, Result};
use crate::metadata::{MetadataExtension, MetadataRevision};
use crate::store::{file_io, InMemoryStore, OnDiskStore, PersistentStore};
use cifti_core::format::constants::{nifti2, FLOAT32_BITPIX, NIFTI_TYPE_FLOAT32};
use cifti_core::{ByteOrder, CacheMode, ExtensionLayout, ExtensionPrefix, MatrixStore, NiftiHeader};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Lifecycle of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerState {
    Closed,
    Open,
    /// A write is in progress, or one was interrupted
    Writing,
}

/// A NIfTI-wrapped CIFTI matrix file
#[derive(Debug)]
pub struct CiftiContainer {
    path: Option<PathBuf>,
    header: NiftiHeader,
    metadata: Option<MetadataExtension>,
    store: Option<Box<dyn PersistentStore>>,
    config: ContainerConfig,
    state: ContainerState,
    /// Byte order of the file this container was opened from
    source_order: Option<ByteOrder>,
}

impl CiftiContainer {
    /// A closed container that will open and write with `config`
    pub fn new(config: ContainerConfig) -> Self {
        Self {
            path: None,
            header: NiftiHeader::new(),
            metadata: None,
            store: None,
            config,
            state: ContainerState::Closed,
            source_order: None,
        }
    }

    /// Open `path` with `config`
    pub fn open_path(path: impl AsRef<Path>, config: ContainerConfig) -> Result<Self> {
        let mut container = Self::new(config);
        container.open(path)?;
        Ok(container)
    }

    /// New in-memory container shaped by `metadata`, zero-filled
    pub fn create(metadata: MetadataExtension, config: ContainerConfig) -> Result<Self> {
        let mut container = Self::new(config);
        container.state = ContainerState::Open;
        container.replace_metadata(metadata)?;
        Ok(container)
    }

    /// Open a container file, replacing whatever this container held
    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if self.state == ContainerState::Writing {
            return Err(interrupted_write());
        }
        if self.state == ContainerState::Open {
            self.close()?;
        }

        let file = File::open(path).map_err(|e| CiftiError::io(path, 0, 0, e))?;

        // a NIfTI-1 file can be shorter than the larger header
        let mut raw = vec![0u8; nifti2::HEADER_SIZE];
        let got = file_io::read_up_to_at(&file, path, 0, &mut raw)?;
        let header = NiftiHeader::from_bytes(&raw[..got]).map_err(|e| CiftiError::from_format(path, e))?;
        header
            .validate_matrix_payload()
            .map_err(|e| CiftiError::from_format(path, e))?;
        let order = header.byte_order;

        let header_size = header.version.header_size() as u64;
        let mut prefix_raw = [0u8; ExtensionPrefix::SIZE];
        let got = file_io::read_up_to_at(&file, path, header_size, &mut prefix_raw)?;
        if got < prefix_raw.len() {
            return Err(CiftiError::format(path, "file ends before the extension prefix"));
        }
        let prefix = ExtensionPrefix::from_bytes(&prefix_raw, order).map_err(|e| CiftiError::from_format(path, e))?;

        let vox_offset = u64::try_from(header.vox_offset)
            .map_err(|_| CiftiError::format(path, "negative payload offset"))?;
        let blob_end = header_size + ExtensionPrefix::SIZE as u64 + prefix.blob_len() as u64;
        if blob_end > vox_offset {
            return Err(CiftiError::format(
                path,
                format!("extension ends at {blob_end}, past payload offset {vox_offset}"),
            ));
        }
        let file_len = file
            .metadata()
            .map_err(|e| CiftiError::io(path, 0, 0, e))?
            .len();
        if blob_end > file_len {
            return Err(CiftiError::format(
                path,
                format!("extension ends at {blob_end}, past end of file at {file_len}"),
            ));
        }
        let mut blob = vec![0u8; prefix.blob_len()];
        file_io::read_exact_at(&file, path, header_size + ExtensionPrefix::SIZE as u64, &mut blob)?;
        let mut metadata = MetadataExtension::parse(&blob).map_err(|e| e.in_file(path))?;

        let dims = header.matrix_dims();
        if dims.len() > 2 {
            return Err(CiftiError::format(
                path,
                format!("{}-dimensional matrices are not supported", dims.len()),
            ));
        }
        let reconciled = reconcile_dims(dims, metadata.revision());
        resolve_axis_lengths(&mut metadata, &reconciled).map_err(|e| e.in_file(path))?;
        let (rows, cols) = store_shape(&reconciled).map_err(|e| e.in_file(path))?;

        let store: Box<dyn PersistentStore> = match self.config.cache_mode {
            CacheMode::InMemory => {
                if self.config.cache_file.is_some() {
                    debug!("cache file ignored for in-memory access");
                }
                Box::new(InMemoryStore::load(&file, path, vox_offset, rows, cols, order)?)
            }
            CacheMode::OnDisk => {
                drop(file);
                let backing = match &self.config.cache_file {
                    Some(stage) => {
                        std::fs::copy(path, stage).map_err(|e| CiftiError::io(stage, 0, 0, e))?;
                        debug!(from = %path.display(), to = %stage.display(), "staged container copy");
                        stage.clone()
                    }
                    None => path.to_path_buf(),
                };
                Box::new(OnDiskStore::bind(&backing, vox_offset, rows, cols, order)?)
            }
        };

        info!(
            path = %path.display(),
            version = header.version.number(),
            order = %order,
            revision = metadata.revision().version_str(),
            rows,
            cols,
            mode = ?self.config.cache_mode,
            "opened container"
        );

        self.path = Some(path.to_path_buf());
        self.header = header;
        self.metadata = Some(metadata);
        self.store = Some(store);
        self.source_order = Some(order);
        self.state = ContainerState::Open;
        Ok(())
    }

    /// Swap in new metadata and a zeroed in-memory matrix of its shape
    pub fn replace_metadata(&mut self, metadata: MetadataExtension) -> Result<()> {
        self.ensure_open()?;
        let lengths = metadata.resolved_lengths()?;
        let (rows, cols) = store_shape(&lengths)?;
        self.store = Some(Box::new(InMemoryStore::new(rows, cols)?));
        self.metadata = Some(metadata);
        debug!(rows, cols, "metadata replaced");
        Ok(())
    }

    /// Write the container to `path`
    ///
    /// Writing back to the file an on-disk store is bound to rewrites only the
    /// header and extension when the payload can stay where it is; otherwise
    /// the payload is pulled into memory first. The write is not atomic.
    pub fn write(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.ensure_open()?;
        self.state = ContainerState::Writing;
        let result = self.write_inner(path.as_ref());
        self.state = ContainerState::Open;
        result
    }

    fn write_inner(&mut self, path: &Path) -> Result<()> {
        let revision = self.config.writing_revision;
        let version = self.config.header_version;
        let order = self.target_order();

        let metadata = self.metadata.as_ref().ok_or_else(|| CiftiError::state("container has no metadata"))?;
        let blob = metadata.serialize(revision).map_err(|e| e.in_file(path))?;
        let layout = ExtensionLayout::for_metadata(version.header_size(), blob.len())
            .map_err(|e| CiftiError::from_format(path, e))?;
        let dims = unreconcile_dims(&metadata.resolved_lengths()?, revision).map_err(|e| e.in_file(path))?;

        let mut header = self.header;
        header.version = version;
        header.byte_order = order;
        header.datatype = NIFTI_TYPE_FLOAT32;
        header.bitpix = FLOAT32_BITPIX;
        header
            .set_matrix_dims(&dims)
            .map_err(|e| CiftiError::from_format(path, e))?;
        header.vox_offset = i64::try_from(layout.vox_offset)
            .map_err(|_| CiftiError::format(path, "payload offset overflows"))?;
        let (code, name) = metadata.intent();
        header.set_intent(code, name);

        let mut prefix = header
            .to_bytes(version, order)
            .map_err(|e| CiftiError::from_format(path, e))?;
        prefix.extend_from_slice(&layout.prefix.to_bytes(order));
        prefix.extend_from_slice(&blob);
        prefix.resize(prefix.len() + layout.padding, 0);

        let target_is_backing = self.backs_path(path);
        if target_is_backing && self.can_rewrite_in_place(order, layout.vox_offset) {
            let store = self.bound_store()?;
            store.flush()?;
            store.rewrite_prefix(&prefix)?;
            info!(path = %path.display(), "rewrote header in place");
        } else {
            if target_is_backing {
                debug!(path = %path.display(), "payload must move; loading into memory first");
                self.load_into_memory()?;
            }
            let file = File::create(path).map_err(|e| CiftiError::io(path, 0, 0, e))?;
            file_io::write_all_at(&file, path, 0, &prefix)?;
            drop(file);
            self.bound_store()?.write_to_new_file(path, layout.vox_offset, order)?;
            info!(
                path = %path.display(),
                version = version.number(),
                order = %order,
                revision = revision.version_str(),
                vox_offset = layout.vox_offset,
                "wrote container"
            );
        }

        self.header = header;
        Ok(())
    }

    fn target_order(&self) -> ByteOrder {
        self.config
            .byte_order
            .or(self.source_order)
            .unwrap_or_else(ByteOrder::host)
    }

    fn backs_path(&self, path: &Path) -> bool {
        let Some(backing) = self.store.as_ref().and_then(|s| s.backing_file()) else {
            return false;
        };
        match (std::fs::canonicalize(backing), std::fs::canonicalize(path)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    fn can_rewrite_in_place(&self, order: ByteOrder, vox_offset: u64) -> bool {
        self.store.as_ref().is_some_and(|s| {
            s.is_writable() && s.file_byte_order() == Some(order) && s.vox_offset() == Some(vox_offset)
        })
    }

    /// Matrix shape as `(rows, columns)`
    pub fn dimensions(&self) -> Result<(usize, usize)> {
        Ok(self.store_ref()?.dimensions())
    }

    pub fn row_count(&self) -> Result<usize> {
        Ok(self.store_ref()?.row_count())
    }

    pub fn column_count(&self) -> Result<usize> {
        Ok(self.store_ref()?.column_count())
    }

    /// Axis lengths in metadata order (axis 0 runs along a row)
    pub fn axis_lengths(&self) -> Result<Vec<i64>> {
        self.metadata_ref()?.resolved_lengths()
    }

    pub fn get_row(&self, row: usize, out: &mut [f32]) -> Result<()> {
        self.store_ref()?.get_row(row, out, false)
    }

    /// Like [`get_row`](Self::get_row), but a row cut off by the end of the
    /// file reads as zeros
    pub fn get_row_tolerant(&self, row: usize, out: &mut [f32]) -> Result<()> {
        self.store_ref()?.get_row(row, out, true)
    }

    pub fn set_row(&mut self, row: usize, values: &[f32]) -> Result<()> {
        self.store_mut()?.set_row(row, values)
    }

    /// Read a column; on-disk this is one seek per row
    pub fn get_column(&self, column: usize, out: &mut [f32]) -> Result<()> {
        self.store_ref()?.get_column(column, out)
    }

    pub fn set_column(&mut self, column: usize, values: &[f32]) -> Result<()> {
        self.store_mut()?.set_column(column, values)
    }

    pub fn get_matrix(&self, out: &mut [f32]) -> Result<()> {
        self.store_ref()?.get_matrix(out)
    }

    pub fn set_matrix(&mut self, values: &[f32]) -> Result<()> {
        self.store_mut()?.set_matrix(values)
    }

    pub fn is_in_memory(&self) -> bool {
        self.store.as_ref().is_some_and(|s| s.is_in_memory())
    }

    /// Load the payload into memory and release the backing file
    pub fn convert_to_in_memory(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.load_into_memory()
    }

    fn load_into_memory(&mut self) -> Result<()> {
        let store = self.bound_store()?;
        if store.is_in_memory() {
            return Ok(());
        }
        store.flush()?;
        let memory = InMemoryStore::materialize(store)?;
        let (rows, cols) = memory.dimensions();
        self.store = Some(Box::new(memory));
        info!(rows, cols, "converted to in-memory");
        Ok(())
    }

    /// Set the step of the series along a row; `Ok(false)` if that axis is not a series
    pub fn set_row_timestep(&mut self, step: f64) -> Result<bool> {
        self.set_series_step(0, step)
    }

    /// Set the step of the series along a column; `Ok(false)` if that axis is not a series
    pub fn set_column_timestep(&mut self, step: f64) -> Result<bool> {
        self.set_series_step(1, step)
    }

    fn set_series_step(&mut self, axis: usize, step: f64) -> Result<bool> {
        self.ensure_open()?;
        let metadata = self
            .metadata
            .as_mut()
            .ok_or_else(|| CiftiError::state("container has no metadata"))?;
        let changed = metadata.set_series_step(axis, step)?;
        if !changed {
            warn!(axis, "series step ignored; axis is not a series");
        }
        Ok(changed)
    }

    /// Push pending on-disk writes to stable storage
    pub fn flush(&self) -> Result<()> {
        self.store_ref()?.flush()
    }

    /// Flush and release the store
    pub fn close(&mut self) -> Result<()> {
        if self.state == ContainerState::Writing {
            return Err(interrupted_write());
        }
        if let Some(store) = self.store.take() {
            store.flush()?;
        }
        self.metadata = None;
        self.path = None;
        self.source_order = None;
        self.state = ContainerState::Closed;
        Ok(())
    }

    pub fn state(&self) -> ContainerState {
        self.state
    }

    /// File this container was opened from
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Header as last read or written
    pub fn header(&self) -> &NiftiHeader {
        &self.header
    }

    pub fn metadata(&self) -> Result<&MetadataExtension> {
        self.metadata_ref()
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            ContainerState::Open => Ok(()),
            ContainerState::Closed => Err(CiftiError::state("container is closed")),
            ContainerState::Writing => Err(interrupted_write()),
        }
    }

    fn store_ref(&self) -> Result<&dyn PersistentStore> {
        self.ensure_open()?;
        self.bound_store()
    }

    fn bound_store(&self) -> Result<&dyn PersistentStore> {
        self.store
            .as_deref()
            .ok_or_else(|| CiftiError::state("container has no matrix"))
    }

    fn store_mut(&mut self) -> Result<&mut (dyn PersistentStore + 'static)> {
        self.ensure_open()?;
        self.store
            .as_deref_mut()
            .ok_or_else(|| CiftiError::state("container has no matrix"))
    }

    fn metadata_ref(&self) -> Result<&MetadataExtension> {
        self.ensure_open()?;
        self.metadata
            .as_ref()
            .ok_or_else(|| CiftiError::state("container has no metadata"))
    }
}

fn interrupted_write() -> CiftiError {
    CiftiError::state("a write is in progress or did not complete")
}

/// Header dims to metadata axis order
///
/// Legacy files store the first two axes swapped; a one-axis legacy header
/// of length `N` describes a `[1, N]` matrix.
pub fn reconcile_dims(dims: &[i64], revision: MetadataRevision) -> Vec<i64> {
    let mut out = dims.to_vec();
    if revision.has_reversed_first_dims() {
        if out.len() == 1 {
            out.insert(0, 1);
        } else if out.len() >= 2 {
            out.swap(0, 1);
        }
    }
    out
}

/// Metadata axis lengths to header dims for the target revision
pub fn unreconcile_dims(lengths: &[i64], revision: MetadataRevision) -> Result<Vec<i64>> {
    let mut out = lengths.to_vec();
    if revision.has_reversed_first_dims() {
        if out.len() < 2 {
            return Err(CiftiError::metadata(format!(
                "CIFTI-{} cannot describe a {}-axis matrix",
                revision.version_str(),
                out.len()
            )));
        }
        out.swap(0, 1);
    }
    Ok(out)
}

/// Store shape `(rows, cols)` for metadata-ordered axis lengths
///
/// Axis 0 runs along a row, so its length is the column count. A single
/// axis is padded with a length-1 second axis.
pub fn store_shape(lengths: &[i64]) -> Result<(usize, usize)> {
    let (along_row, along_column) = match *lengths {
        [a] => (a, 1),
        [a, b] => (a, b),
        _ => {
            return Err(CiftiError::metadata(format!(
                "matrix must have one or two axes, got {}",
                lengths.len()
            )))
        }
    };
    let to_usize = |len: i64| {
        usize::try_from(len)
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| CiftiError::metadata(format!("invalid axis length {len}")))
    };
    Ok((to_usize(along_column)?, to_usize(along_row)?))
}

/// Fill unresolved metadata lengths and check resolved ones against the header
///
/// Legacy series maps carry no length; they take the header's dim for
/// their axis.
fn resolve_axis_lengths(metadata: &mut MetadataExtension, reconciled: &[i64]) -> Result<()> {
    if metadata.axis_count() != reconciled.len() {
        return Err(CiftiError::metadata(format!(
            "metadata declares {} axes, header has {}",
            metadata.axis_count(),
            reconciled.len()
        )));
    }
    for (axis, declared) in metadata.axis_lengths().into_iter().enumerate() {
        match declared {
            None => metadata.set_axis_length(axis, reconciled[axis])?,
            Some(len) if len != reconciled[axis] => {
                return Err(CiftiError::metadata(format!(
                    "axis {axis} declares length {len}, header has {}",
                    reconciled[axis]
                )))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    fn filled(rows: usize, cols: usize) -> CiftiContainer {
        let metadata = MetadataExtension::for_matrix(rows, cols).unwrap();
        let mut container = CiftiContainer::create(metadata, ContainerConfig::default()).unwrap();
        let values: Vec<f32> = (0..rows * cols).map(|v| v as f32 + 1.0).collect();
        container.set_matrix(&values).unwrap();
        container
    }

    #[test]
    fn test_reconcile_dims() {
        assert_eq!(reconcile_dims(&[7], MetadataRevision::Cifti1), vec![1, 7]);
        assert_eq!(reconcile_dims(&[3, 5], MetadataRevision::Cifti1), vec![5, 3]);
        assert_eq!(reconcile_dims(&[3, 5], MetadataRevision::Cifti2), vec![3, 5]);
        assert_eq!(reconcile_dims(&[7], MetadataRevision::Cifti2), vec![7]);
    }

    #[test]
    fn test_unreconcile_inverts_reconcile() {
        for revision in [MetadataRevision::Cifti1, MetadataRevision::Cifti2] {
            let dims = unreconcile_dims(&[4, 9], revision).unwrap();
            assert_eq!(reconcile_dims(&dims, revision), vec![4, 9]);
        }
        assert!(unreconcile_dims(&[4], MetadataRevision::Cifti1).is_err());
        assert_eq!(unreconcile_dims(&[4], MetadataRevision::Cifti2).unwrap(), vec![4]);
    }

    #[test]
    fn test_store_shape() {
        assert_eq!(store_shape(&[4, 3]).unwrap(), (3, 4));
        assert_eq!(store_shape(&[6]).unwrap(), (1, 6));
        assert!(store_shape(&[1, 2, 3]).is_err());
        assert!(store_shape(&[0, 2]).is_err());
    }

    #[test]
    fn test_closed_container_rejects_access() {
        let mut container = CiftiContainer::new(ContainerConfig::default());
        assert_eq!(container.state(), ContainerState::Closed);
        let err = container.dimensions().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
        assert!(container.set_row(0, &[1.0]).is_err());
        assert!(container.write("/nonexistent/never.nii").is_err());
    }

    #[test]
    fn test_create_write_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("m.dscalar.nii");
        let mut container = filled(3, 4);
        assert_eq!(container.dimensions().unwrap(), (3, 4));
        container.write(&path).unwrap();
        assert_eq!(container.state(), ContainerState::Open);

        let opened = CiftiContainer::open_path(&path, ContainerConfig::default()).unwrap();
        assert_eq!(opened.dimensions().unwrap(), (3, 4));
        assert_eq!(opened.axis_lengths().unwrap(), vec![4, 3]);
        let mut row = [0.0; 4];
        opened.get_row(2, &mut row).unwrap();
        assert_eq!(row, [9.0, 10.0, 11.0, 12.0]);
        assert_eq!(opened.header().vox_offset % 16, 0);
    }

    #[test]
    fn test_timestep_only_for_series() {
        let mut container = filled(2, 5);
        assert!(container.set_row_timestep(0.72).unwrap());
        assert!(!container.set_column_timestep(2.0).unwrap());
        assert!(container.metadata().unwrap().text().contains("0.72"));
    }

    #[test]
    fn test_close_then_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("c.nii");
        let mut container = filled(2, 2);
        container.write(&path).unwrap();
        container.close().unwrap();
        assert!(container.get_row(0, &mut [0.0; 2]).is_err());

        container.open(&path).unwrap();
        assert_eq!(container.state(), ContainerState::Open);
        assert_eq!(container.path(), Some(path.as_path()));
    }

    #[test]
    fn test_replace_metadata_resizes() {
        let mut container = filled(2, 2);
        container
            .replace_metadata(MetadataExtension::for_matrix(5, 3).unwrap())
            .unwrap();
        assert_eq!(container.dimensions().unwrap(), (5, 3));
        let mut col = [1.0; 5];
        container.get_column(2, &mut col).unwrap();
        assert_eq!(col, [0.0; 5]);
    }
}
