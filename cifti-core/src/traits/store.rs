//! Matrix store interface
//!
//! A store owns the row-major float32 payload of a container, either fully
//! resident or backed by positioned reads and writes on a file.

/// Where a store keeps its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CacheMode {
    /// Rows are read from and written to the file on demand
    OnDisk,
    /// The whole payload is resident in host byte order
    #[default]
    InMemory,
}

/// Random row/column access to a row-major float32 matrix
///
/// Row and column indices are 0-based; buffers passed in must be exactly one
/// row (`columns` long), one column (`rows` long) or the full matrix.
pub trait MatrixStore {
    /// Error type for access failures
    type Error;

    /// Matrix shape as `(rows, columns)`
    fn dimensions(&self) -> (usize, usize);

    fn cache_mode(&self) -> CacheMode;

    /// Read one row into `out`
    ///
    /// With `tolerate_short_read`, a row that is cut off by the end of the
    /// backing file is zero-filled instead of failing.
    fn get_row(&self, row: usize, out: &mut [f32], tolerate_short_read: bool) -> Result<(), Self::Error>;

    /// Overwrite one row
    fn set_row(&mut self, row: usize, values: &[f32]) -> Result<(), Self::Error>;

    /// Read one column into `out`
    fn get_column(&self, column: usize, out: &mut [f32]) -> Result<(), Self::Error>;

    /// Overwrite one column
    fn set_column(&mut self, column: usize, values: &[f32]) -> Result<(), Self::Error>;

    /// Read the full matrix in row-major order
    fn get_matrix(&self, out: &mut [f32]) -> Result<(), Self::Error>;

    /// Overwrite the full matrix from row-major values
    fn set_matrix(&mut self, values: &[f32]) -> Result<(), Self::Error>;

    fn row_count(&self) -> usize {
        self.dimensions().0
    }

    fn column_count(&self) -> usize {
        self.dimensions().1
    }

    fn is_in_memory(&self) -> bool {
        self.cache_mode() == CacheMode::InMemory
    }
}
