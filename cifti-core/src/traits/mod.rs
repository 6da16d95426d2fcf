//! Abstract interfaces shared by container implementations

pub mod store;

pub use store::{CacheMode, MatrixStore};
