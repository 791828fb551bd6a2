//! Array store adapters
//!
//! Every store is reached through the same three-step shape: `create` a
//! writer and `write` the whole array, `open` a fresh read session, and
//! `read` a [`Selection`] from it. The driver never branches on which store
//! it is talking to; stores are looked up by name in a [`StoreRegistry`].

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use crate::io::inspect::{dir_stats, DirStats};
use crate::models::Selection;

pub mod carray;
pub mod codec;
pub mod registry;
pub mod tiled;
pub mod zarr;

pub use carray::CarrayStore;
pub use registry::StoreRegistry;
pub use tiled::TiledStore;
pub use zarr::ZarrStore;

/// Failure of a store adapter
#[derive(Debug)]
pub enum StoreError {
    /// The store cannot represent the requested shape or chunk extent
    Unsupported(String),
    /// A selection lies outside the stored array
    OutOfBounds(String),
    /// Underlying filesystem operation failed
    Io(io::Error),
    /// On-disk data is missing or inconsistent
    Format(String),
    /// The wrapped third-party library reported an error
    Backend(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unsupported(msg) => write!(f, "unsupported configuration: {}", msg),
            StoreError::OutOfBounds(msg) => write!(f, "selection out of bounds: {}", msg),
            StoreError::Io(err) => write!(f, "I/O error: {}", err),
            StoreError::Format(msg) => write!(f, "invalid store data: {}", msg),
            StoreError::Backend(msg) => write!(f, "backend error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Format(format!("metadata: {}", err))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A chunked array store
pub trait ArrayStore {
    /// Name used in configuration and reports
    fn name(&self) -> &'static str;

    /// Fixed directory name of the store under the storage location
    fn directory_name(&self) -> &'static str;

    /// Create an empty array of `shape` partitioned by `chunk_extent` at `path`
    fn create(
        &self,
        path: &Path,
        shape: &[u64],
        chunk_extent: &[u64],
    ) -> StoreResult<Box<dyn ArrayWriter>>;

    /// Open a fresh read session on the array at `path`
    fn open(&self, path: &Path) -> StoreResult<Box<dyn ArrayReader>>;

    /// Delete the array at `path`, if any
    fn remove(&self, path: &Path) -> StoreResult<()> {
        remove_dir_if_exists(path)
    }

    /// Count files and bytes of the array at `path`
    fn inspect(&self, path: &Path) -> StoreResult<DirStats> {
        Ok(dir_stats(path)?)
    }
}

/// Write handle returned by [`ArrayStore::create`]
pub trait ArrayWriter {
    /// Write the whole array, row-major
    fn write(&mut self, data: &[f64]) -> StoreResult<()>;

    /// Flush and commit everything written
    fn finish(self: Box<Self>) -> StoreResult<()>;
}

/// Read session returned by [`ArrayStore::open`]
pub trait ArrayReader {
    /// Shape of the stored array
    fn shape(&self) -> &[u64];

    /// Read the elements of `selection`, row-major
    fn read(&mut self, selection: &Selection) -> StoreResult<Vec<f64>>;
}

/// Remove a store directory; a missing directory is not an error
pub fn remove_dir_if_exists(path: &Path) -> StoreResult<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(StoreError::Io(err)),
    }
}

/// Reject a create request whose chunk extent does not fit the shape
pub(crate) fn check_create_args(shape: &[u64], chunk_extent: &[u64]) -> StoreResult<()> {
    if shape.is_empty() || shape.iter().any(|&len| len == 0) {
        return Err(StoreError::Unsupported(format!(
            "array shape {:?} must be non-empty",
            shape
        )));
    }
    if chunk_extent.len() != shape.len() {
        return Err(StoreError::Unsupported(format!(
            "chunk extent {:?} does not match array shape {:?}",
            chunk_extent, shape
        )));
    }
    if chunk_extent.iter().any(|&len| len == 0) {
        return Err(StoreError::Unsupported(format!(
            "chunk extent {:?} must be greater than 0 in every dimension",
            chunk_extent
        )));
    }
    Ok(())
}

/// Check the data length written for an array of `shape`
pub(crate) fn check_data_len(shape: &[u64], data: &[f64]) -> StoreResult<()> {
    let expected: u64 = shape.iter().product();
    if data.len() as u64 != expected {
        return Err(StoreError::Format(format!(
            "array of shape {:?} needs {} values, got {}",
            shape,
            expected,
            data.len()
        )));
    }
    Ok(())
}

/// Check a read selection against the stored shape
pub(crate) fn check_selection(shape: &[u64], selection: &Selection) -> StoreResult<()> {
    selection
        .check_bounds(shape)
        .map_err(StoreError::OutOfBounds)
}
