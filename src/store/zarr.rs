//! Zarr v3 store backed by the `zarrs` crate

use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;

use zarrs::array::chunk_grid::ChunkGrid;
use zarrs::array::codec::bytes_to_bytes::blosc::{
    BloscCodec, BloscCompressionLevel, BloscCompressor, BloscShuffleMode,
};
use zarrs::array::{Array, ArrayBuilder, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::filesystem::FilesystemStore;

use super::{
    check_create_args, check_data_len, check_selection, ArrayReader, ArrayStore, ArrayWriter,
    StoreError, StoreResult,
};
use crate::models::Selection;

const ARRAY_PATH: &str = "/";
const BLOSC_LEVEL: u8 = 5;
const ELEMENT_SIZE: usize = 8;

fn backend(err: impl Display) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn default_blosc() -> StoreResult<BloscCodec> {
    let level = BloscCompressionLevel::try_from(BLOSC_LEVEL)
        .map_err(|_| StoreError::Backend(format!("invalid blosc level {}", BLOSC_LEVEL)))?;
    BloscCodec::new(
        BloscCompressor::LZ4,
        level,
        None,
        BloscShuffleMode::Shuffle,
        Some(ELEMENT_SIZE),
    )
    .map_err(backend)
}

/// Zarr array with a regular chunk grid and Blosc compression
///
/// Uses the zarr-python default compressor: lz4 at level 5 with byte shuffle.
#[derive(Debug, Clone, Default)]
pub struct ZarrStore;

impl ZarrStore {
    pub fn new() -> Self {
        Self
    }
}

impl ArrayStore for ZarrStore {
    fn name(&self) -> &'static str {
        "zarr"
    }

    fn directory_name(&self) -> &'static str {
        "zarr_array"
    }

    fn create(
        &self,
        path: &Path,
        shape: &[u64],
        chunk_extent: &[u64],
    ) -> StoreResult<Box<dyn ArrayWriter>> {
        check_create_args(shape, chunk_extent)?;
        std::fs::create_dir_all(path)?;

        let store = Arc::new(FilesystemStore::new(path).map_err(backend)?);
        let chunk_grid: ChunkGrid = chunk_extent
            .to_vec()
            .try_into()
            .map_err(|err| StoreError::Unsupported(format!("chunk grid: {}", err)))?;
        let array = ArrayBuilder::new(
            shape.to_vec(),
            DataType::Float64,
            chunk_grid,
            FillValue::from(0.0f64),
        )
        .bytes_to_bytes_codecs(vec![Arc::new(default_blosc()?)])
        .build(store, ARRAY_PATH)
        .map_err(backend)?;
        array.store_metadata().map_err(backend)?;

        Ok(Box::new(ZarrWriter { array }))
    }

    fn open(&self, path: &Path) -> StoreResult<Box<dyn ArrayReader>> {
        if !path.is_dir() {
            return Err(StoreError::Format(format!(
                "no zarr array at {}",
                path.display()
            )));
        }
        let store = Arc::new(FilesystemStore::new(path).map_err(backend)?);
        let array = Array::open(store, ARRAY_PATH).map_err(backend)?;
        Ok(Box::new(ZarrReader { array }))
    }
}

struct ZarrWriter {
    array: Array<FilesystemStore>,
}

impl ArrayWriter for ZarrWriter {
    fn write(&mut self, data: &[f64]) -> StoreResult<()> {
        check_data_len(self.array.shape(), data)?;
        self.array
            .store_array_subset_elements::<f64>(&self.array.subset_all(), data)
            .map_err(backend)
    }

    fn finish(self: Box<Self>) -> StoreResult<()> {
        // FilesystemStore writes each chunk through as it is stored
        Ok(())
    }
}

struct ZarrReader {
    array: Array<FilesystemStore>,
}

impl ArrayReader for ZarrReader {
    fn shape(&self) -> &[u64] {
        self.array.shape()
    }

    fn read(&mut self, selection: &Selection) -> StoreResult<Vec<f64>> {
        check_selection(self.array.shape(), selection)?;
        let subset = ArraySubset::new_with_ranges(selection.ranges());
        self.array
            .retrieve_array_subset_elements::<f64>(&subset)
            .map_err(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::selection::extract;
    use tempfile::TempDir;

    #[test]
    fn test_roundtrip_2d() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("zarr_array");
        let store = ZarrStore::new();
        let data: Vec<f64> = (0..100).map(|v| v as f64 / 3.0).collect();

        let mut writer = store.create(&path, &[10, 10], &[4, 3]).unwrap();
        writer.write(&data).unwrap();
        writer.finish().unwrap();

        let mut reader = store.open(&path).unwrap();
        assert_eq!(reader.shape(), &[10, 10]);
        assert_eq!(reader.read(&Selection::all(&[10, 10])).unwrap(), data);

        let sel = Selection::new(vec![2..5, 2..5]);
        assert_eq!(reader.read(&sel).unwrap(), extract(&data, &[10, 10], &sel));
    }

    #[test]
    fn test_metadata_records_blosc_lz4() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("zarr_array");
        let mut writer = ZarrStore::new().create(&path, &[20], &[10]).unwrap();
        writer.write(&[1.0; 20]).unwrap();
        writer.finish().unwrap();

        let metadata: serde_json::Value =
            serde_json::from_slice(&std::fs::read(path.join("zarr.json")).unwrap()).unwrap();
        let codecs = metadata["codecs"].as_array().unwrap();
        let blosc = codecs.iter().find(|codec| codec["name"] == "blosc").unwrap();
        assert_eq!(blosc["configuration"]["cname"], "lz4");
        assert_eq!(blosc["configuration"]["clevel"], 5);
        assert_eq!(blosc["configuration"]["shuffle"], "shuffle");
    }

    #[test]
    fn test_zero_extent_is_unsupported() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("zarr_array");
        assert!(matches!(
            ZarrStore::new().create(&path, &[100], &[0]),
            Err(StoreError::Unsupported(_))
        ));
    }

    #[test]
    fn test_open_missing_array_fails() {
        let temp_dir = TempDir::new().unwrap();
        assert!(ZarrStore::new()
            .open(&temp_dir.path().join("zarr_array"))
            .is_err());
    }
}
