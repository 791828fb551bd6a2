//! Compressed chunked array store
//!
//! The array is split along its leading dimension into chunks of `chunklen`
//! rows, one compressed file per chunk:
//!
//! ```text
//! meta/storage     dtype, chunklen, compression parameters
//! meta/sizes       shape, nbytes, cbytes
//! __attrs__        user attributes (empty)
//! data/__<N>.blp   blosc chunk N
//! ```
//!
//! `chunklen` is the product of the requested chunk extent, so a 2-D extent
//! of (1000, 1000) becomes 1,000,000 rows of the full trailing width.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::codec;
use super::{
    check_create_args, check_data_len, check_selection, ArrayReader, ArrayStore, ArrayWriter,
    StoreError, StoreResult,
};
use crate::models::selection::copy_region;
use crate::models::Selection;

/// Largest chunk the compressor accepts, in uncompressed bytes
pub const MAX_CHUNK_BYTES: u64 = codec::MAX_BUFFER_BYTES;

const ITEM_SIZE: u64 = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CompressionParams {
    cname: String,
    clevel: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StorageMeta {
    dtype: String,
    chunklen: u64,
    expectedlen: u64,
    dflt: f64,
    cparams: CompressionParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SizesMeta {
    shape: Vec<u64>,
    nbytes: u64,
    cbytes: u64,
}

/// Chunked, compressed array store split along the leading dimension
#[derive(Debug, Clone)]
pub struct CarrayStore {
    max_chunk_bytes: u64,
}

impl CarrayStore {
    pub fn new() -> Self {
        Self {
            max_chunk_bytes: MAX_CHUNK_BYTES,
        }
    }

    /// Lower the chunk size limit
    pub fn with_max_chunk_bytes(mut self, max_chunk_bytes: u64) -> Self {
        self.max_chunk_bytes = max_chunk_bytes;
        self
    }
}

impl Default for CarrayStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Elements in one row of the leading dimension
fn row_len(shape: &[u64]) -> u64 {
    shape[1..].iter().product()
}

fn chunk_path(root: &Path, index: u64) -> PathBuf {
    root.join("data").join(format!("__{}.blp", index))
}

impl ArrayStore for CarrayStore {
    fn name(&self) -> &'static str {
        "carray"
    }

    fn directory_name(&self) -> &'static str {
        "carray_array"
    }

    fn create(
        &self,
        path: &Path,
        shape: &[u64],
        chunk_extent: &[u64],
    ) -> StoreResult<Box<dyn ArrayWriter>> {
        check_create_args(shape, chunk_extent)?;

        let chunklen = chunk_extent
            .iter()
            .try_fold(1u64, |acc, &len| acc.checked_mul(len))
            .ok_or_else(|| StoreError::Unsupported("chunk length overflows".to_string()))?;
        let chunk_bytes = chunklen
            .checked_mul(row_len(shape))
            .and_then(|n| n.checked_mul(ITEM_SIZE))
            .unwrap_or(u64::MAX);
        if chunk_bytes > self.max_chunk_bytes {
            return Err(StoreError::Unsupported(format!(
                "chunk of {} rows is {} bytes, compressor limit is {} bytes",
                chunklen, chunk_bytes, self.max_chunk_bytes
            )));
        }

        let storage = StorageMeta {
            dtype: "float64".to_string(),
            chunklen,
            expectedlen: shape[0],
            dflt: 0.0,
            cparams: CompressionParams {
                cname: codec::COMPRESSOR.to_string(),
                clevel: codec::LEVEL,
            },
        };

        fs::create_dir_all(path.join("meta"))?;
        fs::create_dir_all(path.join("data"))?;
        fs::write(
            path.join("meta").join("storage"),
            serde_json::to_vec(&storage)?,
        )?;
        fs::write(path.join("__attrs__"), b"{}")?;

        Ok(Box::new(CarrayWriter {
            root: path.to_path_buf(),
            shape: shape.to_vec(),
            storage,
            cbytes: 0,
            written: false,
        }))
    }

    fn open(&self, path: &Path) -> StoreResult<Box<dyn ArrayReader>> {
        let storage: StorageMeta =
            serde_json::from_slice(&fs::read(path.join("meta").join("storage"))?)?;
        let sizes: SizesMeta = serde_json::from_slice(&fs::read(path.join("meta").join("sizes"))?)?;
        if sizes.shape.is_empty() || storage.chunklen == 0 {
            return Err(StoreError::Format(format!(
                "bad metadata in {}",
                path.display()
            )));
        }

        Ok(Box::new(CarrayReader {
            root: path.to_path_buf(),
            shape: sizes.shape,
            chunklen: storage.chunklen,
            cached: None,
        }))
    }
}

struct CarrayWriter {
    root: PathBuf,
    shape: Vec<u64>,
    storage: StorageMeta,
    cbytes: u64,
    written: bool,
}

impl ArrayWriter for CarrayWriter {
    fn write(&mut self, data: &[f64]) -> StoreResult<()> {
        check_data_len(&self.shape, data)?;

        let chunk_values = (self.storage.chunklen * row_len(&self.shape)) as usize;
        let mut cbytes = 0u64;
        for (index, chunk) in data.chunks(chunk_values).enumerate() {
            let frame = codec::compress(chunk, self.storage.cparams.clevel)?;
            cbytes += frame.len() as u64;
            fs::write(chunk_path(&self.root, index as u64), frame)?;
        }

        debug!(
            "wrote {} carray chunks to {}",
            data.len().div_ceil(chunk_values),
            self.root.display()
        );
        self.cbytes = cbytes;
        self.written = true;
        Ok(())
    }

    fn finish(self: Box<Self>) -> StoreResult<()> {
        let CarrayWriter {
            root,
            shape,
            cbytes,
            written,
            ..
        } = *self;
        if !written {
            return Err(StoreError::Format(format!(
                "no data written to {}",
                root.display()
            )));
        }
        let sizes = SizesMeta {
            nbytes: shape.iter().product::<u64>() * ITEM_SIZE,
            shape,
            cbytes,
        };
        fs::write(root.join("meta").join("sizes"), serde_json::to_vec(&sizes)?)?;
        Ok(())
    }
}

struct CarrayReader {
    root: PathBuf,
    shape: Vec<u64>,
    chunklen: u64,
    // Last decompressed chunk, reused within one read session
    cached: Option<(u64, Vec<f64>)>,
}

impl CarrayReader {
    fn rows_in_chunk(&self, index: u64) -> u64 {
        let start = index * self.chunklen;
        self.chunklen.min(self.shape[0] - start)
    }

    fn load_chunk(&mut self, index: u64) -> StoreResult<&[f64]> {
        let hit = matches!(&self.cached, Some((cached, _)) if *cached == index);
        if !hit {
            let frame = fs::read(chunk_path(&self.root, index))?;
            let values = (self.rows_in_chunk(index) * row_len(&self.shape)) as usize;
            self.cached = Some((index, codec::decompress(&frame, values)?));
        }
        match &self.cached {
            Some((_, values)) => Ok(values.as_slice()),
            None => Err(StoreError::Format("chunk cache empty".to_string())),
        }
    }
}

impl ArrayReader for CarrayReader {
    fn shape(&self) -> &[u64] {
        &self.shape
    }

    fn read(&mut self, selection: &Selection) -> StoreResult<Vec<f64>> {
        check_selection(&self.shape, selection)?;

        let rows = &selection.ranges()[0];
        let first = rows.start / self.chunklen;
        let last = (rows.end - 1) / self.chunklen;
        let out_shape = selection.shape();
        let out_start = selection.start();
        let mut out = vec![0.0; selection.num_elements() as usize];

        for index in first..=last {
            let row_start = index * self.chunklen;
            let chunk_rows = self.rows_in_chunk(index);
            let mut bounds: Vec<_> = self.shape.iter().map(|&len| 0..len).collect();
            bounds[0] = row_start..row_start + chunk_rows;
            let overlap = match selection.intersect(&bounds) {
                Some(overlap) => overlap,
                None => continue,
            };

            let mut chunk_shape = self.shape.clone();
            chunk_shape[0] = chunk_rows;
            let mut src_start = overlap.start();
            src_start[0] -= row_start;
            let dst_start: Vec<u64> = overlap
                .start()
                .iter()
                .zip(&out_start)
                .map(|(s, o)| s - o)
                .collect();

            let chunk = self.load_chunk(index)?;
            copy_region(
                chunk,
                &chunk_shape,
                &src_start,
                &mut out,
                &out_shape,
                &dst_start,
                &overlap.shape(),
            );
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::selection::extract;
    use tempfile::TempDir;

    #[test]
    fn test_roundtrip_1d_with_partial_last_chunk() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("carray_array");
        let store = CarrayStore::new();
        let data: Vec<f64> = (0..95).map(|v| v as f64 * 0.5).collect();

        let mut writer = store.create(&path, &[95], &[10]).unwrap();
        writer.write(&data).unwrap();
        writer.finish().unwrap();

        assert!(chunk_path(&path, 9).is_file());
        assert!(!chunk_path(&path, 10).exists());

        let mut reader = store.open(&path).unwrap();
        assert_eq!(reader.read(&Selection::all(&[95])).unwrap(), data);
        assert_eq!(reader.read(&Selection::cell(&[94])).unwrap(), vec![47.0]);
        assert_eq!(
            reader.read(&Selection::new(vec![8..23])).unwrap(),
            data[8..23].to_vec()
        );
    }

    #[test]
    fn test_2d_chunklen_is_extent_product() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("carray_array");
        let store = CarrayStore::new();
        let data: Vec<f64> = (0..100).map(|v| v as f64).collect();

        let mut writer = store.create(&path, &[10, 10], &[2, 2]).unwrap();
        writer.write(&data).unwrap();
        writer.finish().unwrap();

        // chunklen 4 rows of 10 elements: rows 0..4, 4..8, 8..10
        assert!(chunk_path(&path, 2).is_file());
        assert!(!chunk_path(&path, 3).exists());

        let mut reader = store.open(&path).unwrap();
        let sel = Selection::new(vec![2..5, 2..5]);
        assert_eq!(reader.read(&sel).unwrap(), extract(&data, &[10, 10], &sel));
    }

    #[test]
    fn test_layout_files() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("carray_array");
        let mut writer = CarrayStore::new().create(&path, &[20], &[10]).unwrap();
        writer.write(&[1.0; 20]).unwrap();
        writer.finish().unwrap();

        assert!(path.join("meta/storage").is_file());
        assert!(path.join("meta/sizes").is_file());
        assert!(path.join("__attrs__").is_file());
        assert!(path.join("data/__0.blp").is_file());
    }

    #[test]
    fn test_storage_meta_records_blosclz_level_4() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("carray_array");
        let mut writer = CarrayStore::new().create(&path, &[20], &[10]).unwrap();
        writer.write(&[1.0; 20]).unwrap();
        writer.finish().unwrap();

        let storage: StorageMeta =
            serde_json::from_slice(&fs::read(path.join("meta/storage")).unwrap()).unwrap();
        assert_eq!(storage.cparams.cname, "blosclz");
        assert_eq!(storage.cparams.clevel, 4);
    }

    #[test]
    fn test_oversized_chunk_is_unsupported() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("carray_array");

        // (1000, 1000) rows of 10000 elements is far past the limit
        let result = CarrayStore::new().create(&path, &[10_000, 10_000], &[1000, 1000]);
        assert!(matches!(result, Err(StoreError::Unsupported(_))));

        let small = CarrayStore::new().with_max_chunk_bytes(64);
        assert!(matches!(
            small.create(&path, &[100], &[10]),
            Err(StoreError::Unsupported(_))
        ));
        assert!(small.create(&path, &[100], &[8]).is_ok());
    }

    #[test]
    fn test_finish_without_write_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("carray_array");
        let writer = CarrayStore::new().create(&path, &[10], &[5]).unwrap();
        assert!(writer.finish().is_err());
    }
}
