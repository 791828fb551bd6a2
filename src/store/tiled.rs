//! Dense tiled array store
//!
//! Layout under the array directory:
//!
//! ```text
//! __array_schema.json
//! __<millis>_<seq>/a.data                     blosc tiles, row-major tile order
//! __<millis>_<seq>/__fragment_metadata.json   tile offsets, written last
//! ```
//!
//! A fragment counts as committed once its metadata file exists. Readers use
//! the newest committed fragment. Edge tiles are padded to the full extent.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::codec;
use super::{
    check_create_args, check_data_len, check_selection, ArrayReader, ArrayStore, ArrayWriter,
    StoreError, StoreResult,
};
use crate::models::selection::{copy_region, for_each_index, row_major_strides};
use crate::models::Selection;

const SCHEMA_FILE: &str = "__array_schema.json";
const FRAGMENT_METADATA_FILE: &str = "__fragment_metadata.json";
const ATTRIBUTE_FILE: &str = "a.data";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ArraySchema {
    cell_type: String,
    cell_order: String,
    tile_order: String,
    shape: Vec<u64>,
    tile_extent: Vec<u64>,
    compressor: String,
    level: u8,
}

impl ArraySchema {
    fn tile_counts(&self) -> Vec<u64> {
        self.shape
            .iter()
            .zip(&self.tile_extent)
            .map(|(&len, &ext)| len.div_ceil(ext))
            .collect()
    }

    fn tile_len(&self) -> usize {
        self.tile_extent.iter().product::<u64>() as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct TileEntry {
    offset: u64,
    length: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FragmentMetadata {
    timestamp_millis: i64,
    tiles: Vec<TileEntry>,
}

/// Dense array store with fixed tiles and write fragments
#[derive(Debug, Clone, Default)]
pub struct TiledStore;

impl TiledStore {
    pub fn new() -> Self {
        Self
    }
}

impl ArrayStore for TiledStore {
    fn name(&self) -> &'static str {
        "tiled"
    }

    fn directory_name(&self) -> &'static str {
        "tiled_array"
    }

    fn create(
        &self,
        path: &Path,
        shape: &[u64],
        chunk_extent: &[u64],
    ) -> StoreResult<Box<dyn ArrayWriter>> {
        check_create_args(shape, chunk_extent)?;
        if let Some((len, ext)) = shape
            .iter()
            .zip(chunk_extent)
            .find(|(len, ext)| ext > len)
        {
            return Err(StoreError::Unsupported(format!(
                "tile extent {} exceeds dimension length {}",
                ext, len
            )));
        }

        let schema = ArraySchema {
            cell_type: "float64".to_string(),
            cell_order: "row-major".to_string(),
            tile_order: "row-major".to_string(),
            shape: shape.to_vec(),
            tile_extent: chunk_extent.to_vec(),
            compressor: codec::COMPRESSOR.to_string(),
            level: codec::LEVEL,
        };

        fs::create_dir_all(path)?;
        fs::write(path.join(SCHEMA_FILE), serde_json::to_vec_pretty(&schema)?)?;

        Ok(Box::new(TiledWriter {
            root: path.to_path_buf(),
            schema,
            pending: None,
        }))
    }

    fn open(&self, path: &Path) -> StoreResult<Box<dyn ArrayReader>> {
        let schema: ArraySchema = serde_json::from_slice(&fs::read(path.join(SCHEMA_FILE))?)?;
        let fragment_dir = newest_fragment(path)?;
        let metadata: FragmentMetadata =
            serde_json::from_slice(&fs::read(fragment_dir.join(FRAGMENT_METADATA_FILE))?)?;

        let expected: u64 = schema.tile_counts().iter().product();
        if metadata.tiles.len() as u64 != expected {
            return Err(StoreError::Format(format!(
                "fragment {} lists {} tiles, schema needs {}",
                fragment_dir.display(),
                metadata.tiles.len(),
                expected
            )));
        }

        debug!("opened tiled fragment {}", fragment_dir.display());
        let data = File::open(fragment_dir.join(ATTRIBUTE_FILE))?;
        Ok(Box::new(TiledReader {
            schema,
            tiles: metadata.tiles,
            data,
        }))
    }
}

/// Fragment written but not yet committed
struct PendingFragment {
    dir: PathBuf,
    file: BufWriter<File>,
    metadata: FragmentMetadata,
}

struct TiledWriter {
    root: PathBuf,
    schema: ArraySchema,
    pending: Option<PendingFragment>,
}

impl TiledWriter {
    fn start_fragment(&self) -> StoreResult<PendingFragment> {
        let timestamp_millis = chrono::Utc::now().timestamp_millis();
        let seq = fs::read_dir(&self.root)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| parse_fragment_name(&entry.file_name().to_string_lossy()).is_some())
            .count();
        let dir = self.root.join(format!("__{}_{}", timestamp_millis, seq));
        fs::create_dir_all(&dir)?;
        let file = BufWriter::new(File::create(dir.join(ATTRIBUTE_FILE))?);

        Ok(PendingFragment {
            dir,
            file,
            metadata: FragmentMetadata {
                timestamp_millis,
                tiles: Vec::new(),
            },
        })
    }

    fn commit(pending: PendingFragment) -> StoreResult<()> {
        let PendingFragment {
            dir,
            file,
            metadata,
        } = pending;
        let file = file
            .into_inner()
            .map_err(|err| StoreError::Io(err.into_error()))?;
        file.sync_all()?;
        fs::write(
            dir.join(FRAGMENT_METADATA_FILE),
            serde_json::to_vec(&metadata)?,
        )?;
        Ok(())
    }
}

impl ArrayWriter for TiledWriter {
    fn write(&mut self, data: &[f64]) -> StoreResult<()> {
        check_data_len(&self.schema.shape, data)?;
        if let Some(previous) = self.pending.take() {
            Self::commit(previous)?;
        }

        let mut fragment = self.start_fragment()?;
        let shape = &self.schema.shape;
        let extent = &self.schema.tile_extent;
        let tile_grid: Vec<_> = self.schema.tile_counts().into_iter().map(|n| 0..n).collect();
        let zeros = vec![0u64; extent.len()];
        let mut tile = vec![0.0; self.schema.tile_len()];
        let mut offset = 0u64;
        let mut result = Ok(());

        for_each_index(&tile_grid, |coords| {
            if result.is_err() {
                return;
            }
            let origin: Vec<u64> = coords.iter().zip(extent).map(|(c, e)| c * e).collect();
            let region: Vec<u64> = origin
                .iter()
                .zip(extent)
                .zip(shape)
                .map(|((o, e), len)| (*e).min(len - o))
                .collect();

            tile.iter_mut().for_each(|v| *v = 0.0);
            copy_region(data, shape, &origin, &mut tile, extent, &zeros, &region);

            result = codec::compress(&tile, self.schema.level).and_then(|frame| {
                fragment.file.write_all(&frame)?;
                fragment.metadata.tiles.push(TileEntry {
                    offset,
                    length: frame.len() as u64,
                });
                offset += frame.len() as u64;
                Ok(())
            });
        });
        result?;

        debug!(
            "wrote {} tiles to {}",
            fragment.metadata.tiles.len(),
            fragment.dir.display()
        );
        self.pending = Some(fragment);
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> StoreResult<()> {
        match self.pending.take() {
            Some(fragment) => Self::commit(fragment),
            None => Ok(()),
        }
    }
}

struct TiledReader {
    schema: ArraySchema,
    tiles: Vec<TileEntry>,
    data: File,
}

impl TiledReader {
    fn read_tile(&mut self, index: usize) -> StoreResult<Vec<f64>> {
        let entry = self.tiles[index];
        let mut frame = vec![0u8; entry.length as usize];
        self.data.seek(SeekFrom::Start(entry.offset))?;
        self.data.read_exact(&mut frame)?;
        codec::decompress(&frame, self.schema.tile_len())
    }
}

impl ArrayReader for TiledReader {
    fn shape(&self) -> &[u64] {
        &self.schema.shape
    }

    fn read(&mut self, selection: &Selection) -> StoreResult<Vec<f64>> {
        check_selection(&self.schema.shape, selection)?;

        let extent = self.schema.tile_extent.clone();
        let tile_strides = row_major_strides(&self.schema.tile_counts());
        let out_shape = selection.shape();
        let out_start = selection.start();
        let mut out = vec![0.0; selection.num_elements() as usize];

        // Only tiles overlapping the selection
        let touched: Vec<_> = selection
            .ranges()
            .iter()
            .zip(&extent)
            .map(|(r, e)| r.start / e..(r.end - 1) / e + 1)
            .collect();
        let mut wanted = Vec::new();
        for_each_index(&touched, |coords| wanted.push(coords.to_vec()));

        for coords in wanted {
            let index: u64 = coords.iter().zip(&tile_strides).map(|(c, s)| c * s).sum();
            let origin: Vec<u64> = coords.iter().zip(&extent).map(|(c, e)| c * e).collect();
            let bounds: Vec<_> = origin.iter().zip(&extent).map(|(o, e)| *o..o + e).collect();
            let overlap = match selection.intersect(&bounds) {
                Some(overlap) => overlap,
                None => continue,
            };

            let tile = self.read_tile(index as usize)?;
            let src_start: Vec<u64> = overlap
                .start()
                .iter()
                .zip(&origin)
                .map(|(s, o)| s - o)
                .collect();
            let dst_start: Vec<u64> = overlap
                .start()
                .iter()
                .zip(&out_start)
                .map(|(s, o)| s - o)
                .collect();
            copy_region(
                &tile,
                &extent,
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

fn parse_fragment_name(name: &str) -> Option<(i64, u64)> {
    let (millis, seq) = name.strip_prefix("__")?.split_once('_')?;
    Some((millis.parse().ok()?, seq.parse().ok()?))
}

/// Newest fragment directory that has been committed
fn newest_fragment(root: &Path) -> StoreResult<PathBuf> {
    let mut newest: Option<((i64, u64), PathBuf)> = None;
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let key = match parse_fragment_name(&entry.file_name().to_string_lossy()) {
            Some(key) => key,
            None => continue,
        };
        let dir = entry.path();
        if !dir.join(FRAGMENT_METADATA_FILE).is_file() {
            continue;
        }
        if newest.as_ref().map_or(true, |(best, _)| key > *best) {
            newest = Some((key, dir));
        }
    }

    newest
        .map(|(_, dir)| dir)
        .ok_or_else(|| StoreError::Format(format!("no committed fragment in {}", root.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::selection::extract;
    use tempfile::TempDir;

    fn write_array(path: &Path, shape: &[u64], extent: &[u64], data: &[f64]) {
        let store = TiledStore::new();
        let mut writer = store.create(path, shape, extent).unwrap();
        writer.write(data).unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn test_roundtrip_with_padded_edge_tiles() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tiled_array");
        let data: Vec<f64> = (0..70).map(|v| v as f64).collect();
        write_array(&path, &[7, 10], &[3, 4], &data);

        let mut reader = TiledStore::new().open(&path).unwrap();
        assert_eq!(reader.shape(), &[7, 10]);
        assert_eq!(reader.read(&Selection::all(&[7, 10])).unwrap(), data);

        let sel = Selection::new(vec![2..6, 3..9]);
        assert_eq!(reader.read(&sel).unwrap(), extract(&data, &[7, 10], &sel));
        assert_eq!(reader.read(&Selection::cell(&[6, 9])).unwrap(), vec![69.0]);
    }

    #[test]
    fn test_layout_files() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tiled_array");
        write_array(&path, &[100], &[10], &vec![1.5; 100]);

        assert!(path.join(SCHEMA_FILE).is_file());
        let fragment = newest_fragment(&path).unwrap();
        assert!(fragment.join(ATTRIBUTE_FILE).is_file());
        assert!(fragment.join(FRAGMENT_METADATA_FILE).is_file());
    }

    #[test]
    fn test_schema_records_blosclz_level_4() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tiled_array");
        write_array(&path, &[100], &[10], &vec![1.5; 100]);

        let schema: ArraySchema =
            serde_json::from_slice(&fs::read(path.join(SCHEMA_FILE)).unwrap()).unwrap();
        assert_eq!(schema.compressor, "blosclz");
        assert_eq!(schema.level, 4);
    }

    #[test]
    fn test_uncommitted_fragment_is_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tiled_array");
        let store = TiledStore::new();
        let mut writer = store.create(&path, &[10], &[5]).unwrap();
        writer.write(&vec![2.0; 10]).unwrap();
        drop(writer);

        assert!(store.open(&path).is_err());
    }

    #[test]
    fn test_newest_fragment_wins() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tiled_array");
        let store = TiledStore::new();
        let mut writer = store.create(&path, &[10], &[5]).unwrap();
        writer.write(&vec![1.0; 10]).unwrap();
        writer.write(&vec![2.0; 10]).unwrap();
        writer.finish().unwrap();

        let mut reader = store.open(&path).unwrap();
        assert_eq!(reader.read(&Selection::cell(&[3])).unwrap(), vec![2.0]);
    }

    #[test]
    fn test_rejects_oversized_or_zero_extent() {
        let temp_dir = TempDir::new().unwrap();
        let store = TiledStore::new();
        let path = temp_dir.path().join("tiled_array");

        assert!(matches!(
            store.create(&path, &[100], &[101]),
            Err(StoreError::Unsupported(_))
        ));
        assert!(matches!(
            store.create(&path, &[100], &[0]),
            Err(StoreError::Unsupported(_))
        ));
    }

    #[test]
    fn test_out_of_bounds_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tiled_array");
        write_array(&path, &[10], &[5], &vec![0.0; 10]);

        let mut reader = TiledStore::new().open(&path).unwrap();
        assert!(matches!(
            reader.read(&Selection::new(vec![8..12])),
            Err(StoreError::OutOfBounds(_))
        ));
    }

    #[test]
    fn test_parse_fragment_name() {
        assert_eq!(parse_fragment_name("__1700000000000_3"), Some((1700000000000, 3)));
        assert_eq!(parse_fragment_name("__array_schema.json"), None);
        assert_eq!(parse_fragment_name("a.data"), None);
    }
}
