//! Configuration management module
//!
//! Holds the benchmark configuration passed to the driver, its presets and
//! validation, and loading/saving of the TOML config file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::models::{ChunkExtent, Operation, Selection};
use crate::{ChunkBenchError, Result, ACCESS_KEY_ENV, APP_NAME, CONFIG_FILE, SECRET_KEY_ENV};

/// Benchmark configuration structure containing all run parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Array shape, one or two dimensions
    pub shape: Vec<u64>,
    /// Chunk/tile extents to benchmark, in order
    pub chunk_extents: Vec<ChunkExtent>,
    /// Number of timed trials per read shape
    pub trials: usize,
    /// Enabled stores, in benchmark and report order
    pub stores: Vec<String>,
    /// Where the store directories live
    pub location: StorageLocation,
    /// Selection used for the single-cell read
    pub single_cell: Selection,
    /// Selection used for the sub-range read (2-D only)
    #[serde(default)]
    pub subarray: Option<Selection>,
    /// Seed for the synthetic array; entropy-seeded when unset
    #[serde(default)]
    pub seed: Option<u64>,
    /// Page cache control settings
    #[serde(default)]
    pub cache: CacheSettings,
    /// Reuse one read session across the trials of a read shape
    #[serde(default)]
    pub reuse_read_session: bool,
    /// Show progress bars
    #[serde(default = "default_true")]
    pub progress: bool,
}

/// Location of the store directories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageLocation {
    /// Directories under a local root (the working directory by default)
    Local { root: PathBuf },
    /// Directories inside a bucket mounted on the local filesystem
    Remote { bucket: String, mount_point: PathBuf },
}

/// How failures of the cache commands are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Log a warning, count the failure and keep going
    Advisory,
    /// Abort the run on the first failure
    Required,
    /// Never run the commands
    Disabled,
}

/// Cache control commands and policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    pub policy: CachePolicy,
    /// Command flushing dirty pages, as argv
    pub sync_command: Vec<String>,
    /// Command evicting the page cache, as argv
    pub drop_command: Vec<String>,
}

/// Access keys for remote storage, read from the environment
#[derive(Clone)]
pub struct RemoteCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

fn default_true() -> bool {
    true
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            policy: CachePolicy::Advisory,
            sync_command: vec!["sudo".into(), "sync".into()],
            drop_command: vec![
                "sudo".into(),
                "sh".into(),
                "-c".into(),
                "echo 3 >/proc/sys/vm/drop_caches".into(),
            ],
        }
    }
}

impl Default for StorageLocation {
    fn default() -> Self {
        StorageLocation::Local {
            root: PathBuf::from("."),
        }
    }
}

impl StorageLocation {
    /// Directory holding the store named `directory_name`
    pub fn store_path(&self, directory_name: &str) -> PathBuf {
        match self {
            StorageLocation::Local { root } => root.join(directory_name),
            StorageLocation::Remote { mount_point, .. } => mount_point.join(directory_name),
        }
    }

    /// Human-readable location of a store, `s3://bucket/dir` for remote storage
    pub fn display_path(&self, directory_name: &str) -> String {
        match self {
            StorageLocation::Local { root } => root.join(directory_name).display().to_string(),
            StorageLocation::Remote { bucket, .. } => format!("s3://{}/{}", bucket, directory_name),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, StorageLocation::Remote { .. })
    }
}

impl RemoteCredentials {
    /// Read both access key variables; a missing one is fatal
    pub fn from_env() -> Result<Self> {
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ChunkBenchError::MissingCredentials(name.to_string()))
        };
        Ok(Self {
            access_key_id: read(ACCESS_KEY_ENV)?,
            secret_access_key: read(SECRET_KEY_ENV)?,
        })
    }
}

impl std::fmt::Debug for RemoteCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self::bench_2d()
    }
}

impl BenchConfig {
    /// One-dimensional preset: 100M values, tile extents 1e3 through 1e7
    pub fn bench_1d() -> Self {
        Self {
            shape: vec![100_000_000],
            chunk_extents: [1_000, 10_000, 100_000, 1_000_000, 10_000_000]
                .into_iter()
                .map(ChunkExtent::from)
                .collect(),
            trials: 5,
            stores: vec!["tiled".into(), "zarr".into(), "carray".into()],
            location: StorageLocation::default(),
            single_cell: Selection::cell(&[100]),
            subarray: None,
            seed: None,
            cache: CacheSettings::default(),
            reuse_read_session: false,
            progress: true,
        }
    }

    /// Two-dimensional preset: 10000x10000 values, tiles (1000, 1000) and (5000, 2000)
    pub fn bench_2d() -> Self {
        Self {
            shape: vec![10_000, 10_000],
            chunk_extents: vec![ChunkExtent::from((1_000, 1_000)), ChunkExtent::from((5_000, 2_000))],
            stores: vec!["tiled".into(), "zarr".into()],
            single_cell: Selection::cell(&[100, 100]),
            subarray: Some(Selection::new(vec![1_000..5_000, 1_000..5_000])),
            ..Self::bench_1d()
        }
    }

    /// Number of array dimensions
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Read operations this configuration measures, in report order
    pub fn read_operations(&self) -> Vec<Operation> {
        let mut reads = vec![Operation::ReadWholeArray, Operation::ReadOneCell];
        if self.subarray.is_some() {
            reads.push(Operation::ReadSubarray);
        }
        reads
    }

    /// Selection read by `operation`
    pub fn selection_for(&self, operation: Operation) -> Option<Selection> {
        match operation {
            Operation::Creation => None,
            Operation::ReadWholeArray => Some(Selection::all(&self.shape)),
            Operation::ReadOneCell => Some(self.single_cell.clone()),
            Operation::ReadSubarray => self.subarray.clone(),
        }
    }

    /// Validate the configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.shape.is_empty() || self.shape.len() > 2 {
            return Err(ChunkBenchError::ConfigError(format!(
                "Array must have 1 or 2 dimensions, got {}",
                self.shape.len()
            )));
        }

        if self.shape.iter().any(|&len| len == 0) {
            return Err(ChunkBenchError::ConfigError(
                "Array dimensions must be greater than 0".to_string(),
            ));
        }

        if self.chunk_extents.is_empty() {
            return Err(ChunkBenchError::ConfigError(
                "At least one chunk extent is required".to_string(),
            ));
        }

        for extent in &self.chunk_extents {
            if extent.ndim() != self.ndim() {
                return Err(ChunkBenchError::ConfigError(format!(
                    "Chunk extent {} has {} dimensions, array has {}",
                    extent,
                    extent.ndim(),
                    self.ndim()
                )));
            }
        }

        if self.trials == 0 {
            return Err(ChunkBenchError::ConfigError(
                "Trial count must be greater than 0".to_string(),
            ));
        }

        const MAX_TRIALS: usize = 1000;
        if self.trials > MAX_TRIALS {
            return Err(ChunkBenchError::ConfigError(format!(
                "Too many trials: {} (max: {})",
                self.trials, MAX_TRIALS
            )));
        }

        if self.stores.is_empty() {
            return Err(ChunkBenchError::ConfigError(
                "At least one store must be enabled".to_string(),
            ));
        }

        for (i, name) in self.stores.iter().enumerate() {
            if self.stores[..i].contains(name) {
                return Err(ChunkBenchError::ConfigError(format!(
                    "Store '{}' is listed more than once",
                    name
                )));
            }
        }

        self.single_cell
            .check_bounds(&self.shape)
            .map_err(ChunkBenchError::ConfigError)?;
        if self.single_cell.num_elements() != 1 {
            return Err(ChunkBenchError::ConfigError(format!(
                "Single-cell selection {} must cover exactly one element",
                self.single_cell
            )));
        }

        if let Some(subarray) = &self.subarray {
            if self.ndim() != 2 {
                return Err(ChunkBenchError::ConfigError(
                    "Sub-range reads are only measured for 2-D arrays".to_string(),
                ));
            }
            subarray
                .check_bounds(&self.shape)
                .map_err(ChunkBenchError::ConfigError)?;
        }

        match &self.location {
            StorageLocation::Local { root } => {
                if !root.is_dir() {
                    return Err(ChunkBenchError::ConfigError(format!(
                        "Storage root is not a directory: {}",
                        root.display()
                    )));
                }
            }
            StorageLocation::Remote { bucket, mount_point } => {
                if bucket.is_empty() {
                    return Err(ChunkBenchError::ConfigError(
                        "Remote bucket name must not be empty".to_string(),
                    ));
                }
                if !mount_point.is_dir() {
                    return Err(ChunkBenchError::ConfigError(format!(
                        "Bucket mount point is not a directory: {}",
                        mount_point.display()
                    )));
                }
            }
        }

        if self.cache.policy != CachePolicy::Disabled
            && (self.cache.sync_command.is_empty() || self.cache.drop_command.is_empty())
        {
            return Err(ChunkBenchError::ConfigError(
                "Cache commands must not be empty unless the cache policy is disabled".to_string(),
            ));
        }

        Ok(())
    }

    /// Set the array shape
    pub fn with_shape(mut self, shape: Vec<u64>) -> Self {
        self.shape = shape;
        self
    }

    /// Set the chunk extents to benchmark
    pub fn with_chunk_extents(mut self, extents: Vec<ChunkExtent>) -> Self {
        self.chunk_extents = extents;
        self
    }

    /// Set the number of trials
    pub fn with_trials(mut self, trials: usize) -> Self {
        self.trials = trials;
        self
    }

    /// Set the enabled stores
    pub fn with_stores<I, S>(mut self, stores: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stores = stores.into_iter().map(Into::into).collect();
        self
    }

    /// Set the storage location
    pub fn with_location(mut self, location: StorageLocation) -> Self {
        self.location = location;
        self
    }

    /// Set the single-cell selection
    pub fn with_single_cell(mut self, selection: Selection) -> Self {
        self.single_cell = selection;
        self
    }

    /// Set or clear the sub-range selection
    pub fn with_subarray(mut self, selection: Option<Selection>) -> Self {
        self.subarray = selection;
        self
    }

    /// Set the random seed
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Set the cache settings
    pub fn with_cache(mut self, cache: CacheSettings) -> Self {
        self.cache = cache;
        self
    }

    /// Set whether read sessions are reused across trials
    pub fn with_reuse_read_session(mut self, reuse: bool) -> Self {
        self.reuse_read_session = reuse;
        self
    }

    /// Set whether progress bars are shown
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Resolve the command-line argument: a preset name (`1d`, `2d`) or a
    /// path to a TOML file. Without an argument the user config file is used.
    pub fn from_arg(arg: Option<&str>) -> Result<Self> {
        match arg {
            None => Self::load(),
            Some("1d") => Ok(Self::bench_1d()),
            Some("2d") => Ok(Self::bench_2d()),
            Some(path) => Self::load_from(Path::new(path)),
        }
    }

    /// Load configuration from the standard config file location
    /// Returns the 2-D preset if the file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_file_path()?;

        if !config_path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    /// Load and validate configuration from a TOML file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ChunkBenchError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            ChunkBenchError::ConfigError(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })?;

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ChunkBenchError::ConfigError(format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let content = toml::to_string_pretty(self)?;

        fs::write(path, content).map_err(|e| {
            ChunkBenchError::ConfigError(format!(
                "Failed to write config file {}: {}",
                path.display(),
                e
            ))
        })?;

        Ok(())
    }

    /// Get the standard configuration file path
    /// Uses $CONFIG_HOME/chunkbench/chunkbench.toml
    pub fn config_file_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            ChunkBenchError::ConfigError("Unable to determine config directory".to_string())
        })?;

        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_from_arg_presets_and_files() {
        assert_eq!(BenchConfig::from_arg(Some("1d")).unwrap(), BenchConfig::bench_1d());
        assert_eq!(BenchConfig::from_arg(Some("2d")).unwrap(), BenchConfig::bench_2d());

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bench.toml");
        let config = BenchConfig::bench_1d().with_trials(2);
        config.save_to(&path).unwrap();
        let loaded = BenchConfig::from_arg(path.to_str()).unwrap();
        assert_eq!(loaded.trials, 2);

        assert!(BenchConfig::from_arg(Some("missing-config.toml")).is_err());
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(BenchConfig::bench_1d().validate().is_ok());
        assert!(BenchConfig::bench_2d().validate().is_ok());
        assert_eq!(BenchConfig::bench_1d().read_operations().len(), 2);
        assert_eq!(
            BenchConfig::bench_2d().read_operations(),
            vec![
                Operation::ReadWholeArray,
                Operation::ReadOneCell,
                Operation::ReadSubarray
            ]
        );
    }

    #[test]
    fn test_toml_serialization() {
        let config = BenchConfig::bench_2d().with_seed(Some(7));
        let toml_str = toml::to_string(&config).expect("Failed to serialize to TOML");
        let deserialized: BenchConfig =
            toml::from_str(&toml_str).expect("Failed to deserialize from TOML");
        assert_eq!(config, deserialized);
        assert!(toml_str.contains("[1000:5000, 1000:5000]"));
    }

    #[test]
    fn test_parse_minimal_file() {
        let toml_str = r#"
            shape = [100]
            chunk_extents = [[10], [50]]
            trials = 3
            stores = ["zarr"]
            single_cell = "[5:6]"

            [location]
            kind = "local"
            root = "."
        "#;
        let config: BenchConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.chunk_extents[1], ChunkExtent::from(50));
        assert_eq!(config.cache.policy, CachePolicy::Advisory);
        assert!(config.progress);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_configs() {
        let base = BenchConfig::bench_1d();

        assert!(base.clone().with_trials(0).validate().is_err());
        assert!(base.clone().with_chunk_extents(vec![]).validate().is_err());
        assert!(base
            .clone()
            .with_chunk_extents(vec![ChunkExtent::from((10, 10))])
            .validate()
            .is_err());
        assert!(base.clone().with_shape(vec![2, 2, 2]).validate().is_err());
        assert!(base
            .clone()
            .with_single_cell(Selection::cell(&[100_000_000]))
            .validate()
            .is_err());
        assert!(base
            .clone()
            .with_subarray(Some(Selection::new(vec![0..10])))
            .validate()
            .is_err());
        assert!(base.clone().with_stores(Vec::<String>::new()).validate().is_err());
        assert!(base.clone().with_stores(["zarr", "zarr"]).validate().is_err());
        assert!(base
            .with_location(StorageLocation::Local {
                root: PathBuf::from("/definitely/not/here")
            })
            .validate()
            .is_err());
    }

    #[test]
    fn test_store_paths() {
        let local = StorageLocation::Local {
            root: PathBuf::from("/data"),
        };
        assert_eq!(local.store_path("zarr_array"), PathBuf::from("/data/zarr_array"));

        let remote = StorageLocation::Remote {
            bucket: "chunk-bench".into(),
            mount_point: PathBuf::from("/mnt/bucket"),
        };
        assert_eq!(remote.store_path("zarr_array"), PathBuf::from("/mnt/bucket/zarr_array"));
        assert_eq!(remote.display_path("zarr_array"), "s3://chunk-bench/zarr_array");
        assert!(remote.is_remote());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join(CONFIG_FILE);
        let config = BenchConfig::bench_1d()
            .with_location(StorageLocation::Local {
                root: temp_dir.path().to_path_buf(),
            })
            .with_trials(2);

        config.save_to(&path).unwrap();
        let loaded = BenchConfig::load_from(&path).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_config_file_path() {
        let path = BenchConfig::config_file_path();
        assert!(path.is_ok());
        let path = path.unwrap();
        assert!(path.to_string_lossy().contains("chunkbench"));
        assert!(path.to_string_lossy().ends_with("chunkbench.toml"));
    }
}
