//! Benchmark result data models
//!
//! Timing and size tables keyed by chunk extent and store name, populated
//! by the benchmark driver and read by the reporter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::io::inspect::DirStats;

/// Chunk (tile) extent of one benchmark configuration, one entry per dimension
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkExtent(Vec<u64>);

impl ChunkExtent {
    pub fn new(extent: Vec<u64>) -> Self {
        Self(extent)
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.0
    }

    pub fn ndim(&self) -> usize {
        self.0.len()
    }

    /// Number of elements covered by one chunk
    pub fn num_elements(&self) -> u64 {
        self.0.iter().product()
    }
}

impl From<u64> for ChunkExtent {
    fn from(extent: u64) -> Self {
        Self(vec![extent])
    }
}

impl From<(u64, u64)> for ChunkExtent {
    fn from((rows, cols): (u64, u64)) -> Self {
        Self(vec![rows, cols])
    }
}

impl From<Vec<u64>> for ChunkExtent {
    fn from(extent: Vec<u64>) -> Self {
        Self(extent)
    }
}

impl fmt::Display for ChunkExtent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [single] => write!(f, "{}", single),
            dims => {
                let parts: Vec<String> = dims.iter().map(|d| d.to_string()).collect();
                write!(f, "({})", parts.join(", "))
            }
        }
    }
}

/// Timed operation of a benchmark configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Create + write + sync
    Creation,
    /// Read of the whole array (`:`)
    ReadWholeArray,
    /// Read of a single element
    #[serde(rename = "read_1_cell")]
    ReadOneCell,
    /// Read of a rectangular sub-range
    ReadSubarray,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Creation => "creation",
            Operation::ReadWholeArray => "read_whole_array",
            Operation::ReadOneCell => "read_1_cell",
            Operation::ReadSubarray => "read_subarray",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statistics over repeated trials of one operation, in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialStats {
    pub samples: usize,
    pub min: f64,
    pub median: f64,
    pub max: f64,
}

impl TrialStats {
    /// Create statistics from a list of trial durations
    pub fn from_samples(samples: &[Duration]) -> Self {
        let secs: Vec<f64> = samples.iter().map(|d| d.as_secs_f64()).collect();
        if secs.is_empty() {
            return Self {
                samples: 0,
                min: f64::NAN,
                median: f64::NAN,
                max: f64::NAN,
            };
        }

        let min = secs.iter().copied().fold(f64::INFINITY, f64::min);
        let max = secs.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Self {
            samples: secs.len(),
            min,
            median: median(&secs),
            max,
        }
    }
}

/// Median of `values`; the mean of the two middle values for even lengths,
/// NaN for an empty slice
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// On-disk footprint of one store for one configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeStat {
    /// Number of regular files, `None` when the store could not be created
    pub file_count: Option<u64>,
    /// Total size in MiB, NaN when the store could not be created
    pub size_mb: f64,
}

impl SizeStat {
    /// Sentinel for a store whose creation failed
    pub fn not_available() -> Self {
        Self {
            file_count: None,
            size_mb: f64::NAN,
        }
    }

    pub fn is_available(&self) -> bool {
        self.file_count.is_some()
    }
}

impl From<DirStats> for SizeStat {
    fn from(stats: DirStats) -> Self {
        Self {
            file_count: Some(stats.file_count),
            size_mb: stats.size_mb(),
        }
    }
}

/// Median durations keyed by (chunk extent, store, operation)
#[derive(Debug, Clone, Default)]
pub struct TimingResult {
    entries: BTreeMap<(ChunkExtent, String, Operation), f64>,
}

impl TimingResult {
    pub fn record(&mut self, extent: &ChunkExtent, store: &str, operation: Operation, secs: f64) {
        self.entries
            .insert((extent.clone(), store.to_string(), operation), secs);
    }

    /// Recorded duration, NaN when nothing was recorded
    pub fn get(&self, extent: &ChunkExtent, store: &str, operation: Operation) -> f64 {
        self.entries
            .get(&(extent.clone(), store.to_string(), operation))
            .copied()
            .unwrap_or(f64::NAN)
    }

    /// Number of recorded measurements
    pub fn count(&self) -> usize {
        self.entries.len()
    }
}

/// Aggregated results of a benchmark run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Stores in report order
    pub stores: Vec<String>,
    /// Read operations measured in this run, in report order
    pub reads: Vec<Operation>,
    /// Label of the sub-range read, when one is measured
    pub subarray_label: Option<String>,
    pub timings: TimingResult,
    sizes: BTreeMap<(ChunkExtent, String), SizeStat>,
    failures: BTreeMap<(ChunkExtent, String), String>,
    cache_failures: BTreeMap<ChunkExtent, usize>,
}

impl RunReport {
    pub fn new(stores: Vec<String>, reads: Vec<Operation>, subarray_label: Option<String>) -> Self {
        Self {
            started_at: Utc::now(),
            stores,
            reads,
            subarray_label,
            timings: TimingResult::default(),
            sizes: BTreeMap::new(),
            failures: BTreeMap::new(),
            cache_failures: BTreeMap::new(),
        }
    }

    /// Record a completed create/write step
    pub fn record_creation(&mut self, extent: &ChunkExtent, store: &str, secs: f64, size: SizeStat) {
        self.timings.record(extent, store, Operation::Creation, secs);
        self.sizes.insert((extent.clone(), store.to_string()), size);
    }

    pub fn record_read(&mut self, extent: &ChunkExtent, store: &str, operation: Operation, secs: f64) {
        self.timings.record(extent, store, operation, secs);
    }

    /// Mark a store as failed for one configuration: every size and timing
    /// field becomes the not-a-number sentinel
    pub fn record_failure(&mut self, extent: &ChunkExtent, store: &str, reason: String) {
        self.timings
            .record(extent, store, Operation::Creation, f64::NAN);
        for &operation in &self.reads {
            self.timings.record(extent, store, operation, f64::NAN);
        }
        self.sizes
            .insert((extent.clone(), store.to_string()), SizeStat::not_available());
        self.failures
            .insert((extent.clone(), store.to_string()), reason);
    }

    pub fn record_cache_failures(&mut self, extent: &ChunkExtent, count: usize) {
        self.cache_failures.insert(extent.clone(), count);
    }

    pub fn timing(&self, extent: &ChunkExtent, store: &str, operation: Operation) -> f64 {
        self.timings.get(extent, store, operation)
    }

    pub fn size(&self, extent: &ChunkExtent, store: &str) -> SizeStat {
        self.sizes
            .get(&(extent.clone(), store.to_string()))
            .copied()
            .unwrap_or_else(SizeStat::not_available)
    }

    pub fn failure(&self, extent: &ChunkExtent, store: &str) -> Option<&str> {
        self.failures
            .get(&(extent.clone(), store.to_string()))
            .map(String::as_str)
    }

    pub fn cache_failures(&self, extent: &ChunkExtent) -> usize {
        self.cache_failures.get(extent).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_odd_even_empty() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
        assert!(median(&[]).is_nan());
    }

    #[test]
    fn test_trial_stats_from_samples() {
        let samples = vec![
            Duration::from_millis(300),
            Duration::from_millis(100),
            Duration::from_millis(200),
            Duration::from_millis(5000),
            Duration::from_millis(150),
        ];
        let stats = TrialStats::from_samples(&samples);
        assert_eq!(stats.samples, 5);
        assert!((stats.min - 0.1).abs() < 1e-9);
        assert!((stats.median - 0.2).abs() < 1e-9);
        assert!((stats.max - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_trial_stats_empty() {
        let stats = TrialStats::from_samples(&[]);
        assert_eq!(stats.samples, 0);
        assert!(stats.median.is_nan());
    }

    #[test]
    fn test_chunk_extent_display() {
        assert_eq!(ChunkExtent::from(1000).to_string(), "1000");
        assert_eq!(ChunkExtent::from((5000, 2000)).to_string(), "(5000, 2000)");
        assert_eq!(ChunkExtent::from((5000, 2000)).num_elements(), 10_000_000);
    }

    #[test]
    fn test_operation_names() {
        assert_eq!(Operation::ReadOneCell.as_str(), "read_1_cell");
        let json = serde_json::to_string(&Operation::ReadOneCell).unwrap();
        assert_eq!(json, "\"read_1_cell\"");
    }

    #[test]
    fn test_missing_entries_are_nan() {
        let report = RunReport::new(vec!["zarr".into()], vec![Operation::ReadWholeArray], None);
        let extent = ChunkExtent::from(10);
        assert!(report.timing(&extent, "zarr", Operation::Creation).is_nan());
        assert!(!report.size(&extent, "zarr").is_available());
        assert_eq!(report.cache_failures(&extent), 0);
    }

    #[test]
    fn test_record_failure_fills_sentinels() {
        let mut report = RunReport::new(
            vec!["carray".into()],
            vec![Operation::ReadWholeArray, Operation::ReadOneCell],
            None,
        );
        let extent = ChunkExtent::from((10, 10));
        report.record_failure(&extent, "carray", "chunk too large".into());

        assert!(report.timing(&extent, "carray", Operation::Creation).is_nan());
        assert!(report.timing(&extent, "carray", Operation::ReadOneCell).is_nan());
        assert!(report.size(&extent, "carray").size_mb.is_nan());
        assert_eq!(report.size(&extent, "carray").file_count, None);
        assert_eq!(report.failure(&extent, "carray"), Some("chunk too large"));
    }

    #[test]
    fn test_record_creation() {
        let mut report = RunReport::new(vec!["tiled".into()], vec![], None);
        let extent = ChunkExtent::from(10);
        let size = SizeStat::from(DirStats {
            file_count: 3,
            total_bytes: 2 * 1024 * 1024,
        });
        report.record_creation(&extent, "tiled", 0.5, size);

        assert_eq!(report.timing(&extent, "tiled", Operation::Creation), 0.5);
        assert_eq!(report.size(&extent, "tiled").file_count, Some(3));
        assert!((report.size(&extent, "tiled").size_mb - 2.0).abs() < 1e-9);
        assert_eq!(report.timings.count(), 1);
    }
}
