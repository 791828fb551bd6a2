//! Benchmark driver
//!
//! Runs every configured chunk extent against every enabled store: create
//! and write the array, record its on-disk footprint, then time repeated
//! cold reads of each read shape. A store failure only blanks that store's
//! row for that extent; the run carries on.

use std::path::Path;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::config::BenchConfig;
use crate::data::SyntheticArray;
use crate::io::cache::CacheController;
use crate::models::{ChunkExtent, Operation, RunReport, SizeStat, TrialStats};
use crate::store::{ArrayReader, ArrayStore, StoreError, StoreRegistry};
use crate::util::calculate_throughput_mbps;
use crate::{ChunkBenchError, Result};

/// Failure of one benchmark step
enum StepError {
    /// Isolated to the current (extent, store) pair
    Store(StoreError),
    /// Aborts the whole run
    Fatal(ChunkBenchError),
}

impl From<StoreError> for StepError {
    fn from(err: StoreError) -> Self {
        StepError::Store(err)
    }
}

impl From<ChunkBenchError> for StepError {
    fn from(err: ChunkBenchError) -> Self {
        StepError::Fatal(err)
    }
}

/// Measurements of one store for one chunk extent
struct StoreMeasurement {
    creation_secs: f64,
    size: SizeStat,
    reads: Vec<(Operation, TrialStats)>,
}

/// Sequential benchmark executor
pub struct BenchmarkDriver<'a> {
    config: &'a BenchConfig,
    registry: &'a StoreRegistry,
    cache: &'a dyn CacheController,
}

impl<'a> BenchmarkDriver<'a> {
    /// Create a driver, rejecting invalid configurations and unknown stores
    pub fn new(
        config: &'a BenchConfig,
        registry: &'a StoreRegistry,
        cache: &'a dyn CacheController,
    ) -> Result<Self> {
        config.validate()?;

        if let Some(unknown) = config.stores.iter().find(|name| !registry.contains(name)) {
            return Err(ChunkBenchError::ConfigError(format!(
                "Unknown store '{}'; available stores: {}",
                unknown,
                registry.names().join(", ")
            )));
        }

        Ok(Self {
            config,
            registry,
            cache,
        })
    }

    /// Run all configurations. `emit` is called with the report after each
    /// chunk extent completes, before the next one starts.
    pub fn run<F>(&self, data: &SyntheticArray, mut emit: F) -> Result<RunReport>
    where
        F: FnMut(&RunReport, &ChunkExtent) -> Result<()>,
    {
        if data.shape() != self.config.shape.as_slice() {
            return Err(ChunkBenchError::BenchmarkError(format!(
                "Array shape {:?} does not match configured shape {:?}",
                data.shape(),
                self.config.shape
            )));
        }

        let mut report = RunReport::new(
            self.config.stores.clone(),
            self.config.read_operations(),
            self.config.subarray.as_ref().map(|s| s.label()),
        );

        info!(
            stores = %self.config.stores.join(","),
            extents = self.config.chunk_extents.len(),
            trials = self.config.trials,
            "starting benchmark run"
        );

        for extent in &self.config.chunk_extents {
            let failures_before = self.cache.failures();
            self.run_extent(data, extent, &mut report)?;
            report.record_cache_failures(extent, self.cache.failures() - failures_before);
            emit(&report, extent)?;
        }

        Ok(report)
    }

    fn run_extent(
        &self,
        data: &SyntheticArray,
        extent: &ChunkExtent,
        report: &mut RunReport,
    ) -> Result<()> {
        info!(%extent, "benchmarking chunk extent");
        self.remove_arrays()?;

        for name in &self.config.stores {
            let store = self.store(name)?;
            let path = self.config.location.store_path(store.directory_name());
            let progress = self.progress_bar(name, extent);

            match self.bench_store(store, &path, data, extent, &progress) {
                Ok(measurement) => {
                    report.record_creation(
                        extent,
                        name,
                        measurement.creation_secs,
                        measurement.size,
                    );
                    for (operation, stats) in measurement.reads {
                        report.record_read(extent, name, operation, stats.median);
                    }
                    progress.finish_with_message("done");
                }
                Err(StepError::Store(err)) => {
                    warn!(store = %name, %extent, error = %err, "store failed; recording NaN");
                    report.record_failure(extent, name, err.to_string());
                    progress.abandon_with_message("failed");
                }
                Err(StepError::Fatal(err)) => {
                    progress.abandon_with_message("aborted");
                    return Err(err);
                }
            }
        }

        Ok(())
    }

    fn bench_store(
        &self,
        store: &dyn ArrayStore,
        path: &Path,
        data: &SyntheticArray,
        extent: &ChunkExtent,
        progress: &ProgressBar,
    ) -> std::result::Result<StoreMeasurement, StepError> {
        progress.set_message("create");
        self.cache.drop_caches()?;
        let start = Instant::now();
        let write_result = store
            .create(path, data.shape(), extent.as_slice())
            .and_then(|mut writer| {
                writer.write(data.values())?;
                writer.finish()
            });
        if let Err(err) = write_result {
            warn!(
                store = store.name(),
                elapsed_secs = start.elapsed().as_secs_f64(),
                "array creation failed"
            );
            self.cache.sync()?;
            return Err(err.into());
        }
        self.cache.sync()?;
        let creation_secs = start.elapsed().as_secs_f64();
        progress.inc(1);

        let size = SizeStat::from(store.inspect(path)?);
        debug!(
            store = store.name(),
            creation_secs,
            size_mb = size.size_mb,
            files = ?size.file_count,
            "array created"
        );

        let mut reads = Vec::new();
        for operation in self.config.read_operations() {
            progress.set_message(operation.as_str());
            let stats = self.time_reads(store, path, operation, progress)?;
            reads.push((operation, stats));
        }

        Ok(StoreMeasurement {
            creation_secs,
            size,
            reads,
        })
    }

    /// Time `trials` cold reads of one read shape
    fn time_reads(
        &self,
        store: &dyn ArrayStore,
        path: &Path,
        operation: Operation,
        progress: &ProgressBar,
    ) -> std::result::Result<TrialStats, StepError> {
        let selection = self.config.selection_for(operation).ok_or_else(|| {
            ChunkBenchError::BenchmarkError(format!("No selection for {}", operation))
        })?;
        let expected = selection.num_elements() as usize;
        let mut session: Option<Box<dyn ArrayReader>> = None;
        let mut samples = Vec::with_capacity(self.config.trials);

        for _ in 0..self.config.trials {
            if !self.config.reuse_read_session {
                drop(session.take());
            }
            self.cache.drop_caches()?;

            let start = Instant::now();
            let mut reader = match session.take() {
                Some(reader) => reader,
                None => store.open(path)?,
            };
            let values = reader.read(&selection)?;
            let elapsed: Duration = start.elapsed();

            if values.len() != expected {
                return Err(StoreError::Format(format!(
                    "{} returned {} elements for {}, expected {}",
                    store.name(),
                    values.len(),
                    selection,
                    expected
                ))
                .into());
            }
            samples.push(elapsed);
            session = Some(reader);
            progress.inc(1);
        }

        let stats = TrialStats::from_samples(&samples);
        let bytes = (expected * std::mem::size_of::<f64>()) as u64;
        debug!(
            store = store.name(),
            operation = operation.as_str(),
            median = stats.median,
            throughput_mibps = calculate_throughput_mbps(bytes, stats.median),
            min = stats.min,
            max = stats.max,
            "reads timed"
        );
        Ok(stats)
    }

    /// Remove every registered store's directory
    fn remove_arrays(&self) -> Result<()> {
        for store in self.registry.iter() {
            let path = self.config.location.store_path(store.directory_name());
            store.remove(&path)?;
        }
        Ok(())
    }

    fn store(&self, name: &str) -> Result<&'a dyn ArrayStore> {
        self.registry
            .get(name)
            .ok_or_else(|| ChunkBenchError::ConfigError(format!("Unknown store '{}'", name)))
    }

    fn progress_bar(&self, store: &str, extent: &ChunkExtent) -> ProgressBar {
        if !self.config.progress {
            return ProgressBar::hidden();
        }
        let steps = 1 + self.config.read_operations().len() * self.config.trials;
        let bar = ProgressBar::new(steps as u64);
        bar.set_style(
            ProgressStyle::with_template("{prefix:>24} [{bar:30}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.set_prefix(format!("{} {}", store, extent));
        bar
    }
}
