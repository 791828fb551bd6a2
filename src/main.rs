use std::io;
use std::time::Instant;

use chunkbench::bench::BenchmarkDriver;
use chunkbench::config::{BenchConfig, RemoteCredentials};
use chunkbench::data::SyntheticArray;
use chunkbench::io::cache::{is_privileged, OsCacheControl};
use chunkbench::report::Reporter;
use chunkbench::store::StoreRegistry;
use chunkbench::util::{format_bytes, format_duration};
use chunkbench::{logging, Result};
use tracing::{info, warn};

fn main() -> Result<()> {
    logging::init();

    let arg = std::env::args().nth(1);
    let config = BenchConfig::from_arg(arg.as_deref())?;
    config.validate()?;

    if config.location.is_remote() {
        let credentials = RemoteCredentials::from_env()?;
        info!(?credentials, "using remote storage");
    }

    if !is_privileged() {
        warn!("not running as root; cache commands rely on sudo");
    }

    let registry = StoreRegistry::default();
    let cache = OsCacheControl::new(config.cache.clone());
    let driver = BenchmarkDriver::new(&config, &registry, &cache)?;

    let data = SyntheticArray::random(&config.shape, config.seed)?;
    info!(
        shape = ?config.shape,
        size = %format_bytes(data.nbytes()),
        "generated synthetic array"
    );
    for name in &config.stores {
        if let Some(store) = registry.get(name) {
            info!(
                store = %name,
                path = %config.location.display_path(store.directory_name()),
                "store directory"
            );
        }
    }

    let start = Instant::now();
    let mut reporter = Reporter::new(io::stdout());
    reporter.write_header(&data)?;

    let report = driver.run(&data, |report, extent| {
        reporter.write_configuration(report, extent)
    })?;

    info!(
        started_at = %report.started_at,
        measurements = report.timings.count(),
        elapsed = %format_duration(start.elapsed()),
        "benchmark complete"
    );
    Ok(())
}
