//! Logging setup
//!
//! Diagnostics go to stderr through `tracing`; stdout carries only the
//! result tables.

use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::LOG_ENV;

/// Default filter when `CHUNKBENCH_LOG` is unset or invalid
pub const DEFAULT_LEVEL: &str = "info";

/// Initialize the global subscriber. Calling it again is a no-op.
pub fn init() {
    init_with_level(DEFAULT_LEVEL);
}

/// Initialize with `level` as the fallback filter directive
pub fn init_with_level(level: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(level));

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}
