//! OS page cache control
//!
//! Flushes dirty pages and evicts the page cache before every timed
//! operation so reads are measured against a cold cache. Both operations
//! shell out to privileged host commands; what happens when they fail is
//! decided by the configured [`CachePolicy`].

use std::cell::Cell;
use std::process::Command;

use tracing::{debug, warn};

use crate::config::{CachePolicy, CacheSettings};
use crate::{ChunkBenchError, Result};

/// Cache control operations used by the benchmark driver
pub trait CacheController {
    /// Flush dirty pages to durable storage
    fn sync(&self) -> Result<()>;

    /// Evict the OS page cache
    fn drop_caches(&self) -> Result<()>;

    /// Number of failed commands tolerated so far
    fn failures(&self) -> usize {
        0
    }
}

/// Cache control backed by host commands run as subprocesses
#[derive(Debug)]
pub struct OsCacheControl {
    settings: CacheSettings,
    failures: Cell<usize>,
}

impl OsCacheControl {
    pub fn new(settings: CacheSettings) -> Self {
        Self {
            settings,
            failures: Cell::new(0),
        }
    }

    /// Run one command under the configured policy. Returns `Ok(false)` when
    /// an advisory failure was tolerated.
    fn run(&self, what: &str, argv: &[String]) -> Result<bool> {
        if self.settings.policy == CachePolicy::Disabled {
            return Ok(true);
        }

        match run_command(argv) {
            Ok(()) => {
                debug!(operation = what, "cache command succeeded");
                Ok(true)
            }
            Err(reason) => match self.settings.policy {
                CachePolicy::Required => Err(ChunkBenchError::CacheError(format!(
                    "{} failed: {}",
                    what, reason
                ))),
                _ => {
                    self.failures.set(self.failures.get() + 1);
                    warn!(
                        operation = what,
                        %reason,
                        "cache command failed; measurements may reflect a warm cache"
                    );
                    Ok(false)
                }
            },
        }
    }
}

impl CacheController for OsCacheControl {
    fn sync(&self) -> Result<()> {
        if !self.run("sync", &self.settings.sync_command)? {
            // sync(2) needs no privilege, so fall back to it in-process
            sync_in_process();
        }
        Ok(())
    }

    fn drop_caches(&self) -> Result<()> {
        self.run("drop_caches", &self.settings.drop_command)?;
        Ok(())
    }

    fn failures(&self) -> usize {
        self.failures.get()
    }
}

fn run_command(argv: &[String]) -> std::result::Result<(), String> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| "empty command".to_string())?;

    let status = Command::new(program)
        .args(args)
        .status()
        .map_err(|e| format!("failed to spawn {}: {}", program, e))?;

    if status.success() {
        Ok(())
    } else {
        Err(format!("`{}` exited with {}", argv.join(" "), status))
    }
}

#[cfg(unix)]
fn sync_in_process() {
    // SAFETY: sync(2) takes no arguments and cannot fail.
    unsafe { libc::sync() };
}

#[cfg(not(unix))]
fn sync_in_process() {}

/// Whether the process runs with root privileges
#[cfg(unix)]
pub fn is_privileged() -> bool {
    // SAFETY: geteuid(2) takes no arguments and always succeeds.
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
pub fn is_privileged() -> bool {
    false
}
