//! Directory inspection
//!
//! Walks a store's on-disk tree and reports how many regular files it holds
//! and their total size.

use std::fs;
use std::io;
use std::path::Path;

use crate::util::units::bytes_to_mib;

/// File count and total size of a directory tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirStats {
    pub file_count: u64,
    pub total_bytes: u64,
}

impl DirStats {
    /// Total size in MiB
    pub fn size_mb(&self) -> f64 {
        bytes_to_mib(self.total_bytes)
    }
}

/// Recursively count regular files under `dir` and sum their sizes.
///
/// Symlinks are not followed. A missing directory is an error.
pub fn dir_stats(dir: &Path) -> io::Result<DirStats> {
    let mut stats = DirStats::default();
    walk(dir, &mut stats)?;
    Ok(stats)
}

fn walk(dir: &Path, stats: &mut DirStats) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk(&entry.path(), stats)?;
        } else if file_type.is_file() {
            stats.file_count += 1;
            stats.total_bytes += entry.metadata()?.len();
        }
    }
    Ok(())
}
