//! Host I/O module
//!
//! Page cache control and on-disk directory inspection.

pub mod cache;
pub mod inspect;

pub use cache::{is_privileged, CacheController, OsCacheControl};
pub use inspect::{dir_stats, DirStats};
