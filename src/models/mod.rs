//! Data models module
//!
//! Contains selections, chunk extents and the timing/size result tables.

pub mod result;
pub mod selection;

// Re-export commonly used types
pub use result::{median, ChunkExtent, Operation, RunReport, SizeStat, TimingResult, TrialStats};
pub use selection::Selection;
