//! Utility functions module
//!
//! Contains helper functions for units formatting and conversion.

pub mod units;

// Re-export commonly used functions
pub use units::{bytes_to_mib, calculate_throughput_mbps, format_bytes, format_duration};
