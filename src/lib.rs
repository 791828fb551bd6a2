//! chunkbench - chunked array store benchmark
//!
//! Writes synthetic arrays into several chunked array stores, evicts the OS
//! page cache and times cold whole-array, single-cell and sub-range reads.

use std::fmt;

pub mod bench;
pub mod config;
pub mod data;
pub mod io;
pub mod logging;
pub mod models;
pub mod report;
pub mod store;
pub mod util;

use store::StoreError;

// Common error types
#[derive(Debug)]
pub enum ChunkBenchError {
    /// I/O operation failed
    IoError(std::io::Error),
    /// Configuration validation or parsing error
    ConfigError(String),
    /// Benchmark execution error
    BenchmarkError(String),
    /// A store adapter failed outside of an isolated benchmark step
    StoreError(StoreError),
    /// Cache sync or drop command failed under the required policy
    CacheError(String),
    /// Remote storage selected without the access key variables
    MissingCredentials(String),
}

impl fmt::Display for ChunkBenchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkBenchError::IoError(err) => write!(f, "I/O error: {}", err),
            ChunkBenchError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            ChunkBenchError::BenchmarkError(msg) => write!(f, "Benchmark error: {}", msg),
            ChunkBenchError::StoreError(err) => write!(f, "Store error: {}", err),
            ChunkBenchError::CacheError(msg) => write!(f, "Cache control error: {}", msg),
            ChunkBenchError::MissingCredentials(var) => {
                write!(f, "Missing credentials: environment variable {} is not set", var)
            }
        }
    }
}

impl std::error::Error for ChunkBenchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ChunkBenchError::IoError(err) => Some(err),
            ChunkBenchError::StoreError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ChunkBenchError {
    fn from(err: std::io::Error) -> Self {
        ChunkBenchError::IoError(err)
    }
}

impl From<StoreError> for ChunkBenchError {
    fn from(err: StoreError) -> Self {
        ChunkBenchError::StoreError(err)
    }
}

impl From<serde_json::Error> for ChunkBenchError {
    fn from(err: serde_json::Error) -> Self {
        ChunkBenchError::ConfigError(format!("JSON serialization error: {}", err))
    }
}

impl From<toml::de::Error> for ChunkBenchError {
    fn from(err: toml::de::Error) -> Self {
        ChunkBenchError::ConfigError(format!("TOML parsing error: {}", err))
    }
}

impl From<toml::ser::Error> for ChunkBenchError {
    fn from(err: toml::ser::Error) -> Self {
        ChunkBenchError::ConfigError(format!("TOML serialization error: {}", err))
    }
}

/// Result type alias for chunkbench operations
pub type Result<T> = std::result::Result<T, ChunkBenchError>;

// Common types and constants
pub const APP_NAME: &str = "chunkbench";
pub const CONFIG_FILE: &str = "chunkbench.toml";
/// Environment variable holding the tracing filter directive
pub const LOG_ENV: &str = "CHUNKBENCH_LOG";
/// Access key variables required for remote storage
pub const ACCESS_KEY_ENV: &str = "AWS_ACCESS_KEY_ID";
pub const SECRET_KEY_ENV: &str = "AWS_SECRET_ACCESS_KEY";
