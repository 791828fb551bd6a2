//! Benchmark engine module
//!
//! Drives the create, inspect and timed-read cycle over every chunk extent
//! and store of a configuration.

pub mod driver;

pub use driver::BenchmarkDriver;
