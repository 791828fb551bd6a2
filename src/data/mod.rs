//! Benchmark input data

pub mod generator;

pub use generator::SyntheticArray;
