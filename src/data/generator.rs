//! Synthetic array generation
//!
//! Produces dense row-major `f64` arrays of independent uniform values in
//! `[0, 1)`.

use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::models::selection::{extract, Selection};
use crate::util::units::bytes_to_mib;
use crate::{ChunkBenchError, Result};

/// Dense in-memory array written into every store
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticArray {
    shape: Vec<u64>,
    values: Vec<f64>,
}

impl SyntheticArray {
    /// Generate random values for `shape`. Without a seed the generator is
    /// seeded from OS entropy and every run differs.
    pub fn random(shape: &[u64], seed: Option<u64>) -> Result<Self> {
        let len = checked_len(shape)?;
        let mut rng = match seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };

        let values: Vec<f64> = (0..len).map(|_| rng.gen::<f64>()).collect();
        Ok(Self {
            shape: shape.to_vec(),
            values,
        })
    }

    /// Wrap existing row-major values
    pub fn from_values(shape: &[u64], values: Vec<f64>) -> Result<Self> {
        let len = checked_len(shape)?;
        if values.len() != len {
            return Err(ChunkBenchError::ConfigError(format!(
                "Array of shape {:?} needs {} values, got {}",
                shape,
                len,
                values.len()
            )));
        }
        Ok(Self {
            shape: shape.to_vec(),
            values,
        })
    }

    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Uncompressed size in bytes
    pub fn nbytes(&self) -> u64 {
        (self.values.len() * std::mem::size_of::<f64>()) as u64
    }

    /// Uncompressed size in MiB
    pub fn size_mb(&self) -> f64 {
        bytes_to_mib(self.nbytes())
    }

    /// Copy out the elements of `selection`
    pub fn slice(&self, selection: &Selection) -> Result<Vec<f64>> {
        selection
            .check_bounds(&self.shape)
            .map_err(ChunkBenchError::BenchmarkError)?;
        Ok(extract(&self.values, &self.shape, selection))
    }
}

fn checked_len(shape: &[u64]) -> Result<usize> {
    if shape.is_empty() || shape.len() > 2 {
        return Err(ChunkBenchError::ConfigError(format!(
            "Synthetic arrays have 1 or 2 dimensions, got {}",
            shape.len()
        )));
    }
    if shape.iter().any(|&len| len == 0) {
        return Err(ChunkBenchError::ConfigError(
            "Array dimensions must be greater than 0".to_string(),
        ));
    }

    shape
        .iter()
        .try_fold(1u64, |acc, &len| acc.checked_mul(len))
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| {
            ChunkBenchError::ConfigError(format!("Array shape {:?} is too large", shape))
        })
}
