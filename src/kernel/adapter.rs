//! Adapters from caller types to fixed-dimension memory vectors.
//!
//! The memory only ever sees `dimensions`-long `f64` vectors. Callers hand
//! it whatever they have and the [`MemoryVector`] impl decides how that maps
//! onto the memory dimension. A mismatch is a [`MemoryError::DimensionMismatch`],
//! never a silent pad or truncate.
//!
//! # Example
//!
//! ```rust
//! use grid_memory::kernel::{MemoryVector, PhaseKey};
//!
//! let bias = [0.1f64, 0.0, 0.0].to_memory_vector(3).unwrap();
//! assert_eq!(bias.len(), 3);
//!
//! // A 5-vector cannot be used where 3 components are expected.
//! assert!(vec![0.0f64; 5].to_memory_vector(3).is_err());
//!
//! // String keys hash to a deterministic phase vector.
//! let a = PhaseKey::new("station-7").to_memory_vector(3).unwrap();
//! let b = PhaseKey::new("station-7").to_memory_vector(3).unwrap();
//! assert_eq!(a, b);
//! ```

use crate::error::{check_vector, MemoryError, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};
use std::f64::consts::TAU;

/// Conversion into a memory vector of an exact dimensionality.
pub trait MemoryVector {
    /// Produce a vector of exactly `dimensions` finite components.
    fn to_memory_vector(&self, dimensions: usize) -> Result<Vec<f64>>;
}

impl MemoryVector for [f64] {
    fn to_memory_vector(&self, dimensions: usize) -> Result<Vec<f64>> {
        check_vector(self, dimensions, "vector")?;
        Ok(self.to_vec())
    }
}

impl MemoryVector for Vec<f64> {
    fn to_memory_vector(&self, dimensions: usize) -> Result<Vec<f64>> {
        self.as_slice().to_memory_vector(dimensions)
    }
}

impl<const N: usize> MemoryVector for [f64; N] {
    fn to_memory_vector(&self, dimensions: usize) -> Result<Vec<f64>> {
        self.as_slice().to_memory_vector(dimensions)
    }
}

/// A scalar is broadcast to every component.
impl MemoryVector for f64 {
    fn to_memory_vector(&self, dimensions: usize) -> Result<Vec<f64>> {
        if !self.is_finite() {
            return Err(MemoryError::NonFinite { what: "scalar" });
        }
        Ok(vec![*self; dimensions])
    }
}

impl<T: MemoryVector + ?Sized> MemoryVector for &T {
    fn to_memory_vector(&self, dimensions: usize) -> Result<Vec<f64>> {
        (**self).to_memory_vector(dimensions)
    }
}

// =============================================================================
// Hashed keys
// =============================================================================

/// A string key folded into a phase vector.
///
/// The SHA-256 of the key seeds a ChaCha8 stream, which draws one uniform
/// phase in `[0, period)` per dimension. The same key yields the same phase
/// vector on every run and platform.
#[derive(Clone, Copy, Debug)]
pub struct PhaseKey<'a> {
    key: &'a str,
    period: f64,
}

impl<'a> PhaseKey<'a> {
    /// Key with the default period of `2π`.
    pub fn new(key: &'a str) -> Self {
        Self { key, period: TAU }
    }

    pub fn with_period(mut self, period: f64) -> Self {
        self.period = period;
        self
    }

    pub fn key(&self) -> &str {
        self.key
    }

    fn seed(&self) -> u64 {
        let hash = Sha256::digest(self.key.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&hash[0..8]);
        u64::from_le_bytes(head)
    }
}

impl<'a> From<&'a str> for PhaseKey<'a> {
    fn from(key: &'a str) -> Self {
        Self::new(key)
    }
}

impl<'a> From<&'a String> for PhaseKey<'a> {
    fn from(key: &'a String) -> Self {
        Self::new(key.as_str())
    }
}

impl MemoryVector for PhaseKey<'_> {
    fn to_memory_vector(&self, dimensions: usize) -> Result<Vec<f64>> {
        if !(self.period.is_finite() && self.period > 0.0) {
            return Err(MemoryError::InvalidConfig(format!(
                "phase period must be positive, got {}",
                self.period
            )));
        }
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed());
        Ok((0..dimensions)
            .map(|_| rng.gen_range(0.0..self.period))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_exact_length() {
        let v: [f64; 3] = [1.0, 2.0, 3.0];
        assert_eq!(v.to_memory_vector(3).unwrap(), vec![1.0, 2.0, 3.0]);
        match v.to_memory_vector(4) {
            Err(MemoryError::DimensionMismatch { expected, got }) => {
                assert_eq!((expected, got), (4, 3));
            }
            other => panic!("expected DimensionMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_non_finite_rejected() {
        let v = vec![0.0, f64::NAN];
        assert!(matches!(
            v.to_memory_vector(2),
            Err(MemoryError::NonFinite { .. })
        ));
        assert!(f64::INFINITY.to_memory_vector(2).is_err());
    }

    #[test]
    fn test_scalar_broadcast() {
        assert_eq!(0.5f64.to_memory_vector(3).unwrap(), vec![0.5; 3]);
    }

    #[test]
    fn test_phase_key_deterministic_and_in_range() {
        let a = PhaseKey::new("spindle").to_memory_vector(8).unwrap();
        let b = PhaseKey::from("spindle").to_memory_vector(8).unwrap();
        assert_eq!(a, b);
        assert!(a.iter().all(|&p| (0.0..TAU).contains(&p)), "{:?}", a);

        let c = PhaseKey::new("chuck").to_memory_vector(8).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_phase_key_custom_period() {
        let v = PhaseKey::new("x").with_period(1.0).to_memory_vector(16).unwrap();
        assert!(v.iter().all(|&p| (0.0..1.0).contains(&p)));
        assert!(PhaseKey::new("x").with_period(0.0).to_memory_vector(2).is_err());
    }
}
