//! Place Index: deterministic phase vector → place mapping.
//!
//! A place is a quantized cell of phase space. Each wrapped component is
//! scaled onto an integer grid of `quantization_level` cells per period, the
//! integer tuple is hashed with SHA-256, and the hash is reduced modulo
//! `num_places`.
//!
//! Distinct cells can share a place id. That aliasing is accepted: it bounds
//! memory at `num_places` records in exchange for occasional sharing.

use super::torus::TorusMetric;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Identifier of a place, in `[0, num_places)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlaceId(pub u64);

impl fmt::Display for PlaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "place#{}", self.0)
    }
}

/// Maps phase vectors to place ids.
#[derive(Clone, Debug)]
pub struct PlaceIndex {
    num_places: u64,
    quantization_level: u32,
    torus: TorusMetric,
}

impl PlaceIndex {
    pub fn new(num_places: u64, quantization_level: u32, torus: TorusMetric) -> Self {
        Self {
            num_places,
            quantization_level,
            torus,
        }
    }

    pub fn num_places(&self) -> u64 {
        self.num_places
    }

    pub fn quantization_level(&self) -> u32 {
        self.quantization_level
    }

    pub fn torus(&self) -> &TorusMetric {
        &self.torus
    }

    /// Quantize a phase vector onto the integer grid.
    pub fn cell(&self, phase: &[f64]) -> Vec<i64> {
        let q = self.quantization_level as f64;
        let period = self.torus.period();
        phase
            .iter()
            .map(|&p| {
                let cell = (self.torus.wrap(p) * q / period).floor() as i64;
                // wrap() < period, but float scaling can still land on q
                cell.min(self.quantization_level as i64 - 1)
            })
            .collect()
    }

    /// Place id of a phase vector. Pure and deterministic.
    pub fn place_id(&self, phase: &[f64]) -> PlaceId {
        let cell = self.cell(phase);
        let mut hasher = Sha256::new();
        hasher.update((cell.len() as u64).to_le_bytes());
        for c in &cell {
            hasher.update(c.to_le_bytes());
        }
        let hash = hasher.finalize();

        let mut head = [0u8; 8];
        head.copy_from_slice(&hash[0..8]);
        PlaceId(u64::from_le_bytes(head) % self.num_places)
    }
}
