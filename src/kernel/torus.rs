//! Torus geometry for phase vectors.
//!
//! Every phase component is periodic, so a phase vector is a point on an
//! n-torus. Distances must respect the wrap: two phases just either side of
//! the seam are close, not `period` apart.
//!
//! # Example
//!
//! ```rust
//! use grid_memory::kernel::TorusMetric;
//! use std::f64::consts::TAU;
//!
//! let torus = TorusMetric::default();
//! let d = torus.distance(&[0.0], &[TAU - 0.01]);
//! assert!((d - 0.01).abs() < 1e-9);
//! ```

use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// Distance and kernel math on an n-torus with a common period.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TorusMetric {
    period: f64,
}

impl TorusMetric {
    /// Create a metric for components with the given period.
    pub fn new(period: f64) -> Self {
        Self { period }
    }

    pub fn period(&self) -> f64 {
        self.period
    }

    /// Wrap a single component into `[0, period)`.
    #[inline]
    pub fn wrap(&self, x: f64) -> f64 {
        let w = x.rem_euclid(self.period);
        // rem_euclid can round up to exactly `period` for tiny negative inputs
        if w >= self.period {
            0.0
        } else {
            w
        }
    }

    /// Shortest signed-free separation of two components: `min(|Δ|, period - |Δ|)`.
    #[inline]
    pub fn component_distance(&self, a: f64, b: f64) -> f64 {
        let d = (a - b).rem_euclid(self.period);
        d.min(self.period - d)
    }

    /// Torus distance: per-dimension wrapped separation, then the Euclidean norm.
    ///
    /// Compares the common prefix if lengths differ; callers validate lengths.
    pub fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        a.iter()
            .zip(b)
            .map(|(&x, &y)| {
                let d = self.component_distance(x, y);
                d * d
            })
            .sum::<f64>()
            .sqrt()
    }

    /// Gaussian place-field activation: `exp(-d² / 2σ²)`, in `(0, 1]`.
    pub fn activation(&self, phase: &[f64], center: &[f64], sigma: f64) -> f64 {
        let d = self.distance(phase, center);
        gaussian(d, sigma)
    }

    /// The copy of `b` (shifted by whole periods) closest to `a`.
    ///
    /// Linear blends of two nearby phases are only meaningful once they sit
    /// on the same side of the seam.
    pub fn unwrap_near(&self, a: f64, b: f64) -> f64 {
        let half = self.period / 2.0;
        let mut d = b - a;
        d = (d + half).rem_euclid(self.period) - half;
        a + d
    }

    /// Mean of nearby phase vectors, unwrapped around the first one and
    /// wrapped back into `[0, period)`. `None` for an empty set.
    pub fn mean_near<'a, I>(&self, phases: I) -> Option<Vec<f64>>
    where
        I: IntoIterator<Item = &'a [f64]>,
    {
        let mut iter = phases.into_iter();
        let anchor = iter.next()?;
        let mut sums = anchor.to_vec();
        let mut count = 1usize;
        for p in iter {
            for ((s, &a), &x) in sums.iter_mut().zip(anchor).zip(p) {
                *s += self.unwrap_near(a, x);
            }
            count += 1;
        }
        Some(sums.into_iter().map(|s| self.wrap(s / count as f64)).collect())
    }
}

impl Default for TorusMetric {
    fn default() -> Self {
        Self::new(TAU)
    }
}

/// Gaussian kernel of a distance: `exp(-d² / 2σ²)`.
#[inline]
pub fn gaussian(distance: f64, sigma: f64) -> f64 {
    (-(distance * distance) / (2.0 * sigma * sigma)).exp()
}
