//! Accumulator: bounded-window, per-dimension statistics.
//!
//! Several parts of the memory need "the last N vectors" and their moments:
//! the learning gate (variance of recent states), the cerebellum (moving
//! average of recent errors) and the consolidator (spread of recent bias
//! samples). [`WindowAccumulator`] keeps the window; [`mean_of`] and
//! [`std_of`] compute the same moments over any borrowed sample set.
//!
//! Variance is the population variance (divide by `n`), matching how the
//! consolidation significance test has always been calibrated.

use std::collections::VecDeque;

/// A fixed-capacity FIFO of vectors with per-dimension moments.
///
/// Pushing into a full window evicts the oldest sample.
#[derive(Clone, Debug)]
pub struct WindowAccumulator {
    dimensions: usize,
    capacity: usize,
    samples: VecDeque<Vec<f64>>,
}

impl WindowAccumulator {
    /// Create an empty window. A capacity of 0 is treated as 1.
    pub fn new(dimensions: usize, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            dimensions,
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.capacity
    }

    /// Add a sample, evicting the oldest if the window is full.
    ///
    /// # Panics
    /// Panics if `sample.len() != self.dimensions()`.
    pub fn push(&mut self, sample: &[f64]) {
        assert_eq!(
            sample.len(),
            self.dimensions,
            "Dimension mismatch in accumulator"
        );
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample.to_vec());
    }

    /// Per-dimension mean, or zeros when empty.
    pub fn mean(&self) -> Vec<f64> {
        mean_of(self.samples.iter().map(|s| s.as_slice()), self.dimensions)
    }

    /// Per-dimension population variance, or zeros when empty.
    pub fn variance(&self) -> Vec<f64> {
        variance_of(self.samples.iter().map(|s| s.as_slice()), self.dimensions)
    }

    /// Iterate samples oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &[f64]> {
        self.samples.iter().map(|s| s.as_slice())
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Per-dimension mean of a sample set; zeros when the set is empty.
pub fn mean_of<'a, I>(samples: I, dimensions: usize) -> Vec<f64>
where
    I: IntoIterator<Item = &'a [f64]>,
{
    let mut sums = vec![0.0; dimensions];
    let mut count = 0usize;
    for s in samples {
        for (acc, v) in sums.iter_mut().zip(s) {
            *acc += v;
        }
        count += 1;
    }
    if count == 0 {
        return sums;
    }
    let n = count as f64;
    sums.iter_mut().for_each(|v| *v /= n);
    sums
}

/// Per-dimension population variance; zeros when the set is empty.
pub fn variance_of<'a, I>(samples: I, dimensions: usize) -> Vec<f64>
where
    I: IntoIterator<Item = &'a [f64]> + Clone,
{
    let mean = mean_of(samples.clone(), dimensions);
    let mut sq = vec![0.0; dimensions];
    let mut count = 0usize;
    for s in samples {
        for ((acc, v), m) in sq.iter_mut().zip(s).zip(&mean) {
            let d = v - m;
            *acc += d * d;
        }
        count += 1;
    }
    if count == 0 {
        return sq;
    }
    let n = count as f64;
    sq.iter_mut().for_each(|v| *v /= n);
    sq
}

/// Per-dimension population standard deviation.
pub fn std_of<'a, I>(samples: I, dimensions: usize) -> Vec<f64>
where
    I: IntoIterator<Item = &'a [f64]> + Clone,
{
    variance_of(samples, dimensions)
        .into_iter()
        .map(f64::sqrt)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_eviction() {
        let mut acc = WindowAccumulator::new(2, 3);
        for i in 0..5 {
            acc.push(&[i as f64, 0.0]);
        }
        assert_eq!(acc.len(), 3);
        assert!(acc.is_full());
        // Window holds 2, 3, 4
        assert_eq!(acc.mean(), vec![3.0, 0.0]);
    }

    #[test]
    fn test_variance_population() {
        let mut acc = WindowAccumulator::new(1, 4);
        for v in [1.0, 2.0, 3.0, 4.0] {
            acc.push(&[v]);
        }
        // mean 2.5, population variance 1.25
        assert!((acc.variance()[0] - 1.25).abs() < 1e-12);
    }

    #[test]
    fn test_empty_moments_are_zero() {
        let acc = WindowAccumulator::new(3, 5);
        assert_eq!(acc.mean(), vec![0.0; 3]);
        assert_eq!(acc.variance(), vec![0.0; 3]);
    }

    #[test]
    fn test_free_functions_match_window() {
        let data = vec![vec![1.0, -1.0], vec![3.0, 1.0]];
        let refs: Vec<&[f64]> = data.iter().map(|v| v.as_slice()).collect();
        assert_eq!(mean_of(refs.iter().copied(), 2), vec![2.0, 0.0]);
        assert_eq!(std_of(refs.iter().copied(), 2), vec![1.0, 1.0]);
    }

    #[test]
    fn test_clear() {
        let mut acc = WindowAccumulator::new(1, 2);
        acc.push(&[1.0]);
        acc.clear();
        assert!(acc.is_empty());
    }
}
