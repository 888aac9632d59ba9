//! Dense `f64` vector helpers.
//!
//! Biases, states and phase vectors are plain `Vec<f64>` / `&[f64]`; these
//! helpers keep the arithmetic in one place. All binary operations assume
//! equal lengths, which callers establish at the API boundary.

/// A zero vector of given dimensionality.
pub fn zeros(dimensions: usize) -> Vec<f64> {
    vec![0.0; dimensions]
}

/// L2 norm.
#[inline]
pub fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// `a - b`
pub fn sub(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| x - y).collect()
}

/// `a + b`
pub fn add(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| x + y).collect()
}

/// `k * v`
pub fn scaled(v: &[f64], k: f64) -> Vec<f64> {
    v.iter().map(|x| x * k).collect()
}

/// Exponential moving average in place: `acc = rate * sample + (1 - rate) * acc`.
pub fn ema(acc: &mut [f64], sample: &[f64], rate: f64) {
    for (a, s) in acc.iter_mut().zip(sample) {
        *a = rate * s + (1.0 - rate) * *a;
    }
}

/// Weighted average of two vectors with weights `w1`, `w2` (assumed to sum to 1).
pub fn weighted_pair(a: &[f64], w1: f64, b: &[f64], w2: f64) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| w1 * x + w2 * y).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_norm() {
        assert!((norm(&[3.0, 4.0]) - 5.0).abs() < 1e-12);
        assert_eq!(norm(&zeros(7)), 0.0);
    }

    #[test]
    fn test_ema() {
        let mut acc = vec![1.0, 0.0];
        ema(&mut acc, &[0.0, 1.0], 0.25);
        assert!((acc[0] - 0.75).abs() < 1e-12);
        assert!((acc[1] - 0.25).abs() < 1e-12);
    }
}
