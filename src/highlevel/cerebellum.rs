//! Cerebellum: fast corrective blend on top of the learned memory.
//!
//! Each call turns the live tracking error into one correction vector made
//! of four terms:
//!
//! - **feedforward**: `-k_ff · (e + v·h + ½·a·h²)`, the error predicted one
//!   horizon `h` ahead;
//! - **trial**: `-k_trial · (e - m)`, the part of the error the memory `m`
//!   does not already explain;
//! - **variance**: `-k_var · (e - ē)`, where `ē` is the mean of the recent
//!   error window, damping components faster than the window;
//! - **memory**: `-k_mem · m`, cancelling the learned bias.
//!
//! The sum is scaled by `correction_weight`. All terms live in the error
//! frame (`e = target - current`), so the controller applies the result as
//! `reference = target - correction.total`.
//!
//! Missing velocity or acceleration is estimated by backward differences;
//! a missing memory contributes zero.

use super::universal::UniversalMemory;
use crate::config::CerebellumConfig;
use crate::error::{check_vector, MemoryError, Result};
use crate::kernel::accumulator::WindowAccumulator;
use crate::kernel::vector::{add, scaled, sub, zeros};
use crate::kernel::Context;
use serde::{Deserialize, Serialize};

/// Inputs for one correction step.
#[derive(Clone, Copy, Debug)]
pub struct Observation<'a> {
    pub current: &'a [f64],
    pub target: &'a [f64],
    pub velocity: Option<&'a [f64]>,
    pub acceleration: Option<&'a [f64]>,
    /// Phase key for the memory lookup; `current` when `None`
    pub memory_query: Option<&'a [f64]>,
    /// Seconds since the previous call
    pub dt: f64,
}

impl<'a> Observation<'a> {
    pub fn new(current: &'a [f64], target: &'a [f64], dt: f64) -> Self {
        Self {
            current,
            target,
            velocity: None,
            acceleration: None,
            memory_query: None,
            dt,
        }
    }

    pub fn with_velocity(mut self, velocity: &'a [f64]) -> Self {
        self.velocity = Some(velocity);
        self
    }

    pub fn with_acceleration(mut self, acceleration: &'a [f64]) -> Self {
        self.acceleration = Some(acceleration);
        self
    }

    pub fn with_memory_query(mut self, query: &'a [f64]) -> Self {
        self.memory_query = Some(query);
        self
    }
}

/// A correction and its parts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub total: Vec<f64>,
    pub feedforward: Vec<f64>,
    pub trial: Vec<f64>,
    pub variance: Vec<f64>,
    pub memory: Vec<f64>,
    /// `target - current` for this step
    pub error: Vec<f64>,
    /// Bias retrieved from memory (zero without one)
    pub memory_bias: Vec<f64>,
}

#[derive(Clone, Debug)]
pub struct CerebellumEngine {
    dimensions: usize,
    config: CerebellumConfig,
    errors: WindowAccumulator,
    last_state: Option<Vec<f64>>,
    last_velocity: Option<Vec<f64>>,
}

impl CerebellumEngine {
    pub fn new(dimensions: usize, config: &CerebellumConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            dimensions,
            config: config.clone(),
            errors: WindowAccumulator::new(dimensions, config.variance_window),
            last_state: None,
            last_velocity: None,
        })
    }

    pub fn config(&self) -> &CerebellumConfig {
        &self.config
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Errors currently in the averaging window.
    pub fn window_len(&self) -> usize {
        self.errors.len()
    }

    /// Compute the correction for one control step.
    pub fn compute_correction(
        &mut self,
        observation: &Observation<'_>,
        memory: Option<&UniversalMemory>,
        context: Option<&Context>,
    ) -> Result<Correction> {
        let dim = self.dimensions;
        check_vector(observation.current, dim, "current state")?;
        check_vector(observation.target, dim, "target state")?;
        let dt = observation.dt;
        if !(dt.is_finite() && dt > 0.0) {
            return Err(MemoryError::InvalidConfig(format!(
                "dt must be positive, got {}",
                dt
            )));
        }

        let error = sub(observation.target, observation.current);

        let velocity = match observation.velocity {
            Some(v) => {
                check_vector(v, dim, "velocity")?;
                v.to_vec()
            }
            None => match &self.last_state {
                Some(prev) => scaled(&sub(observation.current, prev), 1.0 / dt),
                None => zeros(dim),
            },
        };
        let acceleration = match observation.acceleration {
            Some(a) => {
                check_vector(a, dim, "acceleration")?;
                a.to_vec()
            }
            None => match &self.last_velocity {
                Some(prev) => scaled(&sub(&velocity, prev), 1.0 / dt),
                None => zeros(dim),
            },
        };

        let memory_bias = match memory {
            Some(m) => {
                let query = observation.memory_query.unwrap_or(observation.current);
                m.memory_bias(query, context)?
            }
            None => zeros(dim),
        };

        // Inputs are valid; commit state
        self.errors.push(&error);
        self.last_state = Some(observation.current.to_vec());
        self.last_velocity = Some(velocity.clone());

        let c = &self.config;
        let h = c.prediction_horizon;
        let predicted: Vec<f64> = error
            .iter()
            .zip(&velocity)
            .zip(&acceleration)
            .map(|((e, v), a)| e + v * h + 0.5 * a * h * h)
            .collect();
        let feedforward = scaled(&predicted, -c.feedforward_gain);
        let trial = scaled(&sub(&error, &memory_bias), -c.trial_gain);
        let filtered = self.errors.mean();
        let variance = scaled(&sub(&error, &filtered), -c.variance_gain);
        let memory_term = scaled(&memory_bias, -c.memory_gain);

        let sum = add(&add(&feedforward, &trial), &add(&variance, &memory_term));
        let total = scaled(&sum, c.correction_weight);

        log::trace!("correction |total|={:.3e}", crate::kernel::vector::norm(&total));
        Ok(Correction {
            total,
            feedforward,
            trial,
            variance,
            memory: memory_term,
            error,
            memory_bias,
        })
    }

    /// Forget the error window and the finite-difference history.
    pub fn reset(&mut self) {
        self.errors.clear();
        self.last_state = None;
        self.last_velocity = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;

    fn engine() -> CerebellumEngine {
        CerebellumEngine::new(2, &CerebellumConfig::default()).unwrap()
    }

    fn close(a: &[f64], b: &[f64]) -> bool {
        a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-12)
    }

    #[test]
    fn test_first_step_terms() {
        let mut e = engine();
        let obs = Observation::new(&[0.0, 0.0], &[1.0, 0.0], 0.01);
        let c = e.compute_correction(&obs, None, None).unwrap();
        // v = a = 0, memory = 0, window holds only this error
        assert!(close(&c.feedforward, &[-0.5, 0.0]), "{:?}", c.feedforward);
        assert!(close(&c.trial, &[-0.3, 0.0]));
        assert!(close(&c.variance, &[0.0, 0.0]));
        assert!(close(&c.memory, &[0.0, 0.0]));
        assert!(close(&c.total, &[-0.8, 0.0]), "{:?}", c.total);
    }

    #[test]
    fn test_finite_difference_velocity() {
        let mut e = engine();
        let target = [0.0, 0.0];
        e.compute_correction(&Observation::new(&[0.0, 0.0], &target, 0.5), None, None)
            .unwrap();
        let c = e
            .compute_correction(&Observation::new(&[1.0, 0.0], &target, 0.5), None, None)
            .unwrap();
        // v = 2.0, a = 4.0 (previous velocity 0), h = 0.01
        let expected_pred = -1.0 + 2.0 * 0.01 + 0.5 * 4.0 * 0.0001;
        assert!((c.feedforward[0] - (-0.5 * expected_pred)).abs() < 1e-12);
    }

    #[test]
    fn test_variance_term_uses_window_mean() {
        let mut e = engine();
        let target = [0.0, 0.0];
        let zero = [0.0, 0.0];
        e.compute_correction(
            &Observation::new(&[0.0, 0.0], &target, 1.0)
                .with_velocity(&zero)
                .with_acceleration(&zero),
            None,
            None,
        )
        .unwrap();
        let c = e
            .compute_correction(
                &Observation::new(&[-2.0, 0.0], &target, 1.0)
                    .with_velocity(&zero)
                    .with_acceleration(&zero),
                None,
                None,
            )
            .unwrap();
        // errors: 0 then 2, mean 1 → variance term -0.2 * (2 - 1)
        assert!((c.variance[0] + 0.2).abs() < 1e-12, "{:?}", c.variance);
    }

    #[test]
    fn test_memory_terms() {
        let mut memory = UniversalMemory::new(MemoryConfig::with_dimensions(2)).unwrap();
        let key = [1.0, 1.0];
        for t in 0..6 {
            memory.store(&key, &[0.4, 0.0], None, Some(t as f64)).unwrap();
        }
        memory.replay(None).unwrap();

        let mut e = engine();
        let obs = Observation::new(&[0.0, 0.0], &[0.4, 0.0], 0.01).with_memory_query(&key);
        let c = e.compute_correction(&obs, Some(&memory), None).unwrap();
        assert!((c.memory_bias[0] - 0.4).abs() < 1e-9);
        // Error fully explained by memory: no trial correction
        assert!(c.trial[0].abs() < 1e-9, "{:?}", c.trial);
        assert!((c.memory[0] + 0.16).abs() < 1e-9);
    }

    #[test]
    fn test_missing_memory_is_zero() {
        let memory = UniversalMemory::new(MemoryConfig::with_dimensions(2)).unwrap();
        let mut e = engine();
        let obs = Observation::new(&[0.0, 0.0], &[0.1, 0.0], 0.01);
        let c = e.compute_correction(&obs, Some(&memory), None).unwrap();
        assert_eq!(c.memory_bias, vec![0.0, 0.0]);
    }

    #[test]
    fn test_invalid_inputs() {
        let mut e = engine();
        assert!(e
            .compute_correction(&Observation::new(&[0.0], &[0.0, 0.0], 0.01), None, None)
            .is_err());
        assert!(e
            .compute_correction(&Observation::new(&[0.0, 0.0], &[0.0, 0.0], 0.0), None, None)
            .is_err());
        // Rejected calls leave no trace
        assert_eq!(e.window_len(), 0);
    }

    #[test]
    fn test_reset() {
        let mut e = engine();
        e.compute_correction(&Observation::new(&[0.0, 0.0], &[1.0, 1.0], 0.01), None, None)
            .unwrap();
        e.reset();
        assert_eq!(e.window_len(), 0);
        // No previous state: velocity estimate is zero again
        let c = e
            .compute_correction(&Observation::new(&[5.0, 5.0], &[5.0, 5.0], 0.01), None, None)
            .unwrap();
        assert!(close(&c.feedforward, &[0.0, 0.0]));
    }
}
