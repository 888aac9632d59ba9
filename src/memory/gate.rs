//! Learning gate: may this observation change long-term memory?
//!
//! Two explicit phases. During [`Phase::Online`] the controller is acting
//! and every observation is suspect, so with `replay_only` set the gate
//! refuses outright. During [`Phase::Replay`] an update must also come from
//! a settled system: low velocity, low acceleration, low variance over the
//! recent states, and a place visited often enough to trust.

use crate::config::LearningGateConfig;
use crate::error::{check_vector, Result};
use crate::kernel::accumulator::WindowAccumulator;
use crate::kernel::vector::norm;
use std::fmt;

/// Which half of the record/replay cycle the caller is in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Online,
    Replay,
}

/// Outcome of a gate check. Rejections carry the offending measurement.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GateVerdict {
    Accept,
    OnlinePhase,
    Velocity(f64),
    Acceleration(f64),
    Variance(f64),
    TooFewVisits(u64),
}

impl GateVerdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, GateVerdict::Accept)
    }
}

impl fmt::Display for GateVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateVerdict::Accept => write!(f, "accepted"),
            GateVerdict::OnlinePhase => write!(f, "learning is replay-only"),
            GateVerdict::Velocity(v) => write!(f, "velocity {:.3e} above threshold", v),
            GateVerdict::Acceleration(a) => write!(f, "acceleration {:.3e} above threshold", a),
            GateVerdict::Variance(v) => write!(f, "state variance {:.3e} above threshold", v),
            GateVerdict::TooFewVisits(n) => write!(f, "only {} visits", n),
        }
    }
}

#[derive(Clone, Debug)]
pub struct LearningGate {
    config: LearningGateConfig,
    states: WindowAccumulator,
}

impl LearningGate {
    pub fn new(dimensions: usize, config: &LearningGateConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: config.clone(),
            states: WindowAccumulator::new(dimensions, config.variance_window),
        })
    }

    pub fn config(&self) -> &LearningGateConfig {
        &self.config
    }

    /// Add a state to the variance window.
    pub fn record_state(&mut self, state: &[f64]) -> Result<()> {
        check_vector(state, self.states.dimensions(), "state")?;
        self.states.push(state);
        Ok(())
    }

    /// Record `state`, then decide whether learning is allowed.
    pub fn should_learn(
        &mut self,
        state: &[f64],
        velocity: &[f64],
        acceleration: &[f64],
        visit_count: u64,
        phase: Phase,
    ) -> Result<bool> {
        self.record_state(state)?;
        Ok(self.check(velocity, acceleration, visit_count, phase).is_accept())
    }

    /// Evaluate the gate against the states already recorded.
    ///
    /// The variance check applies only once the window is full.
    pub fn check(
        &self,
        velocity: &[f64],
        acceleration: &[f64],
        visit_count: u64,
        phase: Phase,
    ) -> GateVerdict {
        if self.config.replay_only && phase == Phase::Online {
            return GateVerdict::OnlinePhase;
        }

        let v = norm(velocity);
        if v > self.config.velocity_threshold {
            return GateVerdict::Velocity(v);
        }
        let a = norm(acceleration);
        if a > self.config.acceleration_threshold {
            return GateVerdict::Acceleration(a);
        }
        if self.states.is_full() {
            let variance = norm(&self.states.variance());
            if variance > self.config.variance_threshold {
                return GateVerdict::Variance(variance);
            }
        }
        if visit_count < self.config.min_visit_count {
            return GateVerdict::TooFewVisits(visit_count);
        }
        GateVerdict::Accept
    }

    /// Number of states currently in the variance window.
    pub fn window_len(&self) -> usize {
        self.states.len()
    }

    pub fn reset(&mut self) {
        self.states.clear();
    }
}
