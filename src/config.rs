//! Configuration for every component of the memory.
//!
//! Each struct carries its own defaults and accepts partial JSON (missing
//! fields fall back to the default). Constructors that take a config call
//! `validate()` first, so an invalid value is reported once, up front.
//!
//! ```rust
//! use grid_memory::config::MemoryConfig;
//!
//! let config = MemoryConfig::from_json(r#"{"dimensions": 3, "retrieval": {"top_k": 8}}"#).unwrap();
//! assert_eq!(config.dimensions, 3);
//! assert_eq!(config.retrieval.top_k, 8);
//! assert_eq!(config.retrieval.sigma, 0.5);
//! ```

use crate::error::{MemoryError, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

fn invalid(msg: impl Into<String>) -> MemoryError {
    MemoryError::InvalidConfig(msg.into())
}

fn require_positive(name: &str, v: f64) -> Result<()> {
    if v.is_finite() && v > 0.0 {
        Ok(())
    } else {
        Err(invalid(format!("{} must be positive, got {}", name, v)))
    }
}

fn require_non_negative(name: &str, v: f64) -> Result<()> {
    if v.is_finite() && v >= 0.0 {
        Ok(())
    } else {
        Err(invalid(format!("{} must be non-negative, got {}", name, v)))
    }
}

fn require_rate(name: &str, v: f64) -> Result<()> {
    if v.is_finite() && v > 0.0 && v <= 1.0 {
        Ok(())
    } else {
        Err(invalid(format!("{} must be in (0, 1], got {}", name, v)))
    }
}

// =============================================================================
// Place memory
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaceConfig {
    /// Size of the place id space (ids are reduced modulo this)
    pub num_places: u64,
    /// Period of every phase component
    pub phase_period: f64,
    /// Grid cells per period used when quantizing a phase
    pub quantization_level: u32,
    /// Bias samples kept per place
    pub history_len: usize,
    /// EMA rate for bias updates
    pub learning_rate: f64,
    /// EMA rate for the place center (slower than the bias)
    pub center_rate: f64,
    /// Place field width used by `activation`
    pub field_sigma: f64,
    /// Center distance under which housekeeping merges two places
    pub merge_threshold: f64,
}

impl Default for PlaceConfig {
    fn default() -> Self {
        Self {
            num_places: 1000,
            phase_period: TAU,
            quantization_level: 100,
            history_len: 10,
            learning_rate: 0.1,
            center_rate: 0.05,
            field_sigma: 0.1,
            merge_threshold: 0.1,
        }
    }
}

impl PlaceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_places == 0 {
            return Err(invalid("place.num_places must be at least 1"));
        }
        if self.quantization_level == 0 {
            return Err(invalid("place.quantization_level must be at least 1"));
        }
        if self.history_len == 0 {
            return Err(invalid("place.history_len must be at least 1"));
        }
        require_positive("place.phase_period", self.phase_period)?;
        require_rate("place.learning_rate", self.learning_rate)?;
        require_rate("place.center_rate", self.center_rate)?;
        require_positive("place.field_sigma", self.field_sigma)?;
        require_non_negative("place.merge_threshold", self.merge_threshold)
    }
}

// =============================================================================
// Context memory
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContextConfig {
    /// Size of the context id space
    pub num_contexts: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            num_contexts: 10_000,
        }
    }
}

impl ContextConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_contexts == 0 {
            return Err(invalid("context.num_contexts must be at least 1"));
        }
        Ok(())
    }
}

// =============================================================================
// Learning gate
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LearningGateConfig {
    pub velocity_threshold: f64,
    pub acceleration_threshold: f64,
    /// Number of recent states the variance check looks at
    pub variance_window: usize,
    /// Limit on the norm of the per-dimension state variance
    pub variance_threshold: f64,
    pub min_visit_count: u64,
    /// Forbid learning outside the replay phase
    pub replay_only: bool,
}

impl Default for LearningGateConfig {
    fn default() -> Self {
        Self {
            velocity_threshold: 0.01,
            acceleration_threshold: 0.001,
            variance_window: 10,
            variance_threshold: 1e-4,
            min_visit_count: 3,
            replay_only: true,
        }
    }
}

impl LearningGateConfig {
    pub fn validate(&self) -> Result<()> {
        require_non_negative("gate.velocity_threshold", self.velocity_threshold)?;
        require_non_negative("gate.acceleration_threshold", self.acceleration_threshold)?;
        require_non_negative("gate.variance_threshold", self.variance_threshold)?;
        if self.variance_window == 0 {
            return Err(invalid("gate.variance_window must be at least 1"));
        }
        Ok(())
    }
}

// =============================================================================
// Replay buffer
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReplayConfig {
    /// Buffer capacity; the oldest point is evicted beyond this
    pub max_size: usize,
    /// Stability limit on ‖velocity‖ for segment extraction
    pub velocity_threshold: f64,
    /// Stability limit on ‖acceleration‖ for segment extraction
    pub acceleration_threshold: f64,
    pub min_segment_length: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            max_size: 10_000,
            velocity_threshold: 0.01,
            acceleration_threshold: 0.001,
            min_segment_length: 5,
        }
    }
}

impl ReplayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(invalid("replay.max_size must be at least 1"));
        }
        if self.min_segment_length == 0 {
            return Err(invalid("replay.min_segment_length must be at least 1"));
        }
        require_non_negative("replay.velocity_threshold", self.velocity_threshold)?;
        require_non_negative("replay.acceleration_threshold", self.acceleration_threshold)
    }
}

// =============================================================================
// Consolidation
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConsolidationConfig {
    /// Idle gap (seconds) after which a replay pass may run
    pub replay_threshold: f64,
    /// History samples needed before a place can consolidate
    pub consolidation_window: usize,
    /// Every per-dimension std must be below this to consolidate
    pub significance_threshold: f64,
    /// Points a place/context group needs to produce an update
    pub min_group_points: usize,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            replay_threshold: 5.0,
            consolidation_window: 10,
            significance_threshold: 0.001,
            min_group_points: 3,
        }
    }
}

impl ConsolidationConfig {
    pub fn validate(&self) -> Result<()> {
        require_non_negative("consolidation.replay_threshold", self.replay_threshold)?;
        require_positive(
            "consolidation.significance_threshold",
            self.significance_threshold,
        )?;
        if self.consolidation_window == 0 {
            return Err(invalid("consolidation.consolidation_window must be at least 1"));
        }
        if self.min_group_points == 0 {
            return Err(invalid("consolidation.min_group_points must be at least 1"));
        }
        Ok(())
    }
}

// =============================================================================
// Retrieval
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Nearest places blended per query
    pub top_k: usize,
    /// Gaussian width of the blending kernel
    pub sigma: f64,
    /// Visits at which a memory reaches full confidence
    pub confidence_saturation: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            sigma: 0.5,
            confidence_saturation: 10.0,
        }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(invalid("retrieval.top_k must be at least 1"));
        }
        require_positive("retrieval.sigma", self.sigma)?;
        require_positive("retrieval.confidence_saturation", self.confidence_saturation)
    }
}

// =============================================================================
// Cerebellum
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CerebellumConfig {
    pub feedforward_gain: f64,
    /// Look-ahead (seconds) for the predicted error
    pub prediction_horizon: f64,
    pub trial_gain: f64,
    pub variance_gain: f64,
    /// Recent errors averaged into the filtered error
    pub variance_window: usize,
    pub memory_gain: f64,
    /// Scale applied to the summed terms
    pub correction_weight: f64,
}

impl Default for CerebellumConfig {
    fn default() -> Self {
        Self {
            feedforward_gain: 0.5,
            prediction_horizon: 0.01,
            trial_gain: 0.3,
            variance_gain: 0.2,
            variance_window: 5,
            memory_gain: 0.4,
            correction_weight: 1.0,
        }
    }
}

impl CerebellumConfig {
    pub fn validate(&self) -> Result<()> {
        require_non_negative("cerebellum.feedforward_gain", self.feedforward_gain)?;
        require_non_negative("cerebellum.prediction_horizon", self.prediction_horizon)?;
        require_non_negative("cerebellum.trial_gain", self.trial_gain)?;
        require_non_negative("cerebellum.variance_gain", self.variance_gain)?;
        require_non_negative("cerebellum.memory_gain", self.memory_gain)?;
        require_non_negative("cerebellum.correction_weight", self.correction_weight)?;
        if self.variance_window == 0 {
            return Err(invalid("cerebellum.variance_window must be at least 1"));
        }
        Ok(())
    }
}

// =============================================================================
// Aggregate
// =============================================================================

/// Everything a [`UniversalMemory`](crate::highlevel::UniversalMemory) needs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemoryConfig {
    /// Dimension of every key, value and state vector
    pub dimensions: usize,
    pub place: PlaceConfig,
    pub context: ContextConfig,
    pub gate: LearningGateConfig,
    pub replay: ReplayConfig,
    pub consolidation: ConsolidationConfig,
    pub retrieval: RetrievalConfig,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            dimensions: 5,
            place: PlaceConfig::default(),
            context: ContextConfig::default(),
            gate: LearningGateConfig::default(),
            replay: ReplayConfig::default(),
            // The facade replays on short idle gaps and promotes after a few
            // consistent passes.
            consolidation: ConsolidationConfig {
                replay_threshold: 1.0,
                consolidation_window: 3,
                significance_threshold: 0.1,
                ..ConsolidationConfig::default()
            },
            retrieval: RetrievalConfig::default(),
        }
    }
}

impl MemoryConfig {
    /// Default configuration for a given dimension.
    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            dimensions,
            ..Self::default()
        }
    }

    /// Parse a (possibly partial) JSON document and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dimensions == 0 {
            return Err(invalid("dimensions must be at least 1"));
        }
        self.place.validate()?;
        self.context.validate()?;
        self.gate.validate()?;
        self.replay.validate()?;
        self.consolidation.validate()?;
        self.retrieval.validate()?;
        if self.consolidation.consolidation_window > self.place.history_len {
            return Err(invalid(format!(
                "consolidation.consolidation_window ({}) exceeds place.history_len ({})",
                self.consolidation.consolidation_window, self.place.history_len
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(MemoryConfig::default().validate().is_ok());
        assert!(CerebellumConfig::default().validate().is_ok());
        assert!(ConsolidationConfig::default().validate().is_ok());
    }

    #[test]
    fn test_facade_consolidation_tuning() {
        let c = MemoryConfig::default();
        assert_eq!(c.consolidation.replay_threshold, 1.0);
        assert_eq!(c.consolidation.consolidation_window, 3);
        assert_eq!(c.consolidation.significance_threshold, 0.1);
        assert_eq!(c.consolidation.min_group_points, 3);
        assert_eq!(ConsolidationConfig::default().replay_threshold, 5.0);
    }

    #[test]
    fn test_partial_json() {
        let c = MemoryConfig::from_json(r#"{"gate": {"replay_only": false}}"#).unwrap();
        assert!(!c.gate.replay_only);
        assert_eq!(c.gate.min_visit_count, 3);
        assert_eq!(c.dimensions, 5);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut c = MemoryConfig::default();
        c.place.learning_rate = 1.5;
        assert!(matches!(c.validate(), Err(MemoryError::InvalidConfig(_))));

        let mut c = MemoryConfig::default();
        c.consolidation.consolidation_window = 50;
        assert!(c.validate().is_err());

        assert!(MemoryConfig::from_json(r#"{"dimensions": 0}"#).is_err());
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(
            MemoryConfig::from_json("{not json"),
            Err(MemoryError::JsonParse(_))
        ));
    }
}
