//! Domain-agnostic facade over the memory layer.
//!
//! [`UniversalMemory`] owns every store and drives the record/replay cycle:
//! `store`/`observe` only append to the replay buffer, `replay` is the one
//! call that changes learned bias, and `retrieve`/`augment` read it back.
//!
//! Keys and values go through [`MemoryVector`], so a caller type of the
//! wrong size is a [`DimensionMismatch`](crate::MemoryError::DimensionMismatch),
//! not a silently padded vector.
//!
//! # Example
//!
//! ```rust
//! use grid_memory::highlevel::UniversalMemory;
//! use grid_memory::config::MemoryConfig;
//! use grid_memory::kernel::Context;
//! use serde_json::json;
//!
//! # fn main() -> grid_memory::Result<()> {
//! let mut memory = UniversalMemory::new(MemoryConfig::with_dimensions(3))?;
//! let mut tool_a = Context::new();
//! tool_a.insert("tool".into(), json!("A"));
//!
//! let key = [1.0, 2.0, 3.0];
//! for t in 0..5 {
//!     memory.store(&key, &[0.01, 0.0, 0.0], Some(&tool_a), Some(t as f64))?;
//! }
//! // Nothing is learned online
//! assert!(memory.retrieve(&key, None, None)?.is_empty());
//!
//! memory.replay(None)?;
//! let augmented = memory.augment(&key, Some(&tool_a))?;
//! assert_eq!(augmented.summary.total_memories, 2);
//! # Ok(())
//! # }
//! ```

use crate::config::MemoryConfig;
use crate::error::Result;
use crate::kernel::vector::zeros;
use crate::kernel::{Context, ContextId, MemoryVector, PlaceId};
use crate::memory::{
    BufferStats, ContextStats, ContextStore, Consolidator, LearningGate, PlaceStats, PlaceStore,
    ReplayBuffer, ReplayStats, Retrieval, TrajectoryPoint,
};
use crate::observer::{LogObserver, MemoryObserver};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Result types
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// Blended place-level bias
    Place,
    /// Bias learned for this place under the active context
    Context,
}

/// One retrieved memory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub kind: MemoryKind,
    pub place_id: PlaceId,
    pub context_id: Option<ContextId>,
    pub bias: Vec<f64>,
    pub visit_count: u64,
    /// `min(1, visit_count / confidence_saturation)`
    pub confidence: f64,
    pub consolidated: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_memories: usize,
    pub average_confidence: f64,
    /// Average confidence above 0.1
    pub has_memory: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Augmented {
    pub memories: Vec<Memory>,
    pub summary: Summary,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub places: PlaceStats,
    pub contexts: ContextStats,
    pub buffer: BufferStats,
    pub replay_passes: u64,
    pub consolidations: u64,
    pub active_context: Option<ContextId>,
}

/// Full kinematic state of one observation.
#[derive(Clone, Copy, Debug)]
pub struct Kinematics<'a> {
    pub current: &'a [f64],
    pub target: &'a [f64],
    pub velocity: &'a [f64],
    pub acceleration: &'a [f64],
}

// =============================================================================
// UniversalMemory
// =============================================================================

pub struct UniversalMemory {
    config: MemoryConfig,
    places: PlaceStore,
    contexts: ContextStore,
    gate: LearningGate,
    buffer: ReplayBuffer,
    consolidator: Consolidator,
    observer: Box<dyn MemoryObserver>,
    active_context: Option<ContextId>,
    /// Latest timestamp seen; the default for calls without one
    clock: f64,
    last_activity: Option<f64>,
}

impl fmt::Debug for UniversalMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniversalMemory")
            .field("dimensions", &self.config.dimensions)
            .field("places", &self.places.len())
            .field("contexts", &self.contexts.len())
            .field("buffered", &self.buffer.len())
            .field("active_context", &self.active_context)
            .finish_non_exhaustive()
    }
}

impl UniversalMemory {
    /// Build a memory from a validated config. Events go to [`LogObserver`].
    pub fn new(config: MemoryConfig) -> Result<Self> {
        config.validate()?;
        let dim = config.dimensions;
        Ok(Self {
            places: PlaceStore::new(dim, &config.place)?,
            contexts: ContextStore::new(dim, &config.context, config.place.learning_rate)?,
            gate: LearningGate::new(dim, &config.gate)?,
            buffer: ReplayBuffer::new(dim, &config.replay)?,
            consolidator: Consolidator::new(&config.consolidation)?,
            observer: Box::new(LogObserver),
            active_context: None,
            clock: 0.0,
            last_activity: None,
            config,
        })
    }

    pub fn with_observer(mut self, observer: Box<dyn MemoryObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn set_observer(&mut self, observer: Box<dyn MemoryObserver>) {
        self.observer = observer;
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    pub fn places(&self) -> &PlaceStore {
        &self.places
    }

    pub fn contexts(&self) -> &ContextStore {
        &self.contexts
    }

    pub fn buffer(&self) -> &ReplayBuffer {
        &self.buffer
    }

    pub fn gate(&self) -> &LearningGate {
        &self.gate
    }

    /// Context id in effect when a call supplies none.
    pub fn active_context(&self) -> Option<ContextId> {
        self.active_context
    }

    /// Replace the active context. An empty map clears it.
    pub fn set_context(&mut self, context: &Context) {
        self.active_context = self.contexts.index().resolve(context);
    }

    pub fn clear_context(&mut self) {
        self.active_context = None;
    }

    // =========================================================================
    // Online phase
    // =========================================================================

    /// Record that `value` is the bias observed at `key`.
    ///
    /// Online only: the point goes to the replay buffer and no record
    /// changes until [`replay`](Self::replay). A supplied context becomes
    /// the active one.
    pub fn store<K, V>(
        &mut self,
        key: &K,
        value: &V,
        context: Option<&Context>,
        timestamp: Option<f64>,
    ) -> Result<PlaceId>
    where
        K: MemoryVector + ?Sized,
        V: MemoryVector + ?Sized,
    {
        let dim = self.config.dimensions;
        let phase = key.to_memory_vector(dim)?;
        let value = value.to_memory_vector(dim)?;
        let still = zeros(dim);
        self.record(phase, zeros(dim), value, still.clone(), still, context, timestamp)
    }

    /// Record a full kinematic observation at `key`.
    pub fn observe<K>(
        &mut self,
        key: &K,
        kinematics: Kinematics<'_>,
        context: Option<&Context>,
        timestamp: Option<f64>,
    ) -> Result<PlaceId>
    where
        K: MemoryVector + ?Sized,
    {
        let dim = self.config.dimensions;
        let phase = key.to_memory_vector(dim)?;
        let current = kinematics.current.to_memory_vector(dim)?;
        let target = kinematics.target.to_memory_vector(dim)?;
        let velocity = kinematics.velocity.to_memory_vector(dim)?;
        let acceleration = kinematics.acceleration.to_memory_vector(dim)?;
        self.record(phase, current, target, velocity, acceleration, context, timestamp)
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &mut self,
        phase: Vec<f64>,
        current: Vec<f64>,
        target: Vec<f64>,
        velocity: Vec<f64>,
        acceleration: Vec<f64>,
        context: Option<&Context>,
        timestamp: Option<f64>,
    ) -> Result<PlaceId> {
        let context_id = match context {
            Some(c) => self.contexts.index().resolve(c),
            None => self.active_context,
        };
        let timestamp = timestamp.unwrap_or(self.clock);
        let place_id = self.places.place_id(&phase);
        let point = TrajectoryPoint::new(
            timestamp,
            phase,
            current,
            target,
            velocity,
            acceleration,
            place_id,
            context_id,
        );
        self.buffer.add_point(point)?;
        if let Some(point) = self.buffer.last() {
            self.observer.on_record(point);
        }
        self.active_context = context_id;
        self.clock = self.clock.max(timestamp);
        self.last_activity = Some(timestamp);
        Ok(place_id)
    }

    // =========================================================================
    // Retrieval
    // =========================================================================

    fn confidence(&self, visits: u64) -> f64 {
        (visits as f64 / self.config.retrieval.confidence_saturation).min(1.0)
    }

    fn resolve_context(&self, context: Option<&Context>) -> Option<ContextId> {
        match context {
            Some(c) => self.contexts.index().resolve(c),
            None => self.active_context,
        }
    }

    /// Memories relevant to `query`: the blended place bias, plus the
    /// context-specific bias when one has been learned.
    ///
    /// Uses `context` if given, otherwise the active context (which is left
    /// unchanged). Empty when nothing has been learned yet.
    pub fn retrieve<K>(
        &self,
        query: &K,
        context: Option<&Context>,
        top_k: Option<usize>,
    ) -> Result<Vec<Memory>>
    where
        K: MemoryVector + ?Sized,
    {
        let phase = query.to_memory_vector(self.config.dimensions)?;
        let mut memories = Vec::new();
        if self.places.is_empty() {
            return Ok(memories);
        }

        let place_id = self.places.place_id(&phase);
        let retrieval = Retrieval::Blended {
            top_k: top_k.unwrap_or(self.config.retrieval.top_k),
            sigma: self.config.retrieval.sigma,
        };
        let exact = self.places.record(place_id);
        let visits = exact.map_or(0, |r| r.visit_count());
        memories.push(Memory {
            kind: MemoryKind::Place,
            place_id,
            context_id: None,
            bias: self.places.bias_estimate(&phase, retrieval),
            visit_count: visits,
            confidence: self.confidence(visits),
            consolidated: exact.map_or(false, |r| r.is_consolidated()),
        });

        if let Some(context_id) = self.resolve_context(context) {
            if let Some(record) = self.contexts.record(place_id, context_id) {
                memories.push(Memory {
                    kind: MemoryKind::Context,
                    place_id,
                    context_id: Some(context_id),
                    bias: record.bias_estimate().to_vec(),
                    visit_count: record.visit_count(),
                    confidence: self.confidence(record.visit_count()),
                    consolidated: false,
                });
            }
        }
        Ok(memories)
    }

    /// The single bias a controller should compensate at `query`: the
    /// context record when one exists, otherwise the blended place bias.
    pub fn memory_bias<K>(&self, query: &K, context: Option<&Context>) -> Result<Vec<f64>>
    where
        K: MemoryVector + ?Sized,
    {
        let memories = self.retrieve(query, context, None)?;
        let bias = memories
            .iter()
            .find(|m| m.kind == MemoryKind::Context)
            .or_else(|| memories.first())
            .map(|m| m.bias.clone())
            .unwrap_or_else(|| zeros(self.config.dimensions));
        Ok(bias)
    }

    /// [`retrieve`](Self::retrieve) plus a confidence summary.
    pub fn augment<K>(&self, query: &K, context: Option<&Context>) -> Result<Augmented>
    where
        K: MemoryVector + ?Sized,
    {
        let memories = self.retrieve(query, context, None)?;
        let average_confidence = if memories.is_empty() {
            0.0
        } else {
            memories.iter().map(|m| m.confidence).sum::<f64>() / memories.len() as f64
        };
        Ok(Augmented {
            summary: Summary {
                total_memories: memories.len(),
                average_confidence,
                has_memory: average_confidence > 0.1,
            },
            memories,
        })
    }

    // =========================================================================
    // Replay phase
    // =========================================================================

    /// Whether `now` is far enough past the last activity for a replay.
    pub fn should_replay(&self, now: f64) -> bool {
        match self.last_activity {
            Some(last) => self.consolidator.should_replay(last, now),
            None => true,
        }
    }

    /// Run a replay pass.
    ///
    /// `Some(now)` replays only after an idle gap longer than the replay
    /// threshold and returns `None` otherwise; a second call at the same
    /// `now` is therefore a no-op. `None` forces a pass at the latest
    /// timestamp seen.
    pub fn replay(&mut self, now: Option<f64>) -> Result<Option<ReplayStats>> {
        if let Some(now) = now {
            if !self.should_replay(now) {
                log::trace!("replay skipped at t={}: not idle", now);
                return Ok(None);
            }
        }
        let now = now.unwrap_or(self.clock);
        let stats = self.consolidator.replay_pass(
            &mut self.buffer,
            &mut self.places,
            &mut self.contexts,
            &mut self.gate,
            self.observer.as_mut(),
            now,
        )?;
        self.clock = self.clock.max(now);
        self.last_activity = Some(now);
        Ok(Some(stats))
    }

    // =========================================================================
    // Housekeeping
    // =========================================================================

    /// Merge places whose centers are closer than `threshold` (the
    /// configured merge threshold when `None`).
    pub fn merge_places(&mut self, threshold: Option<f64>) -> usize {
        self.places.merge_nearby_places(threshold)
    }

    /// Drop sparse or stale context records. See [`ContextStore::prune`].
    pub fn prune_contexts(&mut self, min_visits: u64, max_age: f64, now: f64) -> usize {
        self.contexts.prune(min_visits, max_age, now)
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            places: self.places.stats(),
            contexts: self.contexts.stats(),
            buffer: self.buffer.stats(),
            replay_passes: self.consolidator.passes(),
            consolidations: self.consolidator.consolidations(),
            active_context: self.active_context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::PhaseKey;
    use crate::MemoryError;
    use serde_json::json;

    fn ctx(op: &str) -> Context {
        let mut c = Context::new();
        c.insert("op".into(), json!(op));
        c
    }

    fn memory() -> UniversalMemory {
        UniversalMemory::new(MemoryConfig::with_dimensions(3)).unwrap()
    }

    #[test]
    fn test_store_is_online_only() {
        let mut m = memory();
        for t in 0..10 {
            m.store(&[1.0, 1.0, 1.0], &[0.1, 0.2, 0.3], None, Some(t as f64)).unwrap();
        }
        assert!(m.places().is_empty());
        assert_eq!(m.buffer().len(), 10);
        assert_eq!(m.memory_bias(&[1.0, 1.0, 1.0], None).unwrap(), vec![0.0; 3]);
    }

    #[test]
    fn test_replay_learns_and_clears() {
        let mut m = memory();
        for t in 0..10 {
            m.store(&[1.0, 1.0, 1.0], &[0.1, 0.2, 0.3], None, Some(t as f64)).unwrap();
        }
        let stats = m.replay(None).unwrap().expect("forced replay runs");
        assert_eq!(stats.places_updated, 1);
        assert!(m.buffer().is_empty());

        let bias = m.memory_bias(&[1.0, 1.0, 1.0], None).unwrap();
        for (b, e) in bias.iter().zip([0.1, 0.2, 0.3]) {
            assert!((b - e).abs() < 1e-9, "{:?}", bias);
        }
    }

    #[test]
    fn test_replay_waits_for_idle_gap() {
        let mut m = memory();
        for t in 0..6 {
            m.store(&[1.0, 1.0, 1.0], &[0.1, 0.0, 0.0], None, Some(t as f64)).unwrap();
        }
        // replay_threshold is 1.0 s; last activity at t = 5
        assert!(m.replay(Some(5.5)).unwrap().is_none());
        assert!(m.replay(Some(6.5)).unwrap().is_some());
        // Second call at the same time is a no-op
        assert!(m.replay(Some(6.5)).unwrap().is_none());
        assert_eq!(m.stats().replay_passes, 1);
    }

    #[test]
    fn test_dimension_mismatch_is_loud() {
        let mut m = memory();
        let err = m.store(&[1.0, 2.0], &[0.0, 0.0, 0.0], None, None).unwrap_err();
        assert!(matches!(err, MemoryError::DimensionMismatch { expected: 3, got: 2 }));
        assert!(m.store(&[1.0, 2.0, 3.0], &vec![0.0; 4], None, None).is_err());
        assert!(m.buffer().is_empty());
    }

    #[test]
    fn test_out_of_order_timestamp() {
        let mut m = memory();
        m.store(&[1.0, 1.0, 1.0], &0.0, None, Some(10.0)).unwrap();
        assert!(matches!(
            m.store(&[1.0, 1.0, 1.0], &0.0, None, Some(9.0)),
            Err(MemoryError::OutOfOrder { .. })
        ));
    }

    #[test]
    fn test_active_context_persists() {
        let mut m = memory();
        m.store(&[1.0, 1.0, 1.0], &0.1, Some(&ctx("A")), Some(0.0)).unwrap();
        let a = m.active_context();
        assert!(a.is_some());
        m.store(&[1.0, 1.0, 1.0], &0.1, None, Some(1.0)).unwrap();
        assert_eq!(m.buffer().iter().last().unwrap().context_id, a);

        m.store(&[1.0, 1.0, 1.0], &0.1, Some(&Context::new()), Some(2.0)).unwrap();
        assert_eq!(m.active_context(), None);
    }

    #[test]
    fn test_retrieve_context_entry() {
        let mut m = memory();
        let key = [2.0, 2.0, 2.0];
        for t in 0..6 {
            m.store(&key, &[0.5, 0.0, 0.0], Some(&ctx("A")), Some(t as f64)).unwrap();
        }
        m.replay(None).unwrap();

        let with_ctx = m.retrieve(&key, Some(&ctx("A")), None).unwrap();
        assert_eq!(with_ctx.len(), 2);
        assert_eq!(with_ctx[0].kind, MemoryKind::Place);
        assert_eq!(with_ctx[1].kind, MemoryKind::Context);
        assert_eq!(with_ctx[1].visit_count, 1);
        assert!((with_ctx[1].confidence - 0.1).abs() < 1e-12);

        // Unknown context: only the place entry
        let other = m.retrieve(&key, Some(&ctx("B")), None).unwrap();
        assert_eq!(other.len(), 1);
        assert_eq!(m.active_context(), m.contexts().index().resolve(&ctx("A")));
    }

    #[test]
    fn test_augment_summary() {
        let mut m = memory();
        let empty = m.augment(&[0.0, 0.0, 0.0], None).unwrap();
        assert_eq!(empty.summary, Summary::default());

        let key = PhaseKey::new("fixture-3");
        for pass in 0..3 {
            for i in 0..5 {
                m.store(&key, &[0.2, 0.0, 0.0], None, Some((pass * 10 + i) as f64)).unwrap();
            }
            m.replay(None).unwrap();
        }
        let aug = m.augment(&key, None).unwrap();
        assert_eq!(aug.summary.total_memories, 1);
        assert!((aug.summary.average_confidence - 0.3).abs() < 1e-12);
        assert!(aug.summary.has_memory);
        // Three consistent passes fill the facade's consolidation window
        assert!(aug.memories[0].consolidated);
        assert_eq!(m.stats().consolidations, 1);
    }

    #[test]
    fn test_stats_aggregate() {
        let mut m = memory();
        m.store(&[1.0, 1.0, 1.0], &0.1, Some(&ctx("A")), Some(0.0)).unwrap();
        let stats = m.stats();
        assert_eq!(stats.buffer.len, 1);
        assert_eq!(stats.places.num_places, 0);
        assert_eq!(stats.replay_passes, 0);
        assert!(stats.active_context.is_some());
    }
}
