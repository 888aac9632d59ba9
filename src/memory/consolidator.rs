//! Consolidator: the replay-phase driver.
//!
//! This is the only code path that mutates learned bias. A pass:
//!
//! 1. extracts stable segments from the replay buffer,
//! 2. groups each segment's points by `(place, context)` in order of first
//!    appearance,
//! 3. skips groups with fewer than `min_group_points` points,
//! 4. asks the [`LearningGate`] (replay phase, group-mean kinematics, group
//!    states in the variance window) whether the group may teach,
//! 5. folds the group's mean error into the place record and, when the
//!    group carries a context, into the context record,
//! 6. tries to consolidate the place record,
//!
//! and finally clears the buffer. Groups are checked against the store
//! dimension before the first write, so a failed pass leaves both the
//! stores and the buffer as they were.
//!
//! Too few samples or too much spread never fail a pass; the place simply
//! waits for the next one.

use super::context_store::ContextStore;
use super::gate::{LearningGate, Phase};
use super::place_store::{PlaceRecord, PlaceStore};
use super::replay_buffer::{ReplayBuffer, TrajectoryPoint};
use crate::config::ConsolidationConfig;
use crate::error::{check_vector, Result};
use crate::kernel::accumulator::{mean_of, std_of};
use crate::kernel::{ContextId, PlaceId};
use crate::observer::MemoryObserver;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What a single replay pass did.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayStats {
    pub time: f64,
    pub points_reviewed: usize,
    pub stable_segments: usize,
    pub groups: usize,
    /// Groups below `min_group_points`
    pub groups_skipped: usize,
    pub gate_rejections: usize,
    pub places_updated: usize,
    pub contexts_updated: usize,
    pub places_consolidated: usize,
}

/// A segment's points for one `(place, context)`, reduced to what the
/// update needs.
struct Group {
    place_id: PlaceId,
    context_id: Option<ContextId>,
    size: usize,
    center: Vec<f64>,
    mean_error: Vec<f64>,
    mean_velocity: Vec<f64>,
    mean_acceleration: Vec<f64>,
    states: Vec<Vec<f64>>,
}

impl Group {
    fn summarize(points: &[&TrajectoryPoint], places: &PlaceStore) -> Option<Self> {
        let first = points.first()?;
        let dimensions = first.error.len();
        Some(Self {
            place_id: first.place_id,
            context_id: first.context_id,
            size: points.len(),
            center: places.torus().mean_near(points.iter().map(|p| p.phase.as_slice()))?,
            mean_error: mean_of(points.iter().map(|p| p.error.as_slice()), dimensions),
            mean_velocity: mean_of(points.iter().map(|p| p.velocity.as_slice()), dimensions),
            mean_acceleration: mean_of(
                points.iter().map(|p| p.acceleration.as_slice()),
                dimensions,
            ),
            states: points.iter().map(|p| p.current_state.clone()).collect(),
        })
    }

    fn check(&self, dimensions: usize) -> Result<()> {
        check_vector(&self.center, dimensions, "phase")?;
        check_vector(&self.mean_error, dimensions, "error")?;
        check_vector(&self.mean_velocity, dimensions, "velocity")?;
        check_vector(&self.mean_acceleration, dimensions, "acceleration")?;
        for state in &self.states {
            check_vector(state, dimensions, "current state")?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct Consolidator {
    config: ConsolidationConfig,
    passes: u64,
    consolidations: u64,
}

impl Consolidator {
    pub fn new(config: &ConsolidationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: config.clone(),
            passes: 0,
            consolidations: 0,
        })
    }

    pub fn config(&self) -> &ConsolidationConfig {
        &self.config
    }

    /// Replay passes run so far.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Consolidations performed so far, across all passes.
    pub fn consolidations(&self) -> u64 {
        self.consolidations
    }

    /// True once the system has been idle for longer than the replay threshold.
    pub fn should_replay(&self, last_update_time: f64, now: f64) -> bool {
        now - last_update_time > self.config.replay_threshold
    }

    /// True when every per-dimension standard deviation is below the
    /// significance threshold.
    pub fn is_significant<'a, I>(&self, samples: I, dimensions: usize) -> bool
    where
        I: IntoIterator<Item = &'a [f64]> + Clone,
    {
        std_of(samples, dimensions)
            .iter()
            .all(|&s| s < self.config.significance_threshold)
    }

    /// Promote a place's recent history to long-term memory if it is
    /// consistent enough. Returns the consolidated bias when promoted.
    pub fn consolidate(&self, record: &mut PlaceRecord, now: f64) -> Option<Vec<f64>> {
        let window = self.config.consolidation_window;
        if record.history_len() < window {
            return None;
        }
        let dimensions = record.bias_estimate().len();
        let recent = record.recent_history(window);
        if !self.is_significant(recent.clone(), dimensions) {
            return None;
        }
        let mean = mean_of(recent, dimensions);
        record.set_consolidated(mean.clone(), now);
        Some(mean)
    }

    /// Run one replay pass over `buffer` and clear it.
    pub fn replay_pass(
        &mut self,
        buffer: &mut ReplayBuffer,
        places: &mut PlaceStore,
        contexts: &mut ContextStore,
        gate: &mut LearningGate,
        observer: &mut dyn MemoryObserver,
        now: f64,
    ) -> Result<ReplayStats> {
        let mut stats = ReplayStats {
            time: now,
            points_reviewed: buffer.len(),
            ..Default::default()
        };

        let mut groups = Vec::new();
        {
            let segments = buffer.stable_segments();
            stats.stable_segments = segments.len();
            for segment in &segments {
                for points in group_by_key(segment) {
                    stats.groups += 1;
                    if points.len() < self.config.min_group_points {
                        stats.groups_skipped += 1;
                        continue;
                    }
                    if let Some(group) = Group::summarize(&points, places) {
                        groups.push(group);
                    }
                }
            }
        }

        // Nothing is written unless every group fits the stores
        for group in &groups {
            group.check(places.dimensions())?;
        }
        for group in groups {
            self.apply_group(&group, places, contexts, gate, observer, now, &mut stats)?;
        }

        buffer.clear();
        self.passes += 1;
        self.consolidations += stats.places_consolidated as u64;
        observer.on_replay(&stats);
        Ok(stats)
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_group(
        &self,
        group: &Group,
        places: &mut PlaceStore,
        contexts: &mut ContextStore,
        gate: &mut LearningGate,
        observer: &mut dyn MemoryObserver,
        now: f64,
        stats: &mut ReplayStats,
    ) -> Result<()> {
        let prior_visits = match group.context_id {
            Some(c) => contexts.record(group.place_id, c).map(|r| r.visit_count()),
            None => places.record(group.place_id).map(|r| r.visit_count()),
        }
        .unwrap_or(0);

        gate.reset();
        for state in &group.states {
            gate.record_state(state)?;
        }
        let verdict = gate.check(
            &group.mean_velocity,
            &group.mean_acceleration,
            prior_visits + group.size as u64,
            Phase::Replay,
        );
        if !verdict.is_accept() {
            stats.gate_rejections += 1;
            observer.on_gate_rejected(group.place_id, group.context_id, &verdict);
            return Ok(());
        }

        places.update_bias(group.place_id, &group.center, &group.mean_error, now, None)?;
        stats.places_updated += 1;
        if let Some(context_id) = group.context_id {
            contexts.update(group.place_id, context_id, &group.mean_error, now, None)?;
            stats.contexts_updated += 1;
        }

        if let Some(record) = places.record_mut(group.place_id) {
            if let Some(bias) = self.consolidate(record, now) {
                stats.places_consolidated += 1;
                observer.on_consolidated(group.place_id, &bias);
            }
        }
        Ok(())
    }
}

/// Split a segment by `(place, context)`, keeping first-appearance order.
fn group_by_key<'a>(segment: &[&'a TrajectoryPoint]) -> Vec<Vec<&'a TrajectoryPoint>> {
    let mut order: HashMap<(PlaceId, Option<ContextId>), usize> = HashMap::new();
    let mut groups: Vec<Vec<&'a TrajectoryPoint>> = Vec::new();
    for &point in segment {
        let key = (point.place_id, point.context_id);
        let slot = *order.entry(key).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(point);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ContextConfig, LearningGateConfig, PlaceConfig, ReplayConfig};
    use crate::error::MemoryError;
    use crate::observer::NullObserver;
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;

    struct Rig {
        buffer: ReplayBuffer,
        places: PlaceStore,
        contexts: ContextStore,
        gate: LearningGate,
        consolidator: Consolidator,
    }

    impl Rig {
        fn new(window: usize) -> Self {
            let consolidation = ConsolidationConfig {
                consolidation_window: window,
                ..Default::default()
            };
            Self {
                buffer: ReplayBuffer::new(2, &ReplayConfig::default()).unwrap(),
                places: PlaceStore::new(2, &PlaceConfig::default()).unwrap(),
                contexts: ContextStore::new(2, &ContextConfig::default(), 0.1).unwrap(),
                gate: LearningGate::new(2, &LearningGateConfig::default()).unwrap(),
                consolidator: Consolidator::new(&consolidation).unwrap(),
            }
        }

        fn record(&mut self, t: f64, phase: [f64; 2], error: [f64; 2], context: Option<u64>) {
            let place = self.places.place_id(&phase);
            let point = TrajectoryPoint::new(
                t,
                phase.to_vec(),
                vec![0.0, 0.0],
                error.to_vec(),
                vec![0.0, 0.0],
                vec![0.0, 0.0],
                place,
                context.map(ContextId),
            );
            self.buffer.add_point(point).unwrap();
        }

        fn replay(&mut self, now: f64) -> ReplayStats {
            self.consolidator
                .replay_pass(
                    &mut self.buffer,
                    &mut self.places,
                    &mut self.contexts,
                    &mut self.gate,
                    &mut NullObserver,
                    now,
                )
                .unwrap()
        }
    }

    #[test]
    fn test_should_replay_is_strict() {
        let c = Consolidator::new(&ConsolidationConfig::default()).unwrap();
        assert!(!c.should_replay(10.0, 15.0));
        assert!(c.should_replay(10.0, 15.1));
    }

    #[test]
    fn test_pass_updates_and_clears() {
        let mut rig = Rig::new(10);
        for t in 0..6 {
            rig.record(t as f64, [1.0, 1.0], [0.2, -0.1], Some(3));
        }
        let stats = rig.replay(10.0);
        assert_eq!(stats.points_reviewed, 6);
        assert_eq!(stats.stable_segments, 1);
        assert_eq!(stats.places_updated, 1);
        assert_eq!(stats.contexts_updated, 1);
        assert!(rig.buffer.is_empty());

        let place = rig.places.place_id(&[1.0, 1.0]);
        let record = rig.places.record(place).unwrap();
        assert!((record.bias_estimate()[0] - 0.2).abs() < 1e-12);
        assert_eq!(record.last_update_time(), 10.0);
        let ctx = rig.contexts.bias_estimate(place, ContextId(3));
        assert!((ctx[0] - 0.2).abs() < 1e-12 && (ctx[1] + 0.1).abs() < 1e-12, "got {:?}", ctx);
    }

    #[test]
    fn test_small_groups_skipped() {
        let mut rig = Rig::new(10);
        // One segment of 6 points, split 2/4 across two places
        for t in 0..2 {
            rig.record(t as f64, [1.0, 1.0], [0.5, 0.5], None);
        }
        for t in 2..6 {
            rig.record(t as f64, [4.0, 4.0], [0.5, 0.5], None);
        }
        let stats = rig.replay(10.0);
        assert_eq!(stats.groups, 2);
        assert_eq!(stats.groups_skipped, 1);
        assert_eq!(rig.places.len(), 1);
    }

    #[test]
    fn test_consolidates_low_variance() {
        let mut rig = Rig::new(10);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for pass in 0..10 {
            let base = pass as f64 * 10.0;
            for i in 0..5 {
                let noise = rng.gen_range(-1e-4..1e-4);
                rig.record(base + i as f64, [2.0, 2.0], [0.3 + noise, 0.1], None);
            }
            let stats = rig.replay(base + 9.0);
            if pass < 9 {
                assert_eq!(stats.places_consolidated, 0, "pass {}", pass);
            } else {
                assert_eq!(stats.places_consolidated, 1);
            }
        }
        let place = rig.places.place_id(&[2.0, 2.0]);
        let record = rig.places.record(place).unwrap();
        let consolidated = record.consolidated_bias().expect("consolidated");
        assert!((consolidated[0] - 0.3).abs() < 1e-4, "got {:?}", consolidated);
        assert_eq!(record.consolidation_time(), Some(99.0));
        assert_eq!(record.bias_estimate(), consolidated);
        assert_eq!(rig.consolidator.consolidations(), 1);
    }

    #[test]
    fn test_high_variance_not_consolidated() {
        let mut rig = Rig::new(10);
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for pass in 0..10 {
            let base = pass as f64 * 10.0;
            let level = rng.gen_range(-1.0..1.0);
            for i in 0..5 {
                rig.record(base + i as f64, [2.0, 2.0], [level, 0.0], None);
            }
            rig.replay(base + 9.0);
        }
        let place = rig.places.place_id(&[2.0, 2.0]);
        let record = rig.places.record(place).unwrap();
        assert_eq!(record.history_len(), 10);
        assert!(record.consolidated_bias().is_none());
    }

    #[test]
    fn test_gate_rejects_jittery_states() {
        let mut rig = Rig::new(10);
        let place = rig.places.place_id(&[1.0, 1.0]);
        for t in 0..12 {
            let jitter = if t % 2 == 0 { 1.0 } else { -1.0 };
            let point = TrajectoryPoint::new(
                t as f64,
                vec![1.0, 1.0],
                vec![jitter, 0.0],
                vec![jitter + 0.1, 0.0],
                vec![0.0, 0.0],
                vec![0.0, 0.0],
                place,
                None,
            );
            rig.buffer.add_point(point).unwrap();
        }
        let stats = rig.replay(20.0);
        assert_eq!(stats.gate_rejections, 1);
        assert_eq!(stats.places_updated, 0);
        assert!(rig.places.is_empty());
        // The buffer is cleared regardless
        assert!(rig.buffer.is_empty());
    }

    #[test]
    fn test_mismatched_points_never_reach_a_pass() {
        let mut rig = Rig::new(10);
        for t in 0..5 {
            rig.record(t as f64, [1.0, 1.0], [0.2, 0.0], None);
        }
        let other = rig.places.place_id(&[4.0, 4.0]);
        for t in 5..10 {
            let wide = TrajectoryPoint::new(
                t as f64,
                vec![4.0, 4.0],
                vec![0.0, 0.0, 0.0],
                vec![0.1, 0.0, 0.0],
                vec![0.0, 0.0],
                vec![0.0, 0.0],
                other,
                None,
            );
            assert!(matches!(
                rig.buffer.add_point(wide),
                Err(MemoryError::DimensionMismatch { expected: 2, got: 3 })
            ));
        }
        assert_eq!(rig.buffer.len(), 5);

        let stats = rig.replay(20.0);
        assert_eq!(stats.places_updated, 1);
        assert!(rig.buffer.is_empty());
        let stats = rig.replay(40.0);
        assert_eq!(stats.places_updated, 0);

        let place = rig.places.place_id(&[1.0, 1.0]);
        assert_eq!(rig.places.record(place).unwrap().visit_count(), 1);
    }

    #[test]
    fn test_failed_pass_writes_nothing() {
        let mut rig = Rig::new(10);
        // Buffer wider than the stores it feeds
        rig.buffer = ReplayBuffer::new(3, &ReplayConfig::default()).unwrap();
        for t in 0..5 {
            let point = TrajectoryPoint::new(
                t as f64,
                vec![1.0, 1.0, 1.0],
                vec![0.0, 0.0, 0.0],
                vec![0.2, 0.0, 0.0],
                vec![0.0, 0.0, 0.0],
                vec![0.0, 0.0, 0.0],
                PlaceId(1),
                Some(ContextId(4)),
            );
            rig.buffer.add_point(point).unwrap();
        }
        for now in [20.0, 40.0] {
            let result = rig.consolidator.replay_pass(
                &mut rig.buffer,
                &mut rig.places,
                &mut rig.contexts,
                &mut rig.gate,
                &mut NullObserver,
                now,
            );
            assert!(matches!(result, Err(MemoryError::DimensionMismatch { .. })));
            assert!(rig.places.is_empty());
            assert!(rig.contexts.is_empty());
            assert_eq!(rig.buffer.len(), 5);
        }
        assert_eq!(rig.consolidator.passes(), 0);
    }
}
