//! Replay buffer: the online-phase trajectory log.
//!
//! Points are appended while the controller runs and read back during
//! replay. The buffer never touches the stores; it only answers "which
//! stretches of recent history were settled enough to learn from".

use crate::config::ReplayConfig;
use crate::error::{check_vector, MemoryError, Result};
use crate::kernel::vector::{norm, sub};
use crate::kernel::{ContextId, PlaceId};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One observation of the controlled system.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub timestamp: f64,
    pub phase: Vec<f64>,
    pub current_state: Vec<f64>,
    pub target_state: Vec<f64>,
    /// `target_state - current_state`
    pub error: Vec<f64>,
    pub velocity: Vec<f64>,
    pub acceleration: Vec<f64>,
    pub place_id: PlaceId,
    pub context_id: Option<ContextId>,
}

impl TrajectoryPoint {
    /// Build a point; the error is derived from the two states.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        timestamp: f64,
        phase: Vec<f64>,
        current_state: Vec<f64>,
        target_state: Vec<f64>,
        velocity: Vec<f64>,
        acceleration: Vec<f64>,
        place_id: PlaceId,
        context_id: Option<ContextId>,
    ) -> Self {
        let error = sub(&target_state, &current_state);
        Self {
            timestamp,
            phase,
            current_state,
            target_state,
            error,
            velocity,
            acceleration,
            place_id,
            context_id,
        }
    }

    /// Both ‖velocity‖ and ‖acceleration‖ strictly below their thresholds.
    pub fn is_stable(&self, velocity_threshold: f64, acceleration_threshold: f64) -> bool {
        norm(&self.velocity) < velocity_threshold
            && norm(&self.acceleration) < acceleration_threshold
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BufferStats {
    pub len: usize,
    pub capacity: usize,
    pub fill_ratio: f64,
    /// Points ever appended, including evicted ones
    pub total_points: u64,
    pub stable_points: usize,
    pub stable_ratio: f64,
}

/// Bounded FIFO of [`TrajectoryPoint`]s in timestamp order.
#[derive(Clone, Debug)]
pub struct ReplayBuffer {
    dimensions: usize,
    config: ReplayConfig,
    points: VecDeque<TrajectoryPoint>,
    total_points: u64,
}

impl ReplayBuffer {
    pub fn new(dimensions: usize, config: &ReplayConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            dimensions,
            config: config.clone(),
            points: VecDeque::new(),
            total_points: 0,
        })
    }

    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Append a point, evicting the oldest at capacity.
    ///
    /// Timestamps must not go backwards: segment extraction relies on
    /// buffer order being time order. Every vector must have the buffer's
    /// dimension.
    pub fn add_point(&mut self, point: TrajectoryPoint) -> Result<()> {
        if !point.timestamp.is_finite() {
            return Err(MemoryError::NonFinite { what: "timestamp" });
        }
        let dim = self.dimensions;
        check_vector(&point.phase, dim, "phase")?;
        check_vector(&point.current_state, dim, "current state")?;
        check_vector(&point.target_state, dim, "target state")?;
        check_vector(&point.error, dim, "error")?;
        check_vector(&point.velocity, dim, "velocity")?;
        check_vector(&point.acceleration, dim, "acceleration")?;
        if let Some(last) = self.last_timestamp() {
            if point.timestamp < last {
                return Err(MemoryError::OutOfOrder {
                    last,
                    got: point.timestamp,
                });
            }
        }
        if self.points.len() >= self.config.max_size {
            self.points.pop_front();
        }
        self.points.push_back(point);
        self.total_points += 1;
        Ok(())
    }

    /// Stable segments under the configured thresholds.
    pub fn stable_segments(&self) -> Vec<Vec<&TrajectoryPoint>> {
        self.stable_segments_with(
            self.config.velocity_threshold,
            self.config.acceleration_threshold,
            self.config.min_segment_length,
        )
    }

    /// Maximal runs of consecutive stable points, keeping runs of at least
    /// `min_segment_length`.
    pub fn stable_segments_with(
        &self,
        velocity_threshold: f64,
        acceleration_threshold: f64,
        min_segment_length: usize,
    ) -> Vec<Vec<&TrajectoryPoint>> {
        let mut segments = Vec::new();
        let mut current: Vec<&TrajectoryPoint> = Vec::new();
        for point in &self.points {
            if point.is_stable(velocity_threshold, acceleration_threshold) {
                current.push(point);
            } else {
                if current.len() >= min_segment_length {
                    segments.push(std::mem::take(&mut current));
                }
                current.clear();
            }
        }
        if current.len() >= min_segment_length {
            segments.push(current);
        }
        segments
    }

    /// Buffered points for a place, optionally narrowed to one context.
    pub fn points_for(
        &self,
        place_id: PlaceId,
        context_id: Option<ContextId>,
    ) -> Vec<&TrajectoryPoint> {
        self.points
            .iter()
            .filter(|p| p.place_id == place_id)
            .filter(|p| context_id.map_or(true, |c| p.context_id == Some(c)))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrajectoryPoint> {
        self.points.iter()
    }

    /// Most recently added point.
    pub fn last(&self) -> Option<&TrajectoryPoint> {
        self.points.back()
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.points.back().map(|p| p.timestamp)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn stats(&self) -> BufferStats {
        let len = self.points.len();
        let stable_points = self
            .points
            .iter()
            .filter(|p| p.is_stable(self.config.velocity_threshold, self.config.acceleration_threshold))
            .count();
        BufferStats {
            len,
            capacity: self.config.max_size,
            fill_ratio: len as f64 / self.config.max_size as f64,
            total_points: self.total_points,
            stable_points,
            stable_ratio: if len > 0 {
                stable_points as f64 / len as f64
            } else {
                0.0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(t: f64, speed: f64, place: u64, context: Option<u64>) -> TrajectoryPoint {
        TrajectoryPoint::new(
            t,
            vec![0.0],
            vec![0.0],
            vec![1.0],
            vec![speed],
            vec![0.0],
            PlaceId(place),
            context.map(ContextId),
        )
    }

    fn buffer(max_size: usize) -> ReplayBuffer {
        ReplayBuffer::new(1, &ReplayConfig {
            max_size,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_error_is_target_minus_current() {
        let p = point(0.0, 0.0, 0, None);
        assert_eq!(p.error, vec![1.0]);
    }

    #[test]
    fn test_eviction() {
        let mut b = buffer(3);
        for t in 0..5 {
            b.add_point(point(t as f64, 0.0, 0, None)).unwrap();
        }
        assert_eq!(b.len(), 3);
        assert_eq!(b.iter().next().unwrap().timestamp, 2.0);
        assert_eq!(b.stats().total_points, 5);
    }

    #[test]
    fn test_out_of_order_rejected() {
        let mut b = buffer(10);
        b.add_point(point(5.0, 0.0, 0, None)).unwrap();
        b.add_point(point(5.0, 0.0, 0, None)).unwrap();
        match b.add_point(point(4.0, 0.0, 0, None)) {
            Err(MemoryError::OutOfOrder { last, got }) => assert_eq!((last, got), (5.0, 4.0)),
            other => panic!("expected OutOfOrder, got {:?}", other),
        }
        assert_eq!(b.len(), 2);
        assert_eq!(b.last_timestamp(), Some(5.0));
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let mut b = buffer(10);
        b.add_point(point(0.0, 0.0, 0, None)).unwrap();
        let wide = TrajectoryPoint::new(
            1.0,
            vec![0.0],
            vec![0.0, 0.0],
            vec![1.0, 1.0],
            vec![0.0],
            vec![0.0],
            PlaceId(0),
            None,
        );
        match b.add_point(wide) {
            Err(MemoryError::DimensionMismatch { expected, got }) => {
                assert_eq!((expected, got), (1, 2))
            }
            other => panic!("expected DimensionMismatch, got {:?}", other),
        }
        let nan = TrajectoryPoint::new(
            1.0,
            vec![f64::NAN],
            vec![0.0],
            vec![1.0],
            vec![0.0],
            vec![0.0],
            PlaceId(0),
            None,
        );
        assert!(matches!(b.add_point(nan), Err(MemoryError::NonFinite { what: "phase" })));
        assert_eq!(b.len(), 1);
        assert_eq!(b.last_timestamp(), Some(0.0));
    }

    #[test]
    fn test_stable_segments() {
        let mut b = buffer(100);
        let speeds = [
            0.0, 0.0, 0.0, 0.0, 0.0, 0.0, // 6 stable
            0.5, // break
            0.0, 0.0, 0.0, // 3 stable, too short
            0.5, // break
            0.0, 0.0, 0.0, 0.0, 0.0, // 5 stable at the end
        ];
        for (t, s) in speeds.iter().enumerate() {
            b.add_point(point(t as f64, *s, 0, None)).unwrap();
        }
        let segs = b.stable_segments();
        let lens: Vec<usize> = segs.iter().map(|s| s.len()).collect();
        assert_eq!(lens, vec![6, 5]);
        assert_eq!(segs[1][0].timestamp, 11.0);

        let stats = b.stats();
        assert_eq!(stats.stable_points, 14);
        assert!((stats.stable_ratio - 14.0 / 16.0).abs() < 1e-12);
    }

    #[test]
    fn test_threshold_is_strict() {
        let p = point(0.0, 0.01, 0, None);
        assert!(!p.is_stable(0.01, 0.001));
        assert!(p.is_stable(0.011, 0.001));
    }

    #[test]
    fn test_points_for() {
        let mut b = buffer(100);
        b.add_point(point(0.0, 0.0, 1, Some(7))).unwrap();
        b.add_point(point(1.0, 0.0, 1, Some(8))).unwrap();
        b.add_point(point(2.0, 0.0, 2, Some(7))).unwrap();
        b.add_point(point(3.0, 0.0, 1, None)).unwrap();
        assert_eq!(b.points_for(PlaceId(1), None).len(), 3);
        assert_eq!(b.points_for(PlaceId(1), Some(ContextId(7))).len(), 1);
        assert!(b.points_for(PlaceId(3), None).is_empty());
    }

    #[test]
    fn test_clear_keeps_total() {
        let mut b = buffer(10);
        b.add_point(point(0.0, 0.0, 0, None)).unwrap();
        b.clear();
        assert!(b.is_empty());
        assert_eq!(b.stats().total_points, 1);
        assert_eq!(b.stats().fill_ratio, 0.0);
    }
}
