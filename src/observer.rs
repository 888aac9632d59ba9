//! Observability hooks for the learning path.
//!
//! The memory never prints. Events that matter for diagnosing learning
//! (points entering the buffer, replay passes, consolidations, gate
//! rejections) go to a [`MemoryObserver`]. [`LogObserver`] forwards them to
//! the `log` facade; plug in your own to feed metrics.

use crate::kernel::{ContextId, PlaceId};
use crate::memory::consolidator::ReplayStats;
use crate::memory::gate::GateVerdict;
use crate::memory::replay_buffer::TrajectoryPoint;

/// Receiver of structured memory events. All methods default to no-ops.
pub trait MemoryObserver {
    /// A point was appended to the replay buffer.
    fn on_record(&mut self, _point: &TrajectoryPoint) {}

    /// A replay pass finished.
    fn on_replay(&mut self, _stats: &ReplayStats) {}

    /// A place promoted its recent samples to long-term memory.
    fn on_consolidated(&mut self, _place: PlaceId, _bias: &[f64]) {}

    /// The learning gate refused an update during replay.
    fn on_gate_rejected(
        &mut self,
        _place: PlaceId,
        _context: Option<ContextId>,
        _verdict: &GateVerdict,
    ) {
    }
}

/// Forwards events to `log` (`trace` for records, `info` for replays).
#[derive(Clone, Copy, Debug, Default)]
pub struct LogObserver;

impl MemoryObserver for LogObserver {
    fn on_record(&mut self, point: &TrajectoryPoint) {
        log::trace!(
            "recorded t={} {} context={:?} |err|={:.3e}",
            point.timestamp,
            point.place_id,
            point.context_id,
            crate::kernel::vector::norm(&point.error)
        );
    }

    fn on_replay(&mut self, stats: &ReplayStats) {
        log::info!(
            "replay: {} points, {} segments, {} place updates, {} context updates, {} consolidated, {} rejected",
            stats.points_reviewed,
            stats.stable_segments,
            stats.places_updated,
            stats.contexts_updated,
            stats.places_consolidated,
            stats.gate_rejections
        );
    }

    fn on_consolidated(&mut self, place: PlaceId, bias: &[f64]) {
        log::debug!("consolidated {} bias={:?}", place, bias);
    }

    fn on_gate_rejected(&mut self, place: PlaceId, context: Option<ContextId>, verdict: &GateVerdict) {
        log::debug!("gate rejected {} context={:?}: {}", place, context, verdict);
    }
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullObserver;

impl MemoryObserver for NullObserver {}
