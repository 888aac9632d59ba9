//! Memory layer: stores, the replay buffer, the learning gate and the
//! consolidator that ties them together.
//!
//! - [`PlaceStore`]: per-place bias with blended retrieval and merging.
//! - [`ContextStore`]: per-(place, context) bias, isolated by context.
//! - [`LearningGate`]: online/replay discipline plus motion and variance checks.
//! - [`ReplayBuffer`]: online trajectory log with stable-segment extraction.
//! - [`Consolidator`]: replay passes, the only writer of learned bias.
//!
//! # Usage
//!
//! ```rust
//! use grid_memory::config::{ConsolidationConfig, ContextConfig, LearningGateConfig, PlaceConfig, ReplayConfig};
//! use grid_memory::memory::{Consolidator, ContextStore, LearningGate, PlaceStore, ReplayBuffer, Retrieval, TrajectoryPoint};
//! use grid_memory::observer::NullObserver;
//!
//! # fn main() -> grid_memory::Result<()> {
//! let mut places = PlaceStore::new(2, &PlaceConfig::default())?;
//! let mut contexts = ContextStore::new(2, &ContextConfig::default(), 0.1)?;
//! let mut gate = LearningGate::new(2, &LearningGateConfig::default())?;
//! let mut buffer = ReplayBuffer::new(2, &ReplayConfig::default())?;
//! let mut consolidator = Consolidator::new(&ConsolidationConfig::default())?;
//!
//! // Online: record only
//! let phase = vec![1.0, 2.0];
//! for t in 0..6 {
//!     let point = TrajectoryPoint::new(
//!         t as f64,
//!         phase.clone(),
//!         vec![0.0, 0.0],
//!         vec![0.05, 0.0],
//!         vec![0.0, 0.0],
//!         vec![0.0, 0.0],
//!         places.place_id(&phase),
//!         None,
//!     );
//!     buffer.add_point(point)?;
//! }
//! assert_eq!(places.bias_estimate(&phase, Retrieval::Exact), vec![0.0, 0.0]);
//!
//! // Replay: learn
//! consolidator.replay_pass(&mut buffer, &mut places, &mut contexts, &mut gate, &mut NullObserver, 20.0)?;
//! let bias = places.bias_estimate(&phase, Retrieval::Exact);
//! assert!((bias[0] - 0.05).abs() < 1e-12);
//! # Ok(())
//! # }
//! ```

pub mod consolidator;
pub mod context_store;
pub mod gate;
pub mod place_store;
pub mod replay_buffer;

pub use consolidator::{Consolidator, ReplayStats};
pub use context_store::{ContextRecord, ContextStats, ContextStore};
pub use gate::{GateVerdict, LearningGate, Phase};
pub use place_store::{PlaceRecord, PlaceStats, PlaceStore, Retrieval};
pub use replay_buffer::{BufferStats, ReplayBuffer, TrajectoryPoint};
