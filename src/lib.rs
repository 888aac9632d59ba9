//! # grid-memory: place- and context-keyed bias memory
//!
//! A bias memory for reference-stabilizing control loops. It learns, per
//! spatial *place* and per operating *context*, a small corrective vector for
//! repeatable drift (thermal growth, backlash), and blends it with fast
//! predictive and noise-suppressing terms in a cerebellum-style corrector.
//!
//! ## Quick Start
//!
//! ```rust
//! use grid_memory::{CerebellumConfig, CerebellumEngine, MemoryConfig, Observation, UniversalMemory};
//!
//! # fn main() -> grid_memory::Result<()> {
//! let mut memory = UniversalMemory::new(MemoryConfig::with_dimensions(2))?;
//! let mut cerebellum = CerebellumEngine::new(2, &CerebellumConfig::default())?;
//!
//! // Online: observations are only recorded
//! let place = [1.0, 0.5];
//! for t in 0..6 {
//!     memory.store(&place, &[-0.002, 0.0], None, Some(t as f64))?;
//! }
//!
//! // Idle gap: replay commits what was seen
//! memory.replay(Some(10.0))?;
//!
//! // Control step: correction in the error frame
//! let obs = Observation::new(&[1.0, 0.5], &[1.0, 0.5], 0.01).with_memory_query(&place);
//! let correction = cerebellum.compute_correction(&obs, Some(&memory), None)?;
//! assert!(correction.memory[0] > 0.0);
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! - **Place**: a quantized, hashed cell of the phase torus
//! - **Context**: hashed operating conditions isolating otherwise identical places
//! - **Online / Replay**: observations are recorded online and only learned
//!   during idle-triggered replay passes
//! - **Consolidation**: promotion of consistent estimates to long-term memory
//! - **Blending**: Gaussian-weighted retrieval across nearby places
//!
//! ## Layers
//!
//! - [`kernel`]: torus geometry, place/context hashing, adapters, statistics
//! - [`memory`]: stores, replay buffer, learning gate, consolidator
//! - [`highlevel`]: [`UniversalMemory`] and [`CerebellumEngine`]

pub mod config;
pub mod error;
pub mod highlevel;
pub mod kernel;
pub mod memory;
pub mod observer;

// Re-exports for convenience
pub use config::{
    CerebellumConfig, ConsolidationConfig, ContextConfig, LearningGateConfig, MemoryConfig,
    PlaceConfig, ReplayConfig, RetrievalConfig,
};
pub use error::{MemoryError, Result};
pub use highlevel::{
    Augmented, CerebellumEngine, Correction, Kinematics, Memory, MemoryKind, MemoryStats,
    Observation, Summary, UniversalMemory,
};
pub use kernel::{Context, ContextId, MemoryVector, PhaseKey, PlaceId, TorusMetric};
pub use memory::{Phase, ReplayStats, Retrieval, TrajectoryPoint};
pub use observer::{LogObserver, MemoryObserver, NullObserver};
