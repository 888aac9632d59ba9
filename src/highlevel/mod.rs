//! High-level API.
//!
//! - [`UniversalMemory`]: the store/retrieve/augment/replay facade that owns
//!   every store of the [`memory`](crate::memory) layer.
//! - [`CerebellumEngine`]: the fast correction blend that consumes it.
//!
//! For finer control (custom stores, a shared gate, manual replay passes),
//! use the [`memory`](crate::memory) layer directly.

pub mod cerebellum;
pub mod universal;

pub use cerebellum::{CerebellumEngine, Correction, Observation};
pub use universal::{
    Augmented, Kinematics, Memory, MemoryKind, MemoryStats, Summary, UniversalMemory,
};
