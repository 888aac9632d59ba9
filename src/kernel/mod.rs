//! Kernel layer: stateless geometry, hashing and statistics.
//!
//! - Torus distance and place-field kernels ([`TorusMetric`])
//! - Phase vector → place id ([`PlaceIndex`])
//! - Context description → context id ([`ContextIndex`])
//! - Caller type → memory vector adapters ([`MemoryVector`], [`PhaseKey`])
//! - Bounded-window moments ([`WindowAccumulator`])
//!
//! This layer has no dependencies on [`memory`](crate::memory) or
//! [`highlevel`](crate::highlevel).
//!
//! # Example
//!
//! ```rust
//! use grid_memory::kernel::{PlaceIndex, TorusMetric};
//!
//! let index = PlaceIndex::new(1000, 100, TorusMetric::default());
//! let a = index.place_id(&[1.0, 0.5, 0.3]);
//! assert_eq!(a, index.place_id(&[1.0, 0.5, 0.3]));
//! ```

pub mod accumulator;
pub mod adapter;
pub mod context_index;
pub mod place_index;
pub mod torus;
pub mod vector;

pub use accumulator::{mean_of, std_of, variance_of, WindowAccumulator};
pub use adapter::{MemoryVector, PhaseKey};
pub use context_index::{Context, ContextId, ContextIndex};
pub use place_index::{PlaceId, PlaceIndex};
pub use torus::{gaussian, TorusMetric};
