//! Core primitives.
//!
//! Geometry and the seeded random source. Nothing here touches I/O or the
//! wall clock, so a match built on top of it can be replayed exactly.

pub mod vector;
pub mod rng;
pub mod field;

// Re-export core types
pub use vector::Vector;
pub use rng::{DeterministicRng, derive_match_seed};
