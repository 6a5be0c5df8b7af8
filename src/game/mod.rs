//! Game Logic Module
//!
//! The match simulation. No sockets, no clocks: randomness comes from the
//! state's seeded generator only.
//!
//! ## Module Structure
//!
//! - `entity`: Ball, players, trait sets, sides
//! - `input`: Per-step actions and per-match parameters
//! - `state`: Game state and kickoff formations
//! - `match_info`: Accumulated match record
//! - `physics`: Kicks, ball motion, player motion
//! - `rules`: Restarts, goals, stopped shots
//! - `tick`: Ordered per-step update

pub mod entity;
pub mod input;
pub mod state;
pub mod match_info;
pub mod physics;
pub mod rules;
pub mod tick;

// Re-export key types
pub use entity::{Ball, FootballPlayer, PlayerParameters, TeamSide};
pub use input::{PlayerAction, TeamAction, TeamParameters};
pub use state::GameState;
pub use match_info::{ErrorReason, Goal, MatchInfo, SimulationError, TeamStatistics};
pub use tick::{Half, StepResult};
