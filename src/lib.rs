//! # AI Football Server
//!
//! Authoritative match server for football played between two remote AI programs.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    AI FOOTBALL SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/            - Primitives                               │
//! │  ├── vector.rs    - f64 2D vector                            │
//! │  ├── rng.rs       - Seeded Xorshift128+ PRNG                 │
//! │  └── field.rs     - Pitch geometry                           │
//! │                                                              │
//! │  game/            - Simulation (no I/O)                      │
//! │  ├── entity.rs    - Ball, players, traits                    │
//! │  ├── input.rs     - Actions and parameters                   │
//! │  ├── state.rs     - Game state, formations                   │
//! │  ├── match_info.rs- Match record, errors, goals              │
//! │  ├── physics.rs   - Kicks, ball and player motion            │
//! │  ├── rules.rs     - Restarts, goals, shots                   │
//! │  └── tick.rs      - Ordered per-step update                  │
//! │                                                              │
//! │  network/         - Sockets and deadlines                    │
//! │  ├── protocol.rs  - Wire codec                               │
//! │  ├── connection.rs- One peer socket                          │
//! │  ├── auth.rs      - Pluggable authenticators                 │
//! │  ├── registry.rs  - Accept, login, liveness sweep            │
//! │  ├── simulator.rs - One match against two peers              │
//! │  ├── manager.rs   - Running matches, cancellation            │
//! │  └── server.rs    - Process wiring                           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism
//!
//! `core/` and `game/` never read the clock or the network. Given the same
//! seed, parameters and per-step actions, a match produces identical
//! position history, goals and winner. All randomness comes from the
//! match's [`DeterministicRng`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use core::vector::Vector;
pub use core::rng::DeterministicRng;
pub use game::entity::{Ball, FootballPlayer, PlayerParameters, TeamSide};
pub use game::input::{PlayerAction, TeamAction, TeamParameters};
pub use game::match_info::{MatchInfo, SimulationError, ErrorReason, Goal};
pub use game::state::GameState;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Steps in a full match (two halves).
pub const NUMBER_OF_STEPS: u32 = 1500;

/// In-match time covered by one step, milliseconds.
pub const STEP_INTERVAL_MS: u32 = 200;

/// In-match time covered by one step, seconds.
pub const STEP_SECONDS: f64 = STEP_INTERVAL_MS as f64 / 1000.0;

/// Players on each side.
pub const PLAYERS_PER_TEAM: usize = 11;

/// Players on the pitch.
pub const TOTAL_PLAYERS: usize = 2 * PLAYERS_PER_TEAM;

/// Floats appended to the position history per step (ball xy + 22 players xy).
pub const VALUES_PER_STEP: usize = 2 + 2 * TOTAL_PLAYERS;
