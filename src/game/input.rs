//! Per-Side Commands
//!
//! What an AI sends: a one-time trait assignment for its 11 players, then
//! one movement + kick command per player every step. Values arrive as raw
//! floats from the wire and are converted here; nothing is validated against
//! kinematic limits until the physics update.

use serde::{Serialize, Deserialize};

use crate::core::vector::Vector;
use crate::game::entity::PlayerParameters;
use crate::PLAYERS_PER_TEAM;

/// Floats per player in a parameters or action payload.
pub const FIELDS_PER_PLAYER: usize = 4;

/// Floats in a parameters or action payload.
pub const FIELDS_PER_TEAM: usize = PLAYERS_PER_TEAM * FIELDS_PER_PLAYER;

// =============================================================================
// ACTIONS
// =============================================================================

/// Requested movement and kick for one player, both per-step displacements.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerAction {
    /// Desired movement for this step
    pub movement: Vector,
    /// Desired ball movement if this player wins the ball
    pub kick: Vector,
}

/// One side's command for a single step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TeamAction {
    /// Commands in the side's own player order
    pub players: [PlayerAction; PLAYERS_PER_TEAM],
}

impl TeamAction {
    /// Every player stands still and does not kick.
    pub fn idle() -> Self {
        Self {
            players: [PlayerAction::default(); PLAYERS_PER_TEAM],
        }
    }

    /// Build from payload floats: per player `movement.x, movement.y, kick.x, kick.y`.
    ///
    /// Non-finite values are kept as-is; the physics update corrects them.
    pub fn from_values(values: &[f32; FIELDS_PER_TEAM]) -> Self {
        let mut players = [PlayerAction::default(); PLAYERS_PER_TEAM];
        for (player, chunk) in players.iter_mut().zip(values.chunks_exact(FIELDS_PER_PLAYER)) {
            player.movement = Vector::new(chunk[0] as f64, chunk[1] as f64);
            player.kick = Vector::new(chunk[2] as f64, chunk[3] as f64);
        }
        Self { players }
    }

    /// Flatten into payload order.
    pub fn to_values(&self) -> [f32; FIELDS_PER_TEAM] {
        let mut values = [0.0f32; FIELDS_PER_TEAM];
        for (chunk, player) in values.chunks_exact_mut(FIELDS_PER_PLAYER).zip(self.players.iter()) {
            chunk[0] = player.movement.x as f32;
            chunk[1] = player.movement.y as f32;
            chunk[2] = player.kick.x as f32;
            chunk[3] = player.kick.y as f32;
        }
        values
    }
}

impl Default for TeamAction {
    fn default() -> Self {
        Self::idle()
    }
}

// =============================================================================
// PARAMETERS
// =============================================================================

/// One side's trait assignment for the whole match.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TeamParameters {
    /// Traits in the side's own player order
    pub players: [PlayerParameters; PLAYERS_PER_TEAM],
}

impl TeamParameters {
    /// All players on the 0.25 fallback set.
    pub fn fallback() -> Self {
        Self {
            players: [PlayerParameters::DEFAULT; PLAYERS_PER_TEAM],
        }
    }

    /// Build from payload floats: per player `speed, kick_power, possession, precision`.
    pub fn from_values(values: &[f32; FIELDS_PER_TEAM]) -> Self {
        let mut players = [PlayerParameters::DEFAULT; PLAYERS_PER_TEAM];
        for (player, chunk) in players.iter_mut().zip(values.chunks_exact(FIELDS_PER_PLAYER)) {
            player.speed = chunk[0] as f64;
            player.kick_power = chunk[1] as f64;
            player.possession = chunk[2] as f64;
            player.precision = chunk[3] as f64;
        }
        Self { players }
    }

    /// Flatten into payload order.
    pub fn to_values(&self) -> [f32; FIELDS_PER_TEAM] {
        let mut values = [0.0f32; FIELDS_PER_TEAM];
        for (chunk, player) in values.chunks_exact_mut(FIELDS_PER_PLAYER).zip(self.players.iter()) {
            chunk[0] = player.speed as f32;
            chunk[1] = player.kick_power as f32;
            chunk[2] = player.possession as f32;
            chunk[3] = player.precision as f32;
        }
        values
    }

    /// True when every player's traits respect the caps.
    pub fn is_valid(&self) -> bool {
        self.players.iter().all(PlayerParameters::is_valid)
    }

    /// The submitted set if valid, otherwise the fallback set for the whole side.
    pub fn validated(self) -> Self {
        if self.is_valid() {
            self
        } else {
            Self::fallback()
        }
    }
}

impl Default for TeamParameters {
    fn default() -> Self {
        Self::fallback()
    }
}
