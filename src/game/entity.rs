//! Simulated Bodies
//!
//! The ball, the 22 players and their trait sets. Movement vectors are
//! per-step displacements; speeds are derived in meters per second.

use serde::{Serialize, Deserialize};

use crate::core::vector::Vector;
use crate::{PLAYERS_PER_TEAM, STEP_INTERVAL_MS};

/// Convert a per-step displacement length to meters per second.
#[inline]
pub fn step_length_to_speed(length: f64) -> f64 {
    length * 1000.0 / STEP_INTERVAL_MS as f64
}

/// Convert meters per second to a per-step displacement length.
#[inline]
pub fn speed_to_step_length(speed: f64) -> f64 {
    speed * STEP_INTERVAL_MS as f64 / 1000.0
}

// =============================================================================
// TEAM SIDE
// =============================================================================

/// One of the two competing sides.
///
/// Side A owns player slots 0-10, side B owns 11-21, for the whole match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TeamSide {
    /// Slots 0-10
    A,
    /// Slots 11-21
    B,
}

impl TeamSide {
    /// Both sides in slot order.
    pub const BOTH: [TeamSide; 2] = [TeamSide::A, TeamSide::B];

    /// 0 for A, 1 for B.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            TeamSide::A => 0,
            TeamSide::B => 1,
        }
    }

    /// The other side.
    #[inline]
    pub fn opponent(self) -> TeamSide {
        match self {
            TeamSide::A => TeamSide::B,
            TeamSide::B => TeamSide::A,
        }
    }

    /// Slot of this side's first player (its goalkeeper).
    #[inline]
    pub fn first_player(self) -> usize {
        self.index() * PLAYERS_PER_TEAM
    }

    /// Slots owned by this side.
    #[inline]
    pub fn player_slots(self) -> std::ops::Range<usize> {
        let first = self.first_player();
        first..first + PLAYERS_PER_TEAM
    }

    /// Side owning a player slot.
    #[inline]
    pub fn of_player(id: usize) -> TeamSide {
        if id < PLAYERS_PER_TEAM {
            TeamSide::A
        } else {
            TeamSide::B
        }
    }
}

// =============================================================================
// PLAYER PARAMETERS
// =============================================================================

/// Per-player trait set, chosen once per match by the AI.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerParameters {
    /// Raises max speed
    pub speed: f64,
    /// Edge when contending for the ball as its last kicker
    pub possession: f64,
    /// Reduces kick deviation
    pub precision: f64,
    /// Raises max kick speed
    pub kick_power: f64,
}

impl PlayerParameters {
    /// Upper bound for a single trait.
    pub const MAX_TRAIT: f64 = 0.4;

    /// Upper bound for the sum of all four traits.
    pub const MAX_SUM: f64 = 1.0;

    /// Slack allowed on both bounds.
    pub const TOLERANCE: f64 = 0.01;

    /// The fallback trait set.
    pub const DEFAULT: Self = Self {
        speed: 0.25,
        possession: 0.25,
        precision: 0.25,
        kick_power: 0.25,
    };

    fn traits(&self) -> [f64; 4] {
        [self.speed, self.possession, self.precision, self.kick_power]
    }

    /// Whether the traits respect the caps.
    ///
    /// Each trait must be finite, non-negative and at most 0.4; their sum at
    /// most 1.0 (both caps with 0.01 tolerance).
    pub fn is_valid(&self) -> bool {
        let traits = self.traits();
        // Single-trait tolerance is tighter than the sum tolerance
        let trait_cap = Self::MAX_TRAIT + 0.0001;
        traits.iter().all(|t| t.is_finite() && *t >= 0.0 && *t <= trait_cap)
            && traits.iter().sum::<f64>() <= Self::MAX_SUM + Self::TOLERANCE
    }
}

impl Default for PlayerParameters {
    fn default() -> Self {
        Self::DEFAULT
    }
}

// =============================================================================
// BALL
// =============================================================================

/// The ball.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Ball {
    /// Position on the pitch
    pub position: Vector,
    /// Displacement applied per step
    pub movement: Vector,
}

impl Ball {
    /// Current speed in m/s.
    #[inline]
    pub fn current_speed(&self) -> f64 {
        step_length_to_speed(self.movement.length())
    }
}

// =============================================================================
// FOOTBALL PLAYER
// =============================================================================

/// A simulated player.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FootballPlayer {
    /// Fixed slot, 0-21
    pub id: usize,
    /// Trait set for this match
    pub parameters: PlayerParameters,
    /// Position on the pitch
    pub position: Vector,
    /// Displacement applied per step
    pub movement: Vector,
    /// Desired ball movement if this player wins the ball this step
    pub kick: Vector,
}

impl FootballPlayer {
    /// Create a player in the given slot with default traits.
    pub fn new(id: usize) -> Self {
        Self {
            id,
            parameters: PlayerParameters::DEFAULT,
            position: Vector::ZERO,
            movement: Vector::ZERO,
            kick: Vector::ZERO,
        }
    }

    /// Side owning this player.
    #[inline]
    pub fn team(&self) -> TeamSide {
        TeamSide::of_player(self.id)
    }

    /// Number within the team, 0-10 (0 is the goalkeeper).
    #[inline]
    pub fn number(&self) -> u8 {
        (self.id % PLAYERS_PER_TEAM) as u8
    }

    /// Max running speed in m/s.
    #[inline]
    pub fn max_speed(&self) -> f64 {
        4.0 + self.parameters.speed * 5.0
    }

    /// Max ball speed this player can kick, in m/s.
    #[inline]
    pub fn max_kick_speed(&self) -> f64 {
        15.0 + self.parameters.kick_power * 5.0
    }

    /// Current speed in m/s.
    #[inline]
    pub fn current_speed(&self) -> f64 {
        step_length_to_speed(self.movement.length())
    }
}
