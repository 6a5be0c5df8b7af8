//! Game State
//!
//! The 22 players, the ball, the step counter and the few flags the rules
//! need between steps. Owned exclusively by one match task.

use crate::core::field::{CENTER, FIELD_WIDTH};
use crate::core::rng::DeterministicRng;
use crate::core::vector::Vector;
use crate::game::entity::{Ball, FootballPlayer, TeamSide};
use crate::game::input::TeamParameters;
use crate::{PLAYERS_PER_TEAM, TOTAL_PLAYERS};

// =============================================================================
// FORMATIONS
// =============================================================================

/// Kickoff positions for a side defending the `x = 0` goal line, by player number.
const FORMATION: [Vector; PLAYERS_PER_TEAM] = [
    Vector::new(3.0, 37.5),
    Vector::new(15.0, 10.0),
    Vector::new(15.0, 28.0),
    Vector::new(15.0, 47.0),
    Vector::new(15.0, 65.0),
    Vector::new(30.0, 10.0),
    Vector::new(30.0, 28.0),
    Vector::new(30.0, 47.0),
    Vector::new(30.0, 65.0),
    Vector::new(45.0, 30.0),
    Vector::new(45.0, 45.0),
];

/// Player 9 of the kicking side, next to the centre spot.
const KICKOFF_SUPPORT: Vector = Vector::new(50.0, 30.0);

/// Player 10 of the kicking side, on the ball.
const KICKOFF_TAKER: Vector = Vector::new(54.0, 37.5);

/// Mirror a left-side position for the side defending `x = FIELD_WIDTH`.
#[inline]
fn mirror(p: Vector) -> Vector {
    Vector::new(FIELD_WIDTH - p.x, p.y)
}

// =============================================================================
// GAME STATE
// =============================================================================

/// Authoritative state of one match.
#[derive(Clone, Debug)]
pub struct GameState {
    /// Fixed slots: 0-10 side A, 11-21 side B
    pub players: [FootballPlayer; TOTAL_PLAYERS],
    /// The ball
    pub ball: Ball,
    /// Index of the step about to be simulated
    pub step: u32,
    /// Set for the one step right after a kickoff or restart placement
    pub is_kick_off: bool,
    /// Slot of the player who last kicked the ball
    pub last_kicker: Option<usize>,
    /// Side defending the `x = 0` goal line
    pub left_side: TeamSide,
    /// Match randomness
    pub rng: DeterministicRng,
}

impl GameState {
    /// Fresh state: side A defends `x = 0`, all traits at the fallback set.
    pub fn new(seed: u64) -> Self {
        let players = std::array::from_fn(FootballPlayer::new);
        let mut state = Self {
            players,
            ball: Ball { position: CENTER, movement: Vector::ZERO },
            step: 0,
            is_kick_off: false,
            last_kicker: None,
            left_side: TeamSide::A,
            rng: DeterministicRng::new(seed),
        };
        state.reset_to_kickoff(TeamSide::A);
        state.is_kick_off = false;
        state
    }

    /// Assign one side's trait sets.
    pub fn set_parameters(&mut self, side: TeamSide, parameters: &TeamParameters) {
        for (player, params) in self.players[side.player_slots()].iter_mut().zip(parameters.players.iter()) {
            player.parameters = *params;
        }
    }

    /// X of the goal line a side defends.
    #[inline]
    pub fn defended_goal_x(&self, side: TeamSide) -> f64 {
        if side == self.left_side {
            0.0
        } else {
            FIELD_WIDTH
        }
    }

    /// X of the goal line a side attacks.
    #[inline]
    pub fn attacked_goal_x(&self, side: TeamSide) -> f64 {
        self.defended_goal_x(side.opponent())
    }

    /// Side defending the goal line at `goal_x`.
    #[inline]
    pub fn side_defending(&self, goal_x: f64) -> TeamSide {
        if goal_x <= 0.0 {
            self.left_side
        } else {
            self.left_side.opponent()
        }
    }

    /// Side whose half contains `x`.
    #[inline]
    pub fn side_owning_half(&self, x: f64) -> TeamSide {
        self.side_defending(if x < CENTER.x { 0.0 } else { FIELD_WIDTH })
    }

    /// Side of the last kicker, if any.
    #[inline]
    pub fn last_touch_side(&self) -> Option<TeamSide> {
        self.last_kicker.map(TeamSide::of_player)
    }

    /// One side's players.
    pub fn team(&self, side: TeamSide) -> &[FootballPlayer] {
        &self.players[side.player_slots()]
    }

    /// Place everyone in kickoff formation, `kicking` side on the ball.
    pub fn reset_to_kickoff(&mut self, kicking: TeamSide) {
        for side in TeamSide::BOTH {
            let on_left = side == self.left_side;
            for (number, player) in self.players[side.player_slots()].iter_mut().enumerate() {
                let mut spot = FORMATION[number];
                if side == kicking {
                    if number == 10 {
                        spot = KICKOFF_TAKER;
                    } else if number == 9 {
                        spot = KICKOFF_SUPPORT;
                    }
                }
                player.position = if on_left { spot } else { mirror(spot) };
                player.movement = Vector::ZERO;
                player.kick = Vector::ZERO;
            }
        }

        self.ball = Ball { position: CENTER, movement: Vector::ZERO };
        self.last_kicker = None;
        self.is_kick_off = true;
    }

    /// Change ends at half time.
    pub fn swap_ends(&mut self) {
        self.left_side = self.left_side.opponent();
    }

    /// Append ball xy then every player's xy, in slot order.
    pub fn write_positions(&self, out: &mut Vec<f32>) {
        out.push(self.ball.position.x as f32);
        out.push(self.ball.position.y as f32);
        for player in &self.players {
            out.push(player.position.x as f32);
            out.push(player.position.y as f32);
        }
    }

    /// Slot of the player of `side` nearest to `point`.
    pub fn nearest_player(&self, side: TeamSide, point: Vector) -> usize {
        let mut best = side.first_player();
        let mut best_distance = f64::INFINITY;
        for slot in side.player_slots() {
            let d = self.players[slot].position.distance(point);
            if d < best_distance {
                best = slot;
                best_distance = d;
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::field::FIELD_HEIGHT;
    use crate::VALUES_PER_STEP;

    #[test]
    fn test_kickoff_formation_is_mirrored() {
        let mut state = GameState::new(1);
        state.reset_to_kickoff(TeamSide::B);

        // A defends x = 0, B defends x = W
        assert_eq!(state.players[0].position, Vector::new(3.0, 37.5));
        assert_eq!(state.players[11].position, Vector::new(FIELD_WIDTH - 3.0, 37.5));

        // Kicking side B has its number 10 next to the ball
        assert_eq!(state.players[21].position, Vector::new(FIELD_WIDTH - 54.0, 37.5));
        assert_eq!(state.players[10].position, Vector::new(45.0, 45.0));
        assert!(state.players[21].position.distance(state.ball.position) < 2.0);
        assert!(state.is_kick_off);
        assert_eq!(state.last_kicker, None);
    }

    #[test]
    fn test_everyone_in_own_half_at_kickoff() {
        let mut state = GameState::new(1);
        state.reset_to_kickoff(TeamSide::A);
        for player in state.team(TeamSide::A) {
            assert!(player.position.x < CENTER.x);
            assert!((0.0..=FIELD_HEIGHT).contains(&player.position.y));
        }
        for player in state.team(TeamSide::B) {
            assert!(player.position.x > CENTER.x);
        }
    }

    #[test]
    fn test_swap_ends() {
        let mut state = GameState::new(1);
        assert_eq!(state.defended_goal_x(TeamSide::A), 0.0);
        assert_eq!(state.attacked_goal_x(TeamSide::A), FIELD_WIDTH);

        state.swap_ends();
        assert_eq!(state.defended_goal_x(TeamSide::A), FIELD_WIDTH);
        assert_eq!(state.side_defending(0.0), TeamSide::B);
        assert_eq!(state.side_owning_half(80.0), TeamSide::A);
    }

    #[test]
    fn test_write_positions_layout() {
        let state = GameState::new(1);
        let mut out = Vec::new();
        state.write_positions(&mut out);
        assert_eq!(out.len(), VALUES_PER_STEP);
        assert_eq!(out[0], CENTER.x as f32);
        assert_eq!(out[2], 3.0);
        assert_eq!(out[3], 37.5);
    }

    #[test]
    fn test_nearest_player() {
        let state = GameState::new(1);
        assert_eq!(state.nearest_player(TeamSide::A, Vector::new(0.0, 37.5)), 0);
        assert_eq!(state.nearest_player(TeamSide::B, Vector::new(FIELD_WIDTH, 37.5)), 11);
    }
}
