//! Authoritative Simulation Step
//!
//! One call to [`step`] advances the match by 200 ms of play. The order is
//! fixed: read commands, ball (contention, kick, motion), players,
//! out-of-bounds, goals. Deterministic for a given seed and command stream.

use crate::core::vector::Vector;
use crate::game::entity::TeamSide;
use crate::game::input::TeamAction;
use crate::game::match_info::{ErrorReason, MatchInfo};
use crate::game::physics;
use crate::game::rules;
use crate::game::state::GameState;
use crate::TOTAL_PLAYERS;

/// A half that begins at the current step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Half {
    /// Step 0
    First,
    /// Halfway through the match
    Second,
}

/// What happened during a step.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StepResult {
    /// Player slot that won the ball
    pub kicker: Option<usize>,
    /// Ball left the pitch and a restart was placed
    pub restart: bool,
    /// Side that scored
    pub goal: Option<TeamSide>,
}

/// Set up a half if one begins at the current step.
///
/// A coin flip picks the side kicking off; ends are swapped for the second half.
pub fn prepare_step(state: &mut GameState, number_of_steps: u32) -> Option<Half> {
    let half = if state.step == 0 {
        Half::First
    } else if state.step == number_of_steps / 2 {
        state.swap_ends();
        Half::Second
    } else {
        return None;
    };

    let kicking = if state.rng.next_bool() { TeamSide::A } else { TeamSide::B };
    state.reset_to_kickoff(kicking);
    Some(half)
}

/// Run one simulation step.
///
/// `actions` is indexed by [`TeamSide::index`]; `None` means the side sent
/// nothing in time, so its players hold still and do not kick.
pub fn step(state: &mut GameState, info: &mut MatchInfo, actions: [Option<&TeamAction>; 2]) -> StepResult {
    let mut result = StepResult::default();

    // 1. Commands
    let requested = read_commands(state, info, actions);

    // 2. Ball
    let previous_ball = state.ball.position;
    let contenders = physics::kick_contenders(state);
    if let Some(kicker) = physics::pick_kicker(state, &contenders) {
        rules::account_stopped_shot(state, info, kicker);
        physics::apply_kick(state, info, kicker);
        result.kicker = Some(kicker);
    }
    physics::move_ball(state);

    // 3. Players
    for side in TeamSide::BOTH {
        if actions[side.index()].is_none() {
            physics::freeze_side(state, side);
            continue;
        }
        for slot in side.player_slots() {
            physics::move_player(state, info, slot, requested[slot]);
        }
    }

    // 4. Out of bounds
    result.restart = rules::handle_out_of_bounds(state, previous_ball);

    // 5. Goals
    result.goal = rules::handle_goal(state, info, previous_ball);

    state.step += 1;
    info.record_positions(state);
    info.steps_completed = state.step;

    result
}

/// Load kicks onto the players and return requested movements, zeroing
/// non-finite vectors.
fn read_commands(
    state: &mut GameState,
    info: &mut MatchInfo,
    actions: [Option<&TeamAction>; 2],
) -> [Vector; TOTAL_PLAYERS] {
    let mut requested = [Vector::ZERO; TOTAL_PLAYERS];

    for side in TeamSide::BOTH {
        let Some(action) = actions[side.index()] else {
            for player in &mut state.players[side.player_slots()] {
                player.kick = Vector::ZERO;
            }
            continue;
        };

        for (number, command) in action.players.iter().enumerate() {
            let slot = side.first_player() + number;
            let player_number = Some(number as u8);

            requested[slot] = if command.movement.is_finite() {
                command.movement
            } else {
                info.log_error(state.step, ErrorReason::InvalidMovementVector, side, player_number);
                Vector::ZERO
            };

            state.players[slot].kick = if command.kick.is_finite() {
                command.kick
            } else {
                info.log_error(state.step, ErrorReason::InvalidKickVector, side, player_number);
                Vector::ZERO
            };
        }
    }

    requested
}
