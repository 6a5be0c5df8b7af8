//! Ball and Player Kinematics
//!
//! Kick contention, kick application, ball motion and player motion. All
//! vectors are per-step displacements; limits are given in m/s and m/s²
//! and converted with the step interval.

use std::f64::consts::PI;

use crate::core::field::clamp_to_player_area;
use crate::core::vector::Vector;
use crate::game::entity::{speed_to_step_length, TeamSide};
use crate::game::match_info::{ErrorReason, MatchInfo};
use crate::game::state::GameState;
use crate::STEP_SECONDS;

/// Max distance between a player and the ball for the player to kick it, meters.
pub const BALL_MAX_DISTANCE_FOR_KICK: f64 = 2.0;

/// Ball deceleration, m/s².
pub const BALL_DECELERATION: f64 = 1.5;

/// Player acceleration cap, m/s².
pub const MAX_ACCELERATION: f64 = 5.0;

/// Corrections within this factor of a limit are applied silently.
pub const CORRECTION_MARGIN: f64 = 1.01;

/// Kick deviation at zero precision, radians.
pub const MAX_KICK_DEVIATION: f64 = PI / 8.0;

/// Precision at which kicks no longer deviate.
pub const MAX_PRECISION: f64 = 0.4;

/// Base contention weight for the previous kicker, before possession.
const LAST_KICKER_WEIGHT: f64 = 1.5;

// =============================================================================
// KICKS
// =============================================================================

/// Players within reach of the ball who asked to kick it this step.
pub fn kick_contenders(state: &GameState) -> Vec<usize> {
    state
        .players
        .iter()
        .filter(|p| !p.kick.is_zero())
        .filter(|p| p.position.distance(state.ball.position) <= BALL_MAX_DISTANCE_FOR_KICK)
        .map(|p| p.id)
        .collect()
}

/// Pick who wins the ball among `contenders`.
///
/// The previous kicker, if contending, draws with weight `1.5 + possession`
/// against a pooled weight of 1 for everyone else.
pub fn pick_kicker(state: &mut GameState, contenders: &[usize]) -> Option<usize> {
    match contenders.len() {
        0 => return None,
        1 => return Some(contenders[0]),
        _ => {}
    }

    let retaining = state.last_kicker.filter(|k| contenders.contains(k));
    let Some(last) = retaining else {
        return state.rng.choose(contenders).copied();
    };

    let weight = LAST_KICKER_WEIGHT + state.players[last].parameters.possession;
    if state.rng.next_f64() * (weight + 1.0) < weight {
        return Some(last);
    }

    let rest: Vec<usize> = contenders.iter().copied().filter(|&c| c != last).collect();
    state.rng.choose(&rest).copied()
}

/// Apply `kicker`'s kick to the ball: random deviation, then the power cap.
pub fn apply_kick(state: &mut GameState, info: &mut MatchInfo, kicker: usize) {
    let player = state.players[kicker];

    let accuracy_loss = (1.0 - player.parameters.precision / MAX_PRECISION).max(0.0);
    let deviation = state.rng.next_range(-1.0, 1.0) * MAX_KICK_DEVIATION * accuracy_loss;
    let mut kick = player.kick.rotated(deviation);

    let max_length = speed_to_step_length(player.max_kick_speed());
    if kick.length() > max_length {
        if kick.length() > max_length * CORRECTION_MARGIN {
            info.log_error(state.step, ErrorReason::TooStrongKick, player.team(), Some(player.number()));
        }
        kick = kick.with_length(max_length);
    }

    state.ball.movement = kick;
    state.last_kicker = Some(kicker);
}

// =============================================================================
// BALL
// =============================================================================

/// Advance the ball one step and decelerate it.
pub fn move_ball(state: &mut GameState) {
    let ball = &mut state.ball;
    ball.position += ball.movement;

    let speed = ball.current_speed() - BALL_DECELERATION * STEP_SECONDS;
    ball.movement = if speed > 0.0 {
        ball.movement.with_length(speed_to_step_length(speed))
    } else {
        Vector::ZERO
    };
}

// =============================================================================
// PLAYERS
// =============================================================================

/// Per-step movement change allowed by the acceleration cap.
#[inline]
fn max_movement_change() -> f64 {
    speed_to_step_length(MAX_ACCELERATION * STEP_SECONDS)
}

/// Move one player toward its requested movement within its limits.
pub fn move_player(state: &mut GameState, info: &mut MatchInfo, slot: usize, requested: Vector) {
    let step = state.step;
    let player = &mut state.players[slot];
    let team = player.team();
    let number = Some(player.number());

    let mut change = requested - player.movement;
    let max_change = max_movement_change();
    if change.length() > max_change {
        if change.length() > max_change * CORRECTION_MARGIN {
            info.log_error(step, ErrorReason::TooHighAcceleration, team, number);
        }
        change = change.with_length(max_change);
    }
    let mut movement = player.movement + change;

    let max_length = speed_to_step_length(player.max_speed());
    if movement.length() > max_length {
        if movement.length() > max_length * CORRECTION_MARGIN {
            info.log_error(step, ErrorReason::TooHighSpeed, team, number);
        }
        movement = movement.with_length(max_length);
    }

    let next = clamp_to_player_area(player.position + movement);
    player.movement = next - player.position;
    player.position = next;
}

/// Hold a side in place for a step with no action.
pub fn freeze_side(state: &mut GameState, side: TeamSide) {
    for player in &mut state.players[side.player_slots()] {
        player.movement = Vector::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::field::{CENTER, FIELD_WIDTH, PLAYER_BOUNDARY_MARGIN};
    use crate::game::entity::{step_length_to_speed, PlayerParameters};
    use proptest::prelude::*;

    /// Implied acceleration of a movement change, m/s².
    fn acceleration_of(change: Vector) -> f64 {
        step_length_to_speed(change.length()) / STEP_SECONDS
    }

    fn state_with_ball_at(p: Vector) -> GameState {
        let mut state = GameState::new(42);
        state.is_kick_off = false;
        state.ball.position = p;
        state
    }

    #[test]
    fn test_contenders_need_reach_and_kick() {
        let mut state = state_with_ball_at(CENTER);
        state.players[3].position = CENTER + Vector::new(1.5, 0.0);
        state.players[3].kick = Vector::new(1.0, 0.0);
        state.players[14].position = CENTER + Vector::new(2.5, 0.0);
        state.players[14].kick = Vector::new(1.0, 0.0);
        // In reach but not kicking
        state.players[15].position = CENTER;

        assert_eq!(kick_contenders(&state), vec![3]);
    }

    #[test]
    fn test_pick_kicker_is_always_a_contender() {
        let mut state = state_with_ball_at(CENTER);
        assert_eq!(pick_kicker(&mut state, &[]), None);
        assert_eq!(pick_kicker(&mut state, &[7]), Some(7));

        state.last_kicker = Some(4);
        let contenders = [4, 12, 19];
        let mut kept = 0;
        for _ in 0..2000 {
            let k = pick_kicker(&mut state, &contenders).unwrap();
            assert!(contenders.contains(&k));
            if k == 4 {
                kept += 1;
            }
        }
        // 1.75 / 2.75 with default possession
        assert!(kept > 1100 && kept < 1450, "kept = {}", kept);
    }

    #[test]
    fn test_perfect_precision_kicks_straight() {
        let mut state = state_with_ball_at(CENTER);
        let mut info = MatchInfo::default();
        state.players[5].parameters.precision = 0.4;
        state.players[5].kick = Vector::new(2.0, 0.0);

        apply_kick(&mut state, &mut info, 5);
        assert!((state.ball.movement.x - 2.0).abs() < 1e-9);
        assert!(state.ball.movement.y.abs() < 1e-9);
        assert_eq!(state.last_kicker, Some(5));
        assert!(info.errors.is_empty());
    }

    #[test]
    fn test_deviation_bounded_by_precision() {
        let mut state = state_with_ball_at(CENTER);
        let mut info = MatchInfo::default();
        state.players[5].parameters.precision = 0.0;
        state.players[5].kick = Vector::new(2.0, 0.0);

        for _ in 0..200 {
            apply_kick(&mut state, &mut info, 5);
            let angle = state.ball.movement.y.atan2(state.ball.movement.x).abs();
            assert!(angle <= MAX_KICK_DEVIATION + 1e-9);
        }
    }

    #[test]
    fn test_over_strong_kick_is_clamped_and_logged() {
        let mut state = state_with_ball_at(CENTER);
        let mut info = MatchInfo::default();
        let max = state.players[5].max_kick_speed();
        state.players[5].kick = Vector::new(speed_to_step_length(max * 1.5), 0.0);

        apply_kick(&mut state, &mut info, 5);
        assert!((state.ball.current_speed() - max).abs() < 1e-9);
        assert_eq!(info.error_count(TeamSide::A, ErrorReason::TooStrongKick), 1);
    }

    #[test]
    fn test_ball_decelerates_to_rest() {
        let mut state = state_with_ball_at(CENTER);
        state.ball.movement = Vector::new(0.2, 0.0); // 1 m/s

        move_ball(&mut state);
        assert!((state.ball.position.x - (CENTER.x + 0.2)).abs() < 1e-9);
        assert!((state.ball.current_speed() - 0.7).abs() < 1e-9);

        for _ in 0..3 {
            move_ball(&mut state);
        }
        assert_eq!(state.ball.movement, Vector::ZERO);
        assert!(state.ball.position.x > CENTER.x);
    }

    #[test]
    fn test_player_acceleration_clamped() {
        let mut state = state_with_ball_at(CENTER);
        let mut info = MatchInfo::default();

        move_player(&mut state, &mut info, 2, Vector::new(1.0, 0.0));
        assert!((state.players[2].movement.length() - max_movement_change()).abs() < 1e-9);
        assert!(acceleration_of(state.players[2].movement) <= MAX_ACCELERATION * 1.0001);
        assert_eq!(info.error_count(TeamSide::A, ErrorReason::TooHighAcceleration), 1);
    }

    #[test]
    fn test_small_overshoot_not_logged() {
        let mut state = state_with_ball_at(CENTER);
        let mut info = MatchInfo::default();

        move_player(&mut state, &mut info, 2, Vector::new(max_movement_change() * 1.005, 0.0));
        assert!(info.errors.is_empty());
    }

    #[test]
    fn test_player_kept_near_field() {
        let mut state = state_with_ball_at(CENTER);
        let mut info = MatchInfo::default();
        state.players[1].position = Vector::new(-PLAYER_BOUNDARY_MARGIN + 0.1, 10.0);
        state.players[1].movement = Vector::new(-1.0, 0.0);

        move_player(&mut state, &mut info, 1, Vector::new(-1.0, 0.0));
        assert_eq!(state.players[1].position.x, -PLAYER_BOUNDARY_MARGIN);
        assert!(state.players[1].position.x < FIELD_WIDTH);
    }

    #[test]
    fn test_freeze_side() {
        let mut state = state_with_ball_at(CENTER);
        state.players[12].movement = Vector::new(1.0, 1.0);
        freeze_side(&mut state, TeamSide::B);
        assert_eq!(state.players[12].movement, Vector::ZERO);
    }

    proptest! {
        #[test]
        fn prop_player_speed_capped(
            speed_trait in 0.0f64..=0.4,
            start_x in -1.5f64..1.5,
            start_y in -1.5f64..1.5,
            req_x in -50.0f64..50.0,
            req_y in -50.0f64..50.0,
        ) {
            let mut state = state_with_ball_at(CENTER);
            let mut info = MatchInfo::default();
            state.players[6].parameters = PlayerParameters { speed: speed_trait, ..PlayerParameters::DEFAULT };
            state.players[6].movement = Vector::new(start_x, start_y).clamp_length(
                speed_to_step_length(state.players[6].max_speed()),
            );

            move_player(&mut state, &mut info, 6, Vector::new(req_x, req_y));
            let player = state.players[6];
            prop_assert!(player.current_speed() <= player.max_speed() * 1.0001);
        }

        #[test]
        fn prop_kicked_ball_within_power(
            power in 0.0f64..=0.4,
            kx in -20.0f64..20.0,
            ky in -20.0f64..20.0,
        ) {
            prop_assume!(kx != 0.0 || ky != 0.0);
            let mut state = state_with_ball_at(CENTER);
            let mut info = MatchInfo::default();
            state.players[8].parameters.kick_power = power;
            state.players[8].kick = Vector::new(kx, ky);

            apply_kick(&mut state, &mut info, 8);
            prop_assert!(state.ball.current_speed() <= state.players[8].max_kick_speed() * 1.0001);
        }
    }
}
