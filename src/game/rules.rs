//! Match Rules
//!
//! Line crossings (restarts and goals) and stopped-shot accounting.
//! The ball is a point; a crossing is found by interpolating between its
//! position before and after the step's motion.

use crate::core::field::{clamp_to_player_area, is_within_goal_mouth, FIELD_HEIGHT, FIELD_WIDTH};
use crate::core::vector::Vector;
use crate::game::entity::TeamSide;
use crate::game::match_info::MatchInfo;
use crate::game::physics::BALL_DECELERATION;
use crate::game::state::GameState;

/// Opponents are pushed at least this far from a restart spot, meters.
pub const RESTART_CLEAR_RADIUS: f64 = 6.0;

/// Min speed of a ball heading at goal to count as a shot, m/s.
pub const MIN_SHOT_SPEED: f64 = 4.0;

/// Goal kicks are taken this far in front of the goal line, meters.
pub const GOAL_KICK_DISTANCE: f64 = 5.5;

// =============================================================================
// LINE CROSSINGS
// =============================================================================

/// How the ball left the pitch this step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BallExit {
    /// Crossed a goal line at height `y`
    GoalLine {
        /// X of the crossed line
        goal_x: f64,
        /// Crossing height
        y: f64,
    },
    /// Crossed a touch line at `x`
    TouchLine {
        /// Y of the crossed line
        line_y: f64,
        /// Crossing point along the line
        x: f64,
    },
}

impl BallExit {
    /// A goal-line crossing between the posts.
    pub fn is_goal(&self) -> bool {
        matches!(self, BallExit::GoalLine { y, .. } if is_within_goal_mouth(*y))
    }
}

/// Fraction along `from -> to` where the segment reaches `line` on one axis.
fn crossing_fraction(from: f64, to: f64, line: f64) -> Option<f64> {
    let outside_after = if line <= 0.0 { to < line } else { to > line };
    let inside_before = if line <= 0.0 { from >= line } else { from <= line };
    if !(outside_after && inside_before) || to == from {
        return None;
    }
    Some(((line - from) / (to - from)).clamp(0.0, 1.0))
}

/// Find the first line the ball crossed moving from `from` to `to`.
pub fn find_exit(from: Vector, to: Vector) -> Option<BallExit> {
    let goal = [0.0, FIELD_WIDTH]
        .into_iter()
        .find_map(|x| crossing_fraction(from.x, to.x, x).map(|t| (t, x)));
    let touch = [0.0, FIELD_HEIGHT]
        .into_iter()
        .find_map(|y| crossing_fraction(from.y, to.y, y).map(|t| (t, y)));

    let along = |t: f64| from + (to - from) * t;
    match (goal, touch) {
        (Some((tg, goal_x)), Some((tt, _))) if tg <= tt => Some(BallExit::GoalLine { goal_x, y: along(tg).y }),
        (Some((tg, goal_x)), None) => Some(BallExit::GoalLine { goal_x, y: along(tg).y }),
        (_, Some((tt, line_y))) => Some(BallExit::TouchLine { line_y, x: along(tt).x }),
        (None, None) => None,
    }
}

// =============================================================================
// RESTARTS
// =============================================================================

/// Handle a ball that left the pitch outside the goal mouth.
///
/// Returns true if a restart was placed.
pub fn handle_out_of_bounds(state: &mut GameState, previous_ball: Vector) -> bool {
    let Some(exit) = find_exit(previous_ball, state.ball.position) else {
        return false;
    };
    if exit.is_goal() {
        return false;
    }

    let (restarting, spot) = match exit {
        BallExit::GoalLine { goal_x, y } => {
            let defending = state.side_defending(goal_x);
            let touched_by_defender = state.last_touch_side().map_or(true, |s| s == defending);
            if touched_by_defender {
                let x = if goal_x <= 0.0 { GOAL_KICK_DISTANCE } else { FIELD_WIDTH - GOAL_KICK_DISTANCE };
                (defending, Vector::new(x, FIELD_HEIGHT / 2.0))
            } else {
                let corner_y = if y < FIELD_HEIGHT / 2.0 { 0.0 } else { FIELD_HEIGHT };
                (defending.opponent(), Vector::new(goal_x, corner_y))
            }
        }
        BallExit::TouchLine { line_y, x } => {
            let restarting = match state.last_touch_side() {
                Some(side) => side.opponent(),
                None => state.side_owning_half(x),
            };
            (restarting, Vector::new(x.clamp(0.0, FIELD_WIDTH), line_y))
        }
    };

    tracing::debug!(step = state.step, ?exit, ?restarting, "Ball out of play");
    place_restart(state, restarting, spot, matches!(exit, BallExit::GoalLine { .. }));
    true
}

/// Put the ball at `spot` with a `restarting` player on it and opponents cleared.
fn place_restart(state: &mut GameState, restarting: TeamSide, spot: Vector, from_goal_line: bool) {
    state.ball.position = spot;
    state.ball.movement = Vector::ZERO;

    // Goal kicks are taken by the goalkeeper
    let goal_kick = from_goal_line && spot.x != 0.0 && spot.x != FIELD_WIDTH;
    let taker = if goal_kick {
        restarting.first_player()
    } else {
        state.nearest_player(restarting, spot)
    };
    state.players[taker].position = spot;
    state.players[taker].movement = Vector::ZERO;

    let away_x = state.attacked_goal_x(restarting);
    for slot in restarting.opponent().player_slots() {
        let player = &mut state.players[slot];
        let offset = player.position - spot;
        if offset.length() >= RESTART_CLEAR_RADIUS {
            continue;
        }
        let direction = if offset.is_zero() {
            Vector::new(away_x - spot.x, 0.0).normalized()
        } else {
            offset.normalized()
        };
        // Near a corner the cleared spot can fall outside the player area
        player.position = clamp_to_player_area(spot + direction * RESTART_CLEAR_RADIUS);
        player.movement = Vector::ZERO;
    }

    state.last_kicker = None;
    state.is_kick_off = true;
}

// =============================================================================
// GOALS
// =============================================================================

/// Handle a ball that crossed a goal line between the posts.
///
/// Returns the scoring side if a goal was given.
pub fn handle_goal(state: &mut GameState, info: &mut MatchInfo, previous_ball: Vector) -> Option<TeamSide> {
    let exit = find_exit(previous_ball, state.ball.position)?;
    let BallExit::GoalLine { goal_x, .. } = exit else {
        return None;
    };
    if !exit.is_goal() {
        return None;
    }

    let conceding = state.side_defending(goal_x);
    let scoring = conceding.opponent();
    let scorer = state
        .last_kicker
        .filter(|&k| TeamSide::of_player(k) == scoring)
        .map(|k| state.players[k].number());

    if scorer.is_some() {
        info.record_shot(scoring, true);
    }
    info.record_goal(state.step, scoring, scorer);

    let (a, b) = info.score();
    tracing::info!(step = state.step, ?scoring, ?scorer, score = %format!("{}:{}", a, b), "Goal");

    state.reset_to_kickoff(conceding);
    Some(scoring)
}

// =============================================================================
// STOPPED SHOTS
// =============================================================================

/// Where a moving ball would cross a goal line before stopping.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShotProjection {
    /// Crossing height
    pub y: f64,
    /// Seconds until the crossing
    pub time: f64,
}

impl ShotProjection {
    /// The crossing lies between the posts.
    pub fn on_target(&self) -> bool {
        is_within_goal_mouth(self.y)
    }
}

/// Project the ball's free motion onto the goal line at `goal_x`.
///
/// Returns None if the ball is slower than [`MIN_SHOT_SPEED`], heading away,
/// or would stop first. With deceleration `a` the distance covered is
/// `d = v·t - a·t²/2`, reached at the smaller root `t = (v - sqrt(v² - 2ad)) / a`.
pub fn project_to_goal_line(position: Vector, movement: Vector, goal_x: f64) -> Option<ShotProjection> {
    let speed = crate::game::entity::step_length_to_speed(movement.length());
    if speed < MIN_SHOT_SPEED {
        return None;
    }
    let direction = movement.normalized();
    if direction.x == 0.0 {
        return None;
    }
    let distance = (goal_x - position.x) / direction.x;
    if distance < 0.0 {
        return None;
    }

    let discriminant = speed * speed - 2.0 * BALL_DECELERATION * distance;
    if discriminant < 0.0 {
        return None;
    }
    let time = (speed - discriminant.sqrt()) / BALL_DECELERATION;

    Some(ShotProjection { y: position.y + direction.y * distance, time })
}

/// Credit a stopped shot when `kicker` takes the ball from the other side.
///
/// Must run before the kick replaces the ball's movement.
pub fn account_stopped_shot(state: &GameState, info: &mut MatchInfo, kicker: usize) {
    let Some(previous) = state.last_touch_side() else {
        return;
    };
    if previous == TeamSide::of_player(kicker) {
        return;
    }

    let goal_x = state.attacked_goal_x(previous);
    if let Some(shot) = project_to_goal_line(state.ball.position, state.ball.movement, goal_x) {
        tracing::debug!(step = state.step, ?previous, on_target = shot.on_target(), "Stopped shot");
        info.record_shot(previous, shot.on_target());
    }
}

/// Per-step ball displacement for a speed.
#[cfg(test)]
pub(crate) fn movement_for_speed(direction: Vector, speed: f64) -> Vector {
    direction.with_length(crate::game::entity::speed_to_step_length(speed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::field::{CENTER, GOAL_POST_HIGH_Y, PLAYER_BOUNDARY_MARGIN};

    fn open_play(seed: u64) -> GameState {
        let mut state = GameState::new(seed);
        state.is_kick_off = false;
        state
    }

    #[test]
    fn test_find_exit() {
        assert_eq!(find_exit(CENTER, CENTER + Vector::new(1.0, 0.0)), None);

        let exit = find_exit(Vector::new(109.0, 37.0), Vector::new(111.0, 39.0));
        assert_eq!(exit, Some(BallExit::GoalLine { goal_x: FIELD_WIDTH, y: 38.0 }));
        assert!(exit.unwrap().is_goal());

        let exit = find_exit(Vector::new(30.0, 1.0), Vector::new(32.0, -1.0));
        assert_eq!(exit, Some(BallExit::TouchLine { line_y: 0.0, x: 31.0 }));

        // Goal line reached first
        let exit = find_exit(Vector::new(1.0, 2.0), Vector::new(-1.0, -2.0));
        assert!(matches!(exit, Some(BallExit::GoalLine { goal_x, .. }) if goal_x == 0.0));
    }

    #[test]
    fn test_throw_in_to_opponent_of_last_toucher() {
        let mut state = open_play(1);
        state.last_kicker = Some(4);
        let before = Vector::new(40.0, 74.5);
        state.ball.position = Vector::new(41.0, 75.5);

        assert!(handle_out_of_bounds(&mut state, before));
        assert_eq!(state.ball.position, Vector::new(40.5, FIELD_HEIGHT));
        assert_eq!(state.ball.movement, Vector::ZERO);
        assert!(state.is_kick_off);
        assert_eq!(state.last_kicker, None);

        // A side B player took the spot, A players are cleared
        assert!(TeamSide::B.player_slots().any(|s| state.players[s].position == state.ball.position));
        for p in state.team(TeamSide::A) {
            assert!(p.position.distance(state.ball.position) >= RESTART_CLEAR_RADIUS - 1e-9);
        }
    }

    #[test]
    fn test_corner_when_attacker_last_touched() {
        let mut state = open_play(1);
        // A defends x = 0; B touched last
        state.last_kicker = Some(15);
        let before = Vector::new(0.5, 10.0);
        state.ball.position = Vector::new(-0.5, 10.0);

        assert!(handle_out_of_bounds(&mut state, before));
        assert_eq!(state.ball.position, Vector::new(0.0, 0.0));
        assert!(TeamSide::B.player_slots().any(|s| state.players[s].position == state.ball.position));
    }

    #[test]
    fn test_cleared_opponent_stays_inside_player_area() {
        let mut state = open_play(1);
        // Slowest possible A player just inside the margin, near the corner
        state.players[1].parameters.speed = 0.0;
        state.players[1].position = Vector::new(-4.9, 0.5);
        state.players[1].movement = Vector::ZERO;
        state.last_kicker = Some(15);
        let before = Vector::new(0.5, 10.0);
        state.ball.position = Vector::new(-0.5, 10.0);

        assert!(handle_out_of_bounds(&mut state, before));
        assert_eq!(state.ball.position, Vector::new(0.0, 0.0));
        let cleared = state.players[1].position;
        assert_eq!(cleared, clamp_to_player_area(cleared));
        assert!((cleared.x - -PLAYER_BOUNDARY_MARGIN).abs() < 1e-9);

        // An idle step afterwards must respect the speed cap
        let mut info = MatchInfo::with_capacity(1);
        crate::game::physics::move_player(&mut state, &mut info, 1, Vector::ZERO);
        let player = &state.players[1];
        assert!(player.current_speed() <= player.max_speed() * 1.0001);
        assert!(info.errors.is_empty());
    }

    #[test]
    fn test_goal_kick_when_defender_last_touched() {
        let mut state = open_play(1);
        state.last_kicker = Some(3);
        let before = Vector::new(0.5, 10.0);
        state.ball.position = Vector::new(-0.5, 10.0);

        assert!(handle_out_of_bounds(&mut state, before));
        assert_eq!(state.ball.position, Vector::new(GOAL_KICK_DISTANCE, FIELD_HEIGHT / 2.0));
        assert_eq!(state.players[0].position, state.ball.position);
    }

    #[test]
    fn test_goal_not_treated_as_out() {
        let mut state = open_play(1);
        let before = Vector::new(109.5, 37.5);
        state.ball.position = Vector::new(110.5, 37.5);
        assert!(!handle_out_of_bounds(&mut state, before));
    }

    #[test]
    fn test_goal_credited_and_kickoff_reset() {
        let mut state = open_play(1);
        let mut info = MatchInfo::default();
        state.step = 300;
        state.last_kicker = Some(20);
        let before = Vector::new(0.5, 37.5);
        state.ball.position = Vector::new(-0.5, 37.0);

        assert_eq!(handle_goal(&mut state, &mut info, before), Some(TeamSide::B));
        assert_eq!(info.score(), (0, 1));
        assert_eq!(info.goals[0].scorer_number, Some(9));
        assert_eq!(info.goals[0].time, "1:00");
        assert_eq!(info.team(TeamSide::B).shots_on_target, 1);

        // Conceding side A kicks off
        assert_eq!(state.ball.position, CENTER);
        assert_eq!(state.players[10].position, Vector::new(54.0, 37.5));
        assert!(state.is_kick_off);
    }

    #[test]
    fn test_own_goal_has_no_scorer() {
        let mut state = open_play(1);
        let mut info = MatchInfo::default();
        state.last_kicker = Some(2);
        let before = Vector::new(0.5, 37.5);
        state.ball.position = Vector::new(-0.5, 37.5);

        assert_eq!(handle_goal(&mut state, &mut info, before), Some(TeamSide::B));
        assert_eq!(info.goals[0].scorer_number, None);
        assert_eq!(info.team(TeamSide::B).shots, 0);
    }

    #[test]
    fn test_projection() {
        let fast = movement_for_speed(Vector::new(1.0, 0.0), 10.0);
        let shot = project_to_goal_line(Vector::new(100.0, 37.5), fast, FIELD_WIDTH).unwrap();
        assert!(shot.on_target());
        assert!(shot.time > 1.0 && shot.time < 1.2);

        // Too slow
        let slow = movement_for_speed(Vector::new(1.0, 0.0), 3.0);
        assert_eq!(project_to_goal_line(Vector::new(100.0, 37.5), slow, FIELD_WIDTH), None);

        // Stops short: 5 m/s covers 25/3 m
        let short = movement_for_speed(Vector::new(1.0, 0.0), 5.0);
        assert_eq!(project_to_goal_line(Vector::new(100.0, 37.5), short, FIELD_WIDTH), None);

        // Heading away
        assert_eq!(project_to_goal_line(Vector::new(100.0, 37.5), -fast, FIELD_WIDTH), None);

        // Wide
        let wide = movement_for_speed(Vector::new(1.0, 1.0), 12.0);
        let shot = project_to_goal_line(Vector::new(100.0, GOAL_POST_HIGH_Y), wide, FIELD_WIDTH).unwrap();
        assert!(!shot.on_target());
    }

    #[test]
    fn test_stopped_shot_credits_previous_side() {
        let mut state = open_play(1);
        let mut info = MatchInfo::default();
        // A attacks x = W
        state.last_kicker = Some(9);
        state.ball.position = Vector::new(100.0, 37.5);
        state.ball.movement = movement_for_speed(Vector::new(1.0, 0.0), 10.0);

        account_stopped_shot(&state, &mut info, 11);
        assert_eq!(info.team(TeamSide::A).shots, 1);
        assert_eq!(info.team(TeamSide::A).shots_on_target, 1);

        // Same side regaining the ball is not a stop
        account_stopped_shot(&state, &mut info, 5);
        assert_eq!(info.team(TeamSide::A).shots, 1);
    }
}
