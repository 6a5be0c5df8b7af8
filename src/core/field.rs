//! Pitch Geometry
//!
//! The pitch spans `[0, FIELD_WIDTH] x [0, FIELD_HEIGHT]`. Goal lines are
//! `x = 0` and `x = FIELD_WIDTH`; touch lines are `y = 0` and `y = FIELD_HEIGHT`.

use super::vector::Vector;

/// Pitch length (goal line to goal line), meters.
pub const FIELD_WIDTH: f64 = 110.0;

/// Pitch width (touch line to touch line), meters.
pub const FIELD_HEIGHT: f64 = 75.0;

/// Distance between the goal posts, meters.
pub const GOAL_WIDTH: f64 = 7.32;

/// Y coordinate of the post nearer to `y = 0`.
pub const GOAL_POST_LOW_Y: f64 = (FIELD_HEIGHT - GOAL_WIDTH) / 2.0;

/// Y coordinate of the post nearer to `y = FIELD_HEIGHT`.
pub const GOAL_POST_HIGH_Y: f64 = (FIELD_HEIGHT + GOAL_WIDTH) / 2.0;

/// How far outside the lines a player may run, per axis.
pub const PLAYER_BOUNDARY_MARGIN: f64 = 5.0;

/// Centre spot.
pub const CENTER: Vector = Vector::new(FIELD_WIDTH / 2.0, FIELD_HEIGHT / 2.0);

/// Whether a goal-line crossing at `y` lies between the posts.
#[inline]
pub fn is_within_goal_mouth(y: f64) -> bool {
    (GOAL_POST_LOW_Y..=GOAL_POST_HIGH_Y).contains(&y)
}

/// Clamp a point into the area players are allowed to occupy.
#[inline]
pub fn clamp_to_player_area(p: Vector) -> Vector {
    Vector::new(
        p.x.clamp(-PLAYER_BOUNDARY_MARGIN, FIELD_WIDTH + PLAYER_BOUNDARY_MARGIN),
        p.y.clamp(-PLAYER_BOUNDARY_MARGIN, FIELD_HEIGHT + PLAYER_BOUNDARY_MARGIN),
    )
}

/// Format a match clock value (`m:ss`) for the given step.
pub fn match_time(step: u32, step_interval_ms: u32) -> String {
    let total_secs = step as u64 * step_interval_ms as u64 / 1000;
    format!("{}:{:02}", total_secs / 60, total_secs % 60)
}
