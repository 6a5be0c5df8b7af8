//! Match Record
//!
//! Everything a finished match hands to its caller: the flattened position
//! history, goals, logged rule violations, per-side statistics and the
//! winner. Created at kickoff, appended every step, frozen at the end.

use serde::{Serialize, Deserialize};

use crate::core::field::match_time;
use crate::game::entity::TeamSide;
use crate::game::state::GameState;
use crate::STEP_INTERVAL_MS;

/// Logged errors retained per reason per side.
pub const MAX_ERRORS_PER_REASON: u8 = 5;

// =============================================================================
// ERRORS
// =============================================================================

/// Why a side's input was corrected, or why the match ended early.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorReason {
    /// Movement beyond the player's max speed
    TooHighSpeed,
    /// Movement change beyond the max acceleration
    TooHighAcceleration,
    /// Kick beyond the kicker's max kick speed
    TooStrongKick,
    /// NaN or infinite movement
    InvalidMovementVector,
    /// NaN or infinite kick
    InvalidKickVector,
    /// Side's connection dropped
    Disconnection,
    /// Side asked to abandon the match
    Cancellation,
}

impl ErrorReason {
    /// Number of variants.
    pub const COUNT: usize = 7;

    /// Ordinal, used to index per-reason counters.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Match-ending reasons bypass the per-reason cap.
    #[inline]
    pub fn ends_match(self) -> bool {
        matches!(self, ErrorReason::Disconnection | ErrorReason::Cancellation)
    }
}

/// A logged rule violation or match-ending event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationError {
    /// Match clock, `m:ss`
    pub time: String,
    /// What happened
    pub reason: ErrorReason,
    /// Side at fault
    pub team: TeamSide,
    /// Player number within the side, if one player caused it
    pub player_number: Option<u8>,
}

/// A scored goal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    /// Match clock, `m:ss`
    pub time: String,
    /// Side credited with the goal
    pub team: TeamSide,
    /// Last toucher's number, absent for own goals
    pub scorer_number: Option<u8>,
}

/// Per-side counters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamStatistics {
    /// Goals scored
    pub goals: u32,
    /// Shots, including stopped shots
    pub shots: u32,
    /// Shots heading between the posts
    pub shots_on_target: u32,
    /// Mean delay between `GET ACTION` and a usable reply
    pub average_action_latency_ms: f64,
}

// =============================================================================
// MATCH INFO
// =============================================================================

/// The accumulating simulation record.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MatchInfo {
    /// Ball xy then 22 players xy, appended once per step
    pub match_data: Vec<f32>,
    /// Goals in order
    pub goals: Vec<Goal>,
    /// Logged errors in order
    pub errors: Vec<SimulationError>,
    /// Statistics indexed by [`TeamSide::index`]
    pub teams: [TeamStatistics; 2],
    /// None for a draw
    pub winner: Option<TeamSide>,
    /// Steps that ran to completion
    pub steps_completed: u32,

    #[serde(skip)]
    error_counts: [[u8; ErrorReason::COUNT]; 2],
}

impl MatchInfo {
    /// Empty record with room for a full match.
    pub fn with_capacity(number_of_steps: u32) -> Self {
        Self {
            match_data: Vec::with_capacity(number_of_steps as usize * crate::VALUES_PER_STEP),
            ..Self::default()
        }
    }

    /// Statistics for one side.
    #[inline]
    pub fn team(&self, side: TeamSide) -> &TeamStatistics {
        &self.teams[side.index()]
    }

    /// Mutable statistics for one side.
    #[inline]
    pub fn team_mut(&mut self, side: TeamSide) -> &mut TeamStatistics {
        &mut self.teams[side.index()]
    }

    /// Log an error at the given step, subject to the per-reason cap.
    ///
    /// Returns whether the entry was retained.
    pub fn log_error(
        &mut self,
        step: u32,
        reason: ErrorReason,
        team: TeamSide,
        player_number: Option<u8>,
    ) -> bool {
        if !reason.ends_match() {
            let count = &mut self.error_counts[team.index()][reason.index()];
            if *count >= MAX_ERRORS_PER_REASON {
                return false;
            }
            *count += 1;
        }

        tracing::debug!(step, ?reason, ?team, ?player_number, "Rule violation");
        self.errors.push(SimulationError {
            time: match_time(step, STEP_INTERVAL_MS),
            reason,
            team,
            player_number,
        });
        true
    }

    /// Count of retained errors with this reason for one side.
    pub fn error_count(&self, team: TeamSide, reason: ErrorReason) -> usize {
        self.errors
            .iter()
            .filter(|e| e.team == team && e.reason == reason)
            .count()
    }

    /// Credit a shot.
    pub fn record_shot(&mut self, team: TeamSide, on_target: bool) {
        let stats = self.team_mut(team);
        stats.shots += 1;
        if on_target {
            stats.shots_on_target += 1;
        }
    }

    /// Credit a goal and append it to the goal list.
    pub fn record_goal(&mut self, step: u32, team: TeamSide, scorer_number: Option<u8>) {
        self.team_mut(team).goals += 1;
        self.goals.push(Goal {
            time: match_time(step, STEP_INTERVAL_MS),
            team,
            scorer_number,
        });
    }

    /// Append the ball and all 22 player positions.
    pub fn record_positions(&mut self, state: &GameState) {
        state.write_positions(&mut self.match_data);
    }

    /// Set the winner from the goal counts alone.
    pub fn decide_winner_by_goals(&mut self) {
        let a = self.team(TeamSide::A).goals;
        let b = self.team(TeamSide::B).goals;
        self.winner = match a.cmp(&b) {
            std::cmp::Ordering::Greater => Some(TeamSide::A),
            std::cmp::Ordering::Less => Some(TeamSide::B),
            std::cmp::Ordering::Equal => None,
        };
    }

    /// Score as `(A, B)`.
    pub fn score(&self) -> (u32, u32) {
        (self.team(TeamSide::A).goals, self.team(TeamSide::B).goals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_cap_per_reason_and_side() {
        let mut info = MatchInfo::default();
        for step in 0..10 {
            info.log_error(step, ErrorReason::TooHighSpeed, TeamSide::A, Some(3));
        }
        assert_eq!(info.error_count(TeamSide::A, ErrorReason::TooHighSpeed), 5);

        // Other reasons and the other side have their own budget
        assert!(info.log_error(10, ErrorReason::TooStrongKick, TeamSide::A, Some(3)));
        assert!(info.log_error(10, ErrorReason::TooHighSpeed, TeamSide::B, Some(3)));
        assert_eq!(info.errors.len(), 7);
    }

    #[test]
    fn test_match_ending_reasons_not_capped() {
        let mut info = MatchInfo::default();
        for step in 0..7 {
            assert!(info.log_error(step, ErrorReason::Disconnection, TeamSide::B, None));
        }
        assert_eq!(info.error_count(TeamSide::B, ErrorReason::Disconnection), 7);
    }

    #[test]
    fn test_error_time_format() {
        let mut info = MatchInfo::default();
        info.log_error(400, ErrorReason::Disconnection, TeamSide::A, None);
        assert_eq!(info.errors[0].time, "1:20");
    }

    #[test]
    fn test_winner_by_goals() {
        let mut info = MatchInfo::default();
        info.decide_winner_by_goals();
        assert_eq!(info.winner, None);

        info.record_goal(10, TeamSide::B, Some(9));
        info.decide_winner_by_goals();
        assert_eq!(info.winner, Some(TeamSide::B));
        assert_eq!(info.score(), (0, 1));
        assert_eq!(info.goals[0].time, "0:02");
    }

    #[test]
    fn test_shots() {
        let mut info = MatchInfo::default();
        info.record_shot(TeamSide::A, true);
        info.record_shot(TeamSide::A, false);
        assert_eq!(info.team(TeamSide::A).shots, 2);
        assert_eq!(info.team(TeamSide::A).shots_on_target, 1);
    }
}
