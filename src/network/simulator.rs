//! Match Simulator
//!
//! Runs one match between two logged-in connections: parameter negotiation,
//! the step loop with its per-step deadline, and the final result. The game
//! state and match record live inside the simulator and nowhere else.
//!
//! ```text
//! Starting ──> FirstHalf ──> SecondHalf ──> Ended
//!     │            │              │           ^
//!     └────────────┴──────────────┴───────────┘  (disconnect / cancel)
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, instrument, warn};

use crate::game::entity::TeamSide;
use crate::game::input::{TeamAction, TeamParameters};
use crate::game::match_info::{ErrorReason, MatchInfo};
use crate::game::state::GameState;
use crate::game::tick::{self, Half};
use crate::network::connection::Connection;
use crate::network::protocol::{GameStateFrame, ServerMessage};
use crate::NUMBER_OF_STEPS;

/// Simulator timing.
#[derive(Clone, Debug)]
pub struct SimulatorConfig {
    /// How long a side may take to supply parameters
    pub parameters_timeout: Duration,
    /// Resend `GET PARAMETERS` this often while waiting
    pub parameters_retry: Duration,
    /// Per-step deadline for actions
    pub action_timeout: Duration,
    /// Steps in a full match
    pub number_of_steps: u32,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            parameters_timeout: Duration::from_millis(1000),
            parameters_retry: Duration::from_millis(250),
            action_timeout: Duration::from_millis(600),
            number_of_steps: NUMBER_OF_STEPS,
        }
    }
}

/// Match lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchPhase {
    /// Negotiating parameters
    Starting,
    /// Steps before half time
    FirstHalf,
    /// Steps after half time
    SecondHalf,
    /// Result frozen
    Ended,
}

/// Result of one side's exchange for a step.
struct Exchange {
    action: Option<TeamAction>,
    elapsed: Duration,
}

/// One match between two connections.
pub struct MatchSimulator {
    config: SimulatorConfig,
    sides: [Arc<Connection>; 2],
    cancel: [Arc<AtomicBool>; 2],
    state: GameState,
    info: MatchInfo,
    phase: MatchPhase,
    latency_sum: [Duration; 2],
}

impl MatchSimulator {
    /// Set up a match; `team_a` plays slots 0-10, `team_b` 11-21.
    pub fn new(config: SimulatorConfig, seed: u64, team_a: Arc<Connection>, team_b: Arc<Connection>) -> Self {
        let info = MatchInfo::with_capacity(config.number_of_steps);
        Self {
            config,
            sides: [team_a, team_b],
            cancel: [Arc::new(AtomicBool::new(false)), Arc::new(AtomicBool::new(false))],
            state: GameState::new(seed),
            info,
            phase: MatchPhase::Starting,
            latency_sum: [Duration::ZERO; 2],
        }
    }

    /// Flags that, once set, end the match at the next step boundary.
    pub fn cancel_flags(&self) -> [Arc<AtomicBool>; 2] {
        self.cancel.clone()
    }

    /// Current phase.
    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    /// Play the match to the end and hand back its record.
    #[instrument(skip(self), fields(a = %self.sides[0].label(), b = %self.sides[1].label()))]
    pub async fn run(mut self) -> MatchInfo {
        self.resolve_parameters().await;

        while self.state.step < self.config.number_of_steps {
            if let Some(reason) = self.stop_reason() {
                info!(step = self.state.step, reason, "Match ending early");
                break;
            }
            self.play_step().await;
        }

        self.finish();
        self.info
    }

    // =========================================================================
    // STARTING
    // =========================================================================

    /// Ask both sides for parameters concurrently; invalid or missing sets
    /// fall back to the default traits for that side only.
    async fn resolve_parameters(&mut self) {
        let (a, b) = tokio::join!(
            request_parameters(&self.sides[0], &self.config),
            request_parameters(&self.sides[1], &self.config),
        );

        for (side, received) in TeamSide::BOTH.into_iter().zip([a, b]) {
            let parameters = match received {
                Some(p) if p.is_valid() => p,
                Some(_) => {
                    warn!(?side, "Parameters over the trait caps, using defaults");
                    TeamParameters::fallback()
                }
                None => {
                    debug!(?side, "No parameters received, using defaults");
                    TeamParameters::fallback()
                }
            };
            self.state.set_parameters(side, &parameters);
        }
    }

    // =========================================================================
    // STEP LOOP
    // =========================================================================

    fn enter(&mut self, phase: MatchPhase) {
        debug!(from = ?self.phase, to = ?phase, step = self.state.step, "Match phase");
        self.phase = phase;
    }

    fn stop_reason(&self) -> Option<&'static str> {
        if self.cancel.iter().any(|c| c.load(Ordering::SeqCst)) {
            return Some("cancelled");
        }
        if self.sides.iter().any(|c| !c.is_connected() || !c.is_active()) {
            return Some("disconnected");
        }
        None
    }

    async fn play_step(&mut self) {
        match tick::prepare_step(&mut self.state, self.config.number_of_steps) {
            Some(Half::First) => self.enter(MatchPhase::FirstHalf),
            Some(Half::Second) => {
                let (a, b) = self.info.score();
                info!(score = %format!("{}:{}", a, b), "Half time");
                self.enter(MatchPhase::SecondHalf);
            }
            None => {}
        }

        let step = self.state.step;
        let frames = TeamSide::BOTH.map(|side| GameStateFrame::for_side(&self.state, side));
        // One-shot flag: it has been captured in the frames
        self.state.is_kick_off = false;

        let [frame_a, frame_b] = frames;
        let deadline = Instant::now() + self.config.action_timeout;
        let (a, b) = tokio::join!(
            exchange(&self.sides[0], frame_a, step, deadline),
            exchange(&self.sides[1], frame_b, step, deadline),
        );

        self.latency_sum[0] += a.elapsed;
        self.latency_sum[1] += b.elapsed;

        tick::step(&mut self.state, &mut self.info, [a.action.as_ref(), b.action.as_ref()]);
    }

    // =========================================================================
    // ENDED
    // =========================================================================

    fn finish(&mut self) {
        let step = self.state.step;
        self.info.decide_winner_by_goals();

        for side in TeamSide::BOTH {
            let connection = &self.sides[side.index()];
            if !connection.is_connected() || !connection.is_active() {
                self.info.winner = Some(side.opponent());
                self.info.log_error(step, ErrorReason::Disconnection, side, None);
            }
        }
        for side in TeamSide::BOTH {
            if self.cancel[side.index()].load(Ordering::SeqCst) {
                self.info.winner = Some(side.opponent());
                self.info.log_error(step, ErrorReason::Cancellation, side, None);
            }
        }

        let completed = self.info.steps_completed;
        if completed > 0 {
            for side in TeamSide::BOTH {
                let average = self.latency_sum[side.index()].as_secs_f64() * 1000.0 / completed as f64;
                self.info.team_mut(side).average_action_latency_ms = average;
            }
        }

        self.enter(MatchPhase::Ended);
        let (a, b) = self.info.score();
        info!(
            score = %format!("{}:{}", a, b),
            winner = ?self.info.winner,
            steps = completed,
            "Match ended"
        );
    }
}

/// Keep asking for parameters until they arrive or the overall timeout ends the loop.
async fn request_parameters(connection: &Connection, config: &SimulatorConfig) -> Option<TeamParameters> {
    let retrying = async {
        loop {
            if !connection.try_send(&ServerMessage::GetParameters).await && !connection.is_connected() {
                return None;
            }
            match timeout(config.parameters_retry, connection.receive_parameters()).await {
                Ok(received) => return received,
                Err(_) => debug!(connection = connection.id(), "Re-requesting parameters"),
            }
        }
    };
    timeout(config.parameters_timeout, retrying).await.ok().flatten()
}

/// Send the frame and wait for the matching action until `deadline`.
async fn exchange(connection: &Connection, frame: GameStateFrame, step: u32, deadline: Instant) -> Exchange {
    let sent_at = Instant::now();
    connection.try_send(&ServerMessage::GetAction(frame)).await;

    let action = match timeout_at(deadline, connection.receive_action(step)).await {
        Ok(action) => action,
        Err(_) => {
            debug!(connection = connection.id(), step, "Action deadline missed");
            None
        }
    };
    Exchange { action, elapsed: sent_at.elapsed() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::field::CENTER;
    use crate::network::test_support::{active_pair, BotBehavior};
    use crate::VALUES_PER_STEP;

    fn fast_config(number_of_steps: u32) -> SimulatorConfig {
        SimulatorConfig {
            parameters_timeout: Duration::from_millis(300),
            parameters_retry: Duration::from_millis(100),
            action_timeout: Duration::from_millis(600),
            number_of_steps,
        }
    }

    #[tokio::test]
    async fn test_full_match_of_idle_bots_is_a_draw() {
        let (a, bot_a) = active_pair("alice", BotBehavior::Idle).await;
        let (b, bot_b) = active_pair("bob", BotBehavior::Idle).await;

        let simulator = MatchSimulator::new(SimulatorConfig::default(), 7, a, b);
        let info = simulator.run().await;

        assert_eq!(info.steps_completed, NUMBER_OF_STEPS);
        assert_eq!(info.match_data.len(), NUMBER_OF_STEPS as usize * VALUES_PER_STEP);
        assert_eq!(info.score(), (0, 0));
        assert_eq!(info.winner, None);
        assert!(info.errors.is_empty());

        let last = info.match_data.len() - VALUES_PER_STEP;
        assert!((info.match_data[last] as f64 - CENTER.x).abs() < 1.0);

        bot_a.abort();
        bot_b.abort();
    }

    #[tokio::test]
    async fn test_disconnect_ends_match_for_opponent() {
        let (a, _bot_a) = active_pair("alice", BotBehavior::DisconnectAtStep(399)).await;
        let (b, _bot_b) = active_pair("bob", BotBehavior::Idle).await;

        let info = MatchSimulator::new(SimulatorConfig::default(), 7, a, b).run().await;

        assert_eq!(info.steps_completed, 400);
        assert_eq!(info.match_data.len(), 400 * VALUES_PER_STEP);
        assert_eq!(info.winner, Some(TeamSide::B));
        assert_eq!(info.error_count(TeamSide::A, ErrorReason::Disconnection), 1);
        assert_eq!(info.error_count(TeamSide::B, ErrorReason::Disconnection), 0);
    }

    #[tokio::test]
    async fn test_silent_parameters_fall_back_to_defaults() {
        let mut strong = TeamParameters::fallback();
        strong.players[0].speed = 0.4;
        strong.players[0].possession = 0.1;
        let (a, _bot_a) = active_pair("alice", BotBehavior::NoParameters).await;
        let (b, _bot_b) = active_pair("bob", BotBehavior::WithParameters(strong)).await;

        let mut simulator = MatchSimulator::new(fast_config(4), 7, a, b);
        simulator.resolve_parameters().await;

        assert_eq!(simulator.state.players[0].parameters, crate::game::entity::PlayerParameters::DEFAULT);
        assert!((simulator.state.players[11].parameters.speed - 0.4).abs() < 1e-6);
        assert!((simulator.state.players[12].parameters.speed - 0.25).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_invalid_parameters_rejected_for_that_side() {
        let mut greedy = TeamParameters::fallback();
        greedy.players[5].speed = 0.4;
        let (a, _bot_a) = active_pair("alice", BotBehavior::WithParameters(greedy)).await;
        let (b, _bot_b) = active_pair("bob", BotBehavior::Idle).await;

        let mut simulator = MatchSimulator::new(fast_config(2), 7, a, b);
        simulator.resolve_parameters().await;
        assert_eq!(simulator.state.players[5].parameters, crate::game::entity::PlayerParameters::DEFAULT);
    }

    #[tokio::test]
    async fn test_cancellation_awards_opponent() {
        let (a, _bot_a) = active_pair("alice", BotBehavior::Idle).await;
        let (b, _bot_b) = active_pair("bob", BotBehavior::Idle).await;

        let simulator = MatchSimulator::new(fast_config(NUMBER_OF_STEPS), 7, a, b);
        let [_, cancel_b] = simulator.cancel_flags();
        cancel_b.store(true, Ordering::SeqCst);
        let info = simulator.run().await;

        assert_eq!(info.steps_completed, 0);
        assert!(info.match_data.is_empty());
        assert_eq!(info.winner, Some(TeamSide::A));
        assert_eq!(info.error_count(TeamSide::B, ErrorReason::Cancellation), 1);
    }

    #[tokio::test]
    async fn test_cancellation_checked_after_disconnection() {
        let (a, _bot_a) = active_pair("alice", BotBehavior::CloseImmediately).await;
        let (b, _bot_b) = active_pair("bob", BotBehavior::Idle).await;

        let simulator = MatchSimulator::new(fast_config(NUMBER_OF_STEPS), 7, a, b);
        let [_, cancel_b] = simulator.cancel_flags();
        cancel_b.store(true, Ordering::SeqCst);
        let info = simulator.run().await;

        // A left and B gave up: the later rule decides
        assert_eq!(info.error_count(TeamSide::A, ErrorReason::Disconnection), 1);
        assert_eq!(info.error_count(TeamSide::B, ErrorReason::Cancellation), 1);
        assert_eq!(info.winner, Some(TeamSide::A));
    }

    #[tokio::test]
    async fn test_slow_side_times_out_without_stalling() {
        let (a, _bot_a) = active_pair("alice", BotBehavior::Mute).await;
        let (b, _bot_b) = active_pair("bob", BotBehavior::Idle).await;

        let config = SimulatorConfig {
            action_timeout: Duration::from_millis(50),
            ..fast_config(5)
        };
        let started = std::time::Instant::now();
        let info = MatchSimulator::new(config, 7, a, b).run().await;

        assert_eq!(info.steps_completed, 5);
        assert!(info.errors.is_empty());
        assert!(info.team(TeamSide::A).average_action_latency_ms >= 40.0);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_phases_follow_the_halves() {
        let (a, _bot_a) = active_pair("alice", BotBehavior::Idle).await;
        let (b, _bot_b) = active_pair("bob", BotBehavior::Idle).await;

        let mut simulator = MatchSimulator::new(fast_config(4), 7, a, b);
        assert_eq!(simulator.phase(), MatchPhase::Starting);
        simulator.resolve_parameters().await;
        assert_eq!(simulator.phase(), MatchPhase::Starting);

        let mut seen = Vec::new();
        for _ in 0..4 {
            simulator.play_step().await;
            seen.push(simulator.phase());
        }
        assert_eq!(
            seen,
            vec![MatchPhase::FirstHalf, MatchPhase::FirstHalf, MatchPhase::SecondHalf, MatchPhase::SecondHalf]
        );

        simulator.finish();
        assert_eq!(simulator.phase(), MatchPhase::Ended);
    }

    #[tokio::test]
    async fn test_latency_averaged_over_completed_steps() {
        let (a, _bot_a) = active_pair("alice", BotBehavior::Mute).await;
        let (b, _bot_b) = active_pair("bob", BotBehavior::Idle).await;

        let config = SimulatorConfig {
            action_timeout: Duration::from_millis(50),
            ..fast_config(3)
        };
        let mut simulator = MatchSimulator::new(config, 7, a, b);
        simulator.resolve_parameters().await;
        for _ in 0..3 {
            simulator.play_step().await;
        }
        let sums = simulator.latency_sum;
        simulator.finish();
        let info = &simulator.info;

        assert_eq!(info.steps_completed, 3);
        for side in TeamSide::BOTH {
            let expected = sums[side.index()].as_secs_f64() * 1000.0 / 3.0;
            assert!((info.team(side).average_action_latency_ms - expected).abs() < 1e-9);
        }
        // The mute side waits out every deadline; the responsive one answers at once
        assert!(info.team(TeamSide::A).average_action_latency_ms >= 40.0);
        assert!(info.team(TeamSide::B).average_action_latency_ms < 40.0);
    }
}
