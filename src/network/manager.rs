//! Match Manager
//!
//! Starts simulator tasks for pairs of idle connections, tracks running
//! matches so they can be cancelled by player name, and publishes each
//! finished match as a [`MatchOutcome`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::core::rng::derive_match_seed;
use crate::game::match_info::MatchInfo;
use crate::network::connection::{Connection, PeerIdentity};
use crate::network::simulator::{MatchSimulator, SimulatorConfig};

/// A finished match, ready for storage.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatchOutcome {
    /// Unique match id
    pub match_id: Uuid,
    /// Seed the match randomness was drawn from
    pub seed: u64,
    /// Side A (slots 0-10)
    pub team_a: PeerIdentity,
    /// Side B (slots 11-21)
    pub team_b: PeerIdentity,
    /// Simulator start
    pub started_at: DateTime<Utc>,
    /// Simulator end
    pub ended_at: DateTime<Utc>,
    /// Full match record
    pub info: MatchInfo,
}

/// Why a match could not start.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ManagerError {
    /// Connection has not logged in, or is gone.
    #[error("connection {0} is not active")]
    Inactive(String),
    /// Connection is already in a match.
    #[error("{0} is already playing")]
    AlreadyPlaying(String),
    /// Both sides are the same connection.
    #[error("a connection cannot play itself")]
    SameConnection,
}

/// Handle to a started match.
#[derive(Debug)]
pub struct StartedMatch {
    /// Unique match id
    pub match_id: Uuid,
    /// Resolves when the match ends; `None` if the match task failed
    pub handle: JoinHandle<Option<MatchOutcome>>,
}

struct RunningMatch {
    match_id: Uuid,
    players: [String; 2],
    cancel: [Arc<AtomicBool>; 2],
}

struct MatchTicket {
    match_id: Uuid,
    seed: u64,
    identities: [PeerIdentity; 2],
    connections: [Arc<Connection>; 2],
    started_at: DateTime<Utc>,
}

/// Owns the running-match table.
pub struct MatchManager {
    config: SimulatorConfig,
    running: Mutex<Vec<RunningMatch>>,
    outcomes: Option<mpsc::Sender<MatchOutcome>>,
}

impl MatchManager {
    /// Create a manager; finished matches go to `outcomes` if given.
    pub fn new(config: SimulatorConfig, outcomes: Option<mpsc::Sender<MatchOutcome>>) -> Arc<Self> {
        Arc::new(Self {
            config,
            running: Mutex::new(Vec::new()),
            outcomes,
        })
    }

    /// Start a match between two active, idle connections.
    pub fn start_match(
        self: &Arc<Self>,
        team_a: Arc<Connection>,
        team_b: Arc<Connection>,
    ) -> Result<StartedMatch, ManagerError> {
        if Arc::ptr_eq(&team_a, &team_b) {
            return Err(ManagerError::SameConnection);
        }
        let identity_a = active_identity(&team_a)?;
        let identity_b = active_identity(&team_b)?;

        if !team_a.try_start_playing() {
            return Err(ManagerError::AlreadyPlaying(identity_a.to_string()));
        }
        if !team_b.try_start_playing() {
            team_a.stop_playing();
            return Err(ManagerError::AlreadyPlaying(identity_b.to_string()));
        }

        let match_id = Uuid::new_v4();
        let seed = derive_match_seed(
            match_id.as_bytes(),
            &[identity_a.player_name.as_str(), identity_b.player_name.as_str()],
        );
        info!(
            %match_id,
            a = %identity_a,
            b = %identity_b,
            seed = %hex::encode(seed.to_be_bytes()),
            "Match starting"
        );

        let simulator = MatchSimulator::new(self.config.clone(), seed, team_a.clone(), team_b.clone());
        self.register(RunningMatch {
            match_id,
            players: [identity_a.player_name.clone(), identity_b.player_name.clone()],
            cancel: simulator.cancel_flags(),
        });

        let ticket = MatchTicket {
            match_id,
            seed,
            identities: [identity_a, identity_b],
            connections: [team_a, team_b],
            started_at: Utc::now(),
        };
        let task = tokio::spawn(simulator.run());
        let handle = tokio::spawn(self.clone().supervise(ticket, task));

        Ok(StartedMatch { match_id, handle })
    }

    fn register(&self, entry: RunningMatch) {
        if let Ok(mut running) = self.running.lock() {
            running.push(entry);
        }
    }

    /// Await a match task, release its connections and publish the result.
    ///
    /// A panicked or aborted match is logged and cleaned up with no outcome.
    async fn supervise(self: Arc<Self>, ticket: MatchTicket, task: JoinHandle<MatchInfo>) -> Option<MatchOutcome> {
        let result = task.await;
        for connection in &ticket.connections {
            connection.stop_playing();
        }

        let info = match result {
            Ok(info) => info,
            Err(e) => {
                error!(match_id = %ticket.match_id, "Match task failed: {}", e);
                self.forget(ticket.match_id);
                return None;
            }
        };

        let [team_a, team_b] = ticket.identities;
        let outcome = MatchOutcome {
            match_id: ticket.match_id,
            seed: ticket.seed,
            team_a,
            team_b,
            started_at: ticket.started_at,
            ended_at: Utc::now(),
            info,
        };
        self.finish(&outcome).await;
        Some(outcome)
    }

    fn forget(&self, match_id: Uuid) {
        if let Ok(mut running) = self.running.lock() {
            running.retain(|m| m.match_id != match_id);
        }
    }

    async fn finish(&self, outcome: &MatchOutcome) {
        self.forget(outcome.match_id);
        if let Some(outcomes) = &self.outcomes {
            if outcomes.send(outcome.clone()).await.is_err() {
                warn!(match_id = %outcome.match_id, "Outcome receiver dropped");
            }
        }
    }

    /// Ask the match `player_name` is in to end at its next step.
    ///
    /// Returns false if the player is not in a running match.
    pub fn cancel_match(&self, player_name: &str) -> bool {
        let Ok(running) = self.running.lock() else {
            return false;
        };
        for entry in running.iter() {
            if let Some(side) = entry.players.iter().position(|p| p == player_name) {
                entry.cancel[side].store(true, Ordering::SeqCst);
                info!(match_id = %entry.match_id, player = player_name, "Match cancellation requested");
                return true;
            }
        }
        false
    }

    /// Number of matches in progress.
    pub fn running_count(&self) -> usize {
        self.running.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Whether `player_name` is in a running match.
    pub fn is_playing(&self, player_name: &str) -> bool {
        self.running
            .lock()
            .map(|r| r.iter().any(|m| m.players.iter().any(|p| p == player_name)))
            .unwrap_or(false)
    }
}

fn active_identity(connection: &Connection) -> Result<PeerIdentity, ManagerError> {
    match connection.identity() {
        Some(identity) if connection.is_active() && connection.is_connected() => Ok(identity),
        _ => Err(ManagerError::Inactive(connection.label())),
    }
}
