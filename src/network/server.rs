//! Match Server
//!
//! Wires the connection registry and the match manager together: accepts
//! AI connections, sweeps dead ones, and pairs idle AIs into matches.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;
use tracing::{debug, info, instrument, warn};

use crate::network::auth::Authenticator;
use crate::network::connection::Connection;
use crate::network::manager::{MatchManager, MatchOutcome};
use crate::network::registry::{ConnectionRegistry, LoggingObserver, RegistryConfig};
use crate::network::simulator::SimulatorConfig;

/// Default listener address.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:50030";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Connection tracking and liveness.
    pub registry: RegistryConfig,
    /// Per-match timeouts.
    pub simulator: SimulatorConfig,
    /// How often idle AIs are paired.
    pub pairing_interval: Duration,
    /// Where finished matches are written.
    pub results_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 50030)),
            registry: RegistryConfig::default(),
            simulator: SimulatorConfig::default(),
            pairing_interval: Duration::from_millis(1000),
            results_dir: PathBuf::from("match-results"),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset variables keep their defaults; malformed ones are an error.
    pub fn from_env() -> Result<Self, GameServerError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, GameServerError> {
        let mut config = Self::default();

        if let Some(value) = lookup("BIND_ADDR") {
            config.bind_addr = value.parse().map_err(|_| GameServerError::Config {
                var: "BIND_ADDR",
                value: value.clone(),
            })?;
        }

        let millis = |var: &'static str, current: Duration| -> Result<Duration, GameServerError> {
            match lookup(var) {
                Some(value) => match value.trim().parse::<u64>() {
                    Ok(ms) => Ok(Duration::from_millis(ms)),
                    Err(_) => Err(GameServerError::Config { var, value }),
                },
                None => Ok(current),
            }
        };

        config.registry.sweep_interval = millis("SWEEP_INTERVAL_MS", config.registry.sweep_interval)?;
        config.registry.connection.send_timeout =
            millis("SEND_TIMEOUT_MS", config.registry.connection.send_timeout)?;
        config.simulator.parameters_timeout = millis("PARAMETERS_TIMEOUT_MS", config.simulator.parameters_timeout)?;
        config.simulator.parameters_retry = millis("PARAMETERS_RETRY_MS", config.simulator.parameters_retry)?;
        config.simulator.action_timeout = millis("ACTION_TIMEOUT_MS", config.simulator.action_timeout)?;
        config.pairing_interval = millis("PAIRING_INTERVAL_MS", config.pairing_interval)?;

        if let Some(dir) = lookup("RESULTS_DIR") {
            config.results_dir = PathBuf::from(dir);
        }

        Ok(config)
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// Environment variable could not be parsed.
    #[error("Invalid value for {var}: {value:?}")]
    Config {
        /// Variable name
        var: &'static str,
        /// Offending value
        value: String,
    },
}

/// The match server.
pub struct GameServer {
    config: ServerConfig,
    registry: Arc<ConnectionRegistry>,
    manager: Arc<MatchManager>,
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a server; finished matches are sent on `outcomes` if given.
    pub fn new(
        config: ServerConfig,
        authenticator: Arc<dyn Authenticator>,
        outcomes: Option<mpsc::Sender<MatchOutcome>>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let registry = ConnectionRegistry::new(config.registry.clone(), authenticator, Arc::new(LoggingObserver));
        let manager = MatchManager::new(config.simulator.clone(), outcomes);

        Self {
            config,
            registry,
            manager,
            shutdown_tx,
        }
    }

    /// Connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Match manager.
    pub fn manager(&self) -> &Arc<MatchManager> {
        &self.manager
    }

    /// Sender that stops [`GameServer::run`] when signalled.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Bind and run until shutdown.
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.run_on(listener).await;
        Ok(())
    }

    /// Run on an already-bound listener until shutdown.
    #[instrument(skip_all)]
    pub async fn run_on(&self, listener: TcpListener) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        if let Ok(addr) = listener.local_addr() {
            info!("Match server listening on {}", addr);
        }

        let accept_handle = tokio::spawn(
            self.registry
                .clone()
                .run_accept_loop(listener, self.shutdown_tx.subscribe()),
        );
        let sweeper_handle = tokio::spawn(self.registry.clone().run_sweeper(self.shutdown_tx.subscribe()));
        let pairing_handle = tokio::spawn(run_pairing_loop(
            self.registry.clone(),
            self.manager.clone(),
            self.config.pairing_interval,
            self.shutdown_tx.subscribe(),
        ));

        let _ = shutdown_rx.recv().await;
        info!("Shutdown signal received");

        for handle in [accept_handle, sweeper_handle, pairing_handle] {
            let _ = handle.await;
        }
        self.registry.shutdown().await;
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

async fn run_pairing_loop(
    registry: Arc<ConnectionRegistry>,
    manager: Arc<MatchManager>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = interval(period);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let started = pair_idle(&manager, registry.idle_connections());
                if started > 0 {
                    debug!(started, running = manager.running_count(), "Paired idle AIs");
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}

/// Pair idle connections in login order; the two sides of a match must
/// belong to different players. Returns how many matches were started.
pub fn pair_idle(manager: &Arc<MatchManager>, idle: Vec<Arc<Connection>>) -> usize {
    let mut waiting: Vec<Arc<Connection>> = idle;
    let mut started = 0;

    while !waiting.is_empty() {
        let first = waiting.remove(0);
        let Some(first_player) = first.identity().map(|i| i.player_name) else {
            continue;
        };
        let partner = waiting
            .iter()
            .position(|c| c.identity().is_some_and(|i| i.player_name != first_player));
        let Some(index) = partner else {
            continue;
        };
        let second = waiting.remove(index);

        match manager.start_match(first, second) {
            Ok(_) => started += 1,
            Err(e) => warn!("Could not start match: {}", e),
        }
    }
    started
}
