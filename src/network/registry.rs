//! Connection Registry
//!
//! Accepts sockets, runs the LOGIN handshake against the configured
//! [`Authenticator`], tracks which connections are active, and sweeps dead
//! ones on a fixed interval while keeping idle ones alive.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::network::auth::{AuthError, Authenticator};
use crate::network::connection::{Connection, ConnectionConfig, PeerIdentity};
use crate::network::protocol::{ClientMessage, LoginMessage, ServerMessage};

/// Reply to anything but a LOGIN before login.
pub const LOGIN_FORMAT_ERROR: &str = "expected: LOGIN <player> <ai> <key>";

/// Registry settings.
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// Period of the liveness sweep
    pub sweep_interval: Duration,
    /// Per-connection settings
    pub connection: ConnectionConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_millis(5000),
            connection: ConnectionConfig::default(),
        }
    }
}

/// Hooks invoked on login and on removal of a dead connection.
pub trait RegistryObserver: Send + Sync + 'static {
    /// A connection finished the handshake.
    fn client_logged_in(&self, _connection: &Arc<Connection>) {}

    /// A connection was found dead by the sweep.
    fn client_disconnected(&self, _connection: &Arc<Connection>) {}
}

/// Observer that only logs.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingObserver;

impl RegistryObserver for LoggingObserver {
    fn client_logged_in(&self, connection: &Arc<Connection>) {
        info!(connection = connection.id(), peer = %connection.label(), "Client logged in");
    }

    fn client_disconnected(&self, connection: &Arc<Connection>) {
        info!(connection = connection.id(), peer = %connection.label(), "Client disconnected");
    }
}

/// Where a connection is in the login handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandshakeState {
    /// Waiting for a LOGIN line
    AwaitingLogin,
    /// Authenticator running
    Authenticating(LoginMessage),
    /// Logged in
    Active,
    /// Last attempt refused; back to waiting
    Rejected(String),
    /// Peer left before logging in
    Closed,
}

/// Tracks every accepted connection and the logged-in subset.
pub struct ConnectionRegistry {
    config: RegistryConfig,
    authenticator: Arc<dyn Authenticator>,
    observer: Arc<dyn RegistryObserver>,
    all: Mutex<Vec<Arc<Connection>>>,
    active: Mutex<Vec<Arc<Connection>>>,
    handshakes: Mutex<Vec<JoinHandle<HandshakeState>>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new(
        config: RegistryConfig,
        authenticator: Arc<dyn Authenticator>,
        observer: Arc<dyn RegistryObserver>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            authenticator,
            observer,
            all: Mutex::new(Vec::new()),
            active: Mutex::new(Vec::new()),
            handshakes: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        })
    }

    // =========================================================================
    // SNAPSHOTS
    // =========================================================================

    /// Every tracked connection.
    pub fn all_connections(&self) -> Vec<Arc<Connection>> {
        self.all.lock().map(|all| all.clone()).unwrap_or_default()
    }

    /// Logged-in connections.
    pub fn active_connections(&self) -> Vec<Arc<Connection>> {
        self.active.lock().map(|active| active.clone()).unwrap_or_default()
    }

    /// Logged-in connections not in a match.
    pub fn idle_connections(&self) -> Vec<Arc<Connection>> {
        self.active_connections()
            .into_iter()
            .filter(|c| c.is_active() && c.is_connected() && !c.is_playing())
            .collect()
    }

    // =========================================================================
    // ACCEPT + HANDSHAKE
    // =========================================================================

    /// Accept sockets until shutdown.
    #[instrument(skip_all)]
    pub async fn run_accept_loop(self: Arc<Self>, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                result = listener.accept() => match result {
                    Ok((stream, addr)) => {
                        info!("New connection from {}", addr);
                        self.accept(stream);
                    }
                    Err(e) => error!("Accept error: {}", e),
                },
                _ = shutdown.recv() => {
                    debug!("Accept loop stopping");
                    break;
                }
            }
        }
    }

    /// Track a new socket and start its handshake in the background.
    pub fn accept(self: &Arc<Self>, stream: TcpStream) -> Arc<Connection> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let connection = Connection::new(stream, id, self.config.connection.clone());

        if let Ok(mut all) = self.all.lock() {
            all.push(connection.clone());
        }

        let registry = self.clone();
        let handshake_conn = connection.clone();
        let handle = tokio::spawn(async move { registry.handshake(handshake_conn).await });
        if let Ok(mut handshakes) = self.handshakes.lock() {
            handshakes.retain(|h| !h.is_finished());
            handshakes.push(handle);
        }

        connection
    }

    /// Drive one connection from `AwaitingLogin` to `Active` or `Closed`.
    async fn handshake(&self, connection: Arc<Connection>) -> HandshakeState {
        let mut state = HandshakeState::AwaitingLogin;
        loop {
            state = match state {
                HandshakeState::AwaitingLogin | HandshakeState::Rejected(_) => {
                    match connection.receive_message().await {
                        None => HandshakeState::Closed,
                        Some(ClientMessage::Login(login)) => HandshakeState::Authenticating(login),
                        Some(other) => {
                            debug!(connection = connection.id(), kind = other.kind(), "Message before login");
                            connection.try_send(&ServerMessage::Error(LOGIN_FORMAT_ERROR.into())).await;
                            HandshakeState::AwaitingLogin
                        }
                    }
                }
                HandshakeState::Authenticating(login) => match self.login(&connection, &login).await {
                    Ok(()) => HandshakeState::Active,
                    Err(e) => {
                        warn!(connection = connection.id(), player = %login.player_name, reason = %e, "Login rejected");
                        connection.try_send(&ServerMessage::Error(e.to_string())).await;
                        HandshakeState::Rejected(e.to_string())
                    }
                },
                done @ (HandshakeState::Active | HandshakeState::Closed) => return done,
            };
        }
    }

    async fn login(&self, connection: &Arc<Connection>, login: &LoginMessage) -> Result<(), AuthError> {
        self.authenticator.authenticate(login).await?;

        let identity = PeerIdentity {
            player_name: login.player_name.clone(),
            ai_name: login.ai_name.clone(),
        };
        {
            let mut active = self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let duplicate = active
                .iter()
                .any(|c| c.is_active() && c.is_connected() && c.identity().as_ref() == Some(&identity));
            if duplicate {
                return Err(AuthError::AlreadyConnected(identity.to_string()));
            }
            connection.set_identity(identity);
            connection.set_active(true);
            active.push(connection.clone());
        }

        connection.try_send(&ServerMessage::Connected).await;
        self.observer.client_logged_in(connection);
        Ok(())
    }

    /// Wait for every handshake started so far.
    pub async fn wait_for_handshakes(&self) -> Vec<HandshakeState> {
        let handles: Vec<_> = match self.handshakes.lock() {
            Ok(mut handshakes) => handshakes.drain(..).collect(),
            Err(_) => return Vec::new(),
        };

        let mut states = Vec::with_capacity(handles.len());
        for result in join_all(handles).await {
            match result {
                Ok(state) => states.push(state),
                Err(e) if e.is_cancelled() => {}
                Err(e) => error!("Handshake task failed: {}", e),
            }
        }
        states
    }

    // =========================================================================
    // SWEEP
    // =========================================================================

    /// Sweep on the configured interval until shutdown.
    #[instrument(skip_all)]
    pub async fn run_sweeper(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.config.sweep_interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                _ = shutdown.recv() => break,
            }
        }
    }

    /// One liveness pass. Returns how many connections were removed.
    ///
    /// Dead connections are deactivated and reported to the observer; live
    /// idle ones get a keepalive. Removal happens after those tasks finish.
    pub async fn sweep(&self) -> usize {
        let snapshot = self.all_connections();
        let mut dead = Vec::new();
        let mut tasks = Vec::new();

        for connection in snapshot {
            if !connection.is_connected() {
                connection.set_active(false);
                let observer = self.observer.clone();
                let conn = connection.clone();
                tasks.push(tokio::spawn(async move { observer.client_disconnected(&conn) }));
                dead.push(connection);
            } else if !connection.is_playing() {
                let conn = connection.clone();
                tasks.push(tokio::spawn(async move {
                    conn.try_send(&ServerMessage::Keepalive).await;
                }));
            }
        }

        for result in join_all(tasks).await {
            if let Err(e) = result {
                error!("Sweep task failed: {}", e);
            }
        }

        if let Ok(mut all) = self.all.lock() {
            all.retain(|c| !dead.iter().any(|d| Arc::ptr_eq(c, d)));
        }
        if let Ok(mut active) = self.active.lock() {
            active.retain(|c| c.is_active());
        }

        for connection in &dead {
            connection.dispose().await;
        }
        if !dead.is_empty() {
            info!(removed = dead.len(), "Swept dead connections");
        }
        dead.len()
    }

    /// Dispose every connection.
    pub async fn shutdown(&self) {
        let all = match self.all.lock() {
            Ok(mut all) => std::mem::take(&mut *all),
            Err(_) => Vec::new(),
        };
        if let Ok(mut active) = self.active.lock() {
            active.clear();
        }
        for connection in all {
            connection.dispose().await;
        }
        if let Ok(mut handshakes) = self.handshakes.lock() {
            for handle in handshakes.drain(..) {
                handle.abort();
            }
        }
    }
}
