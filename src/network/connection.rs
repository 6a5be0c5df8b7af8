//! Peer Connection
//!
//! One AI's TCP stream. A reader task decodes messages into a bounded queue
//! so receives can be raced against deadlines and dropped without losing
//! stream framing; writes are best effort and bounded by a timeout.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::game::input::{TeamAction, TeamParameters};
use crate::network::protocol::{ClientMessage, MessageReader, ServerMessage};

/// Connection identifier, unique per registry.
pub type ConnectionId = u64;

/// Who is on the other end, known after login.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PeerIdentity {
    /// Account name
    pub player_name: String,
    /// AI program name
    pub ai_name: String,
}

impl std::fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.player_name, self.ai_name)
    }
}

/// Connection settings.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Bound on one best-effort write
    pub send_timeout: Duration,
    /// Decoded messages buffered before new ones are dropped
    pub inbox_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_millis(500),
            inbox_capacity: 64,
        }
    }
}

/// One peer socket.
pub struct Connection {
    id: ConnectionId,
    peer_addr: Option<SocketAddr>,
    config: ConnectionConfig,
    writer: AsyncMutex<OwnedWriteHalf>,
    inbox: AsyncMutex<mpsc::Receiver<ClientMessage>>,
    connected: Arc<AtomicBool>,
    active: AtomicBool,
    playing: AtomicBool,
    disposed: AtomicBool,
    identity: Mutex<Option<PeerIdentity>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    /// Take ownership of a socket and start decoding from it.
    pub fn new(stream: TcpStream, id: ConnectionId, config: ConnectionConfig) -> Arc<Self> {
        let peer_addr = stream.peer_addr().ok();
        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::channel(config.inbox_capacity.max(1));
        let connected = Arc::new(AtomicBool::new(true));

        let reader_connected = connected.clone();
        let reader_task = tokio::spawn(async move {
            let mut reader = MessageReader::new(BufReader::new(read_half));
            loop {
                match reader.next_message().await {
                    Ok(Some(message)) => match tx.try_send(message) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(message)) => {
                            warn!(connection = id, kind = message.kind(), "Inbox full, dropping message");
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => break,
                    },
                    Ok(None) => {
                        debug!(connection = id, "Peer closed the stream");
                        break;
                    }
                    Err(e) => {
                        debug!(connection = id, error = %e, "Read failed");
                        break;
                    }
                }
            }
            // Receivers observe the flag before the channel closes
            reader_connected.store(false, Ordering::SeqCst);
            drop(tx);
        });

        Arc::new(Self {
            id,
            peer_addr,
            config,
            writer: AsyncMutex::new(write_half),
            inbox: AsyncMutex::new(rx),
            connected,
            active: AtomicBool::new(false),
            playing: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            identity: Mutex::new(None),
            reader_task: Mutex::new(Some(reader_task)),
        })
    }

    /// Registry-assigned id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Remote address, if the socket reported one.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// False once the peer closed the stream, a read or write failed, or
    /// the connection was disposed.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Logged in and not yet swept.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Set the active flag.
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    /// Currently in a match.
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    /// Claim the connection for a match. False if it was already playing.
    pub fn try_start_playing(&self) -> bool {
        self.playing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Release the connection after a match.
    pub fn stop_playing(&self) {
        self.playing.store(false, Ordering::SeqCst);
    }

    /// Peer identity once logged in.
    pub fn identity(&self) -> Option<PeerIdentity> {
        self.identity.lock().ok().and_then(|guard| guard.clone())
    }

    /// Record who logged in on this connection.
    pub fn set_identity(&self, identity: PeerIdentity) {
        if let Ok(mut guard) = self.identity.lock() {
            *guard = Some(identity);
        }
    }

    /// Label for logs.
    pub fn label(&self) -> String {
        match self.identity() {
            Some(identity) => identity.to_string(),
            None => format!("#{}", self.id),
        }
    }

    // =========================================================================
    // RECEIVE
    // =========================================================================

    /// Next decoded message, or `None` once the peer is gone.
    ///
    /// Only one receive is outstanding at a time; concurrent callers queue.
    /// Dropping the future loses no message.
    pub async fn receive_message(&self) -> Option<ClientMessage> {
        let mut inbox = self.inbox.lock().await;
        inbox.recv().await
    }

    /// Wait for the action answering `step`.
    ///
    /// Older actions and other messages are skipped. Returns `None` on
    /// disconnection or if an action for a later step shows up first.
    pub async fn receive_action(&self, step: u32) -> Option<TeamAction> {
        loop {
            match self.receive_message().await? {
                ClientMessage::Action(msg) if msg.step == step => return Some(msg.action),
                ClientMessage::Action(msg) if msg.step < step => {
                    debug!(connection = self.id, expected = step, got = msg.step, "Skipping stale action");
                }
                ClientMessage::Action(msg) => {
                    debug!(connection = self.id, expected = step, got = msg.step, "Action from the future");
                    return None;
                }
                other => {
                    debug!(connection = self.id, kind = other.kind(), "Ignoring message while waiting for action");
                }
            }
        }
    }

    /// Wait for a parameters message, skipping anything else.
    pub async fn receive_parameters(&self) -> Option<TeamParameters> {
        loop {
            match self.receive_message().await? {
                ClientMessage::Parameters(params) => return Some(params),
                other => {
                    debug!(connection = self.id, kind = other.kind(), "Ignoring message while waiting for parameters");
                }
            }
        }
    }

    // =========================================================================
    // SEND
    // =========================================================================

    /// Best-effort write. Never fails; reports whether the bytes were written.
    ///
    /// A timed-out write may have left part of a message on the wire, so the
    /// connection is treated as lost from then on.
    pub async fn try_send(&self, message: &ServerMessage) -> bool {
        if !self.is_connected() {
            return false;
        }

        let bytes = message.encode();
        let mut writer = self.writer.lock().await;
        match timeout(self.config.send_timeout, writer.write_all(&bytes)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                debug!(connection = self.id, error = %e, "Write failed");
                self.connected.store(false, Ordering::SeqCst);
                false
            }
            Err(_) => {
                warn!(connection = self.id, "Write timed out, dropping connection");
                self.connected.store(false, Ordering::SeqCst);
                false
            }
        }
    }

    /// Close the socket and stop the reader. Safe to call more than once.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.connected.store(false, Ordering::SeqCst);
        self.active.store(false, Ordering::SeqCst);

        let task = self.reader_task.lock().ok().and_then(|mut guard| guard.take());
        if let Some(task) = task {
            task.abort();
        }

        let mut writer = self.writer.lock().await;
        let _ = timeout(self.config.send_timeout, writer.shutdown()).await;
        debug!(connection = self.id, "Disposed");
    }

    /// Whether [`dispose`](Self::dispose) ran.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("connected", &self.is_connected())
            .field("active", &self.is_active())
            .field("playing", &self.is_playing())
            .finish()
    }
}
