//! Network Layer
//!
//! TCP server for AI clients: line + binary protocol, login handshake,
//! connection liveness, and the per-match simulator loop.
//! This layer is **non-deterministic** - all match logic runs through `game/`.

pub mod auth;
pub mod connection;
pub mod manager;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod simulator;

#[cfg(test)]
pub(crate) mod test_support;

pub use auth::{AuthConfig, AuthError, Authenticator, JwtAuthenticator, StaticKeyAuthenticator, TokenClaims, validate_token};
pub use connection::{Connection, ConnectionConfig, ConnectionId, PeerIdentity};
pub use manager::{ManagerError, MatchManager, MatchOutcome, StartedMatch};
pub use protocol::{ClientMessage, GameStateFrame, ProtocolError, ServerMessage};
pub use registry::{ConnectionRegistry, HandshakeState, LoggingObserver, RegistryConfig, RegistryObserver};
pub use server::{GameServer, GameServerError, ServerConfig};
pub use simulator::{MatchPhase, MatchSimulator, SimulatorConfig};
