//! Scripted AI peers for loopback tests.

use std::sync::Arc;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::game::input::{TeamAction, TeamParameters};
use crate::network::connection::{Connection, ConnectionConfig, PeerIdentity};
use crate::network::protocol::{ActionMessage, ClientMessage, ServerMessage, ServerMessageReader};

/// How a scripted peer answers the server.
#[derive(Clone, Debug)]
pub(crate) enum BotBehavior {
    /// Default parameters, idle action every step
    Idle,
    /// Given parameters, idle action every step
    WithParameters(TeamParameters),
    /// Ignores parameter requests, idle action every step
    NoParameters,
    /// Reads everything, answers nothing
    Mute,
    /// Closes the socket after receiving the frame for this step
    DisconnectAtStep(i32),
    /// Closes the socket before any exchange
    CloseImmediately,
}

/// What a bot saw before it stopped.
#[derive(Clone, Debug, Default)]
pub(crate) struct BotReport {
    pub frames: u32,
    pub last_step: Option<i32>,
}

/// Play `behavior` on `stream` until the server closes it or the script ends.
pub(crate) async fn run_bot(stream: TcpStream, behavior: BotBehavior) -> BotReport {
    let mut report = BotReport::default();
    if matches!(behavior, BotBehavior::CloseImmediately) {
        return report;
    }

    let (read_half, mut write_half) = stream.into_split();
    let mut reader = ServerMessageReader::new(BufReader::new(read_half));

    while let Ok(Some(message)) = reader.next_message().await {
        let reply = match (&behavior, message) {
            (BotBehavior::Mute, _) => None,
            (BotBehavior::NoParameters, ServerMessage::GetParameters) => None,
            (BotBehavior::WithParameters(params), ServerMessage::GetParameters) => {
                Some(ClientMessage::Parameters(params.clone()))
            }
            (_, ServerMessage::GetParameters) => Some(ClientMessage::Parameters(TeamParameters::fallback())),
            (_, ServerMessage::GetAction(frame)) => {
                report.frames += 1;
                report.last_step = Some(frame.step);
                if let BotBehavior::DisconnectAtStep(step) = behavior {
                    if frame.step == step {
                        return report;
                    }
                }
                Some(ClientMessage::Action(ActionMessage {
                    step: frame.step as u32,
                    action: TeamAction::idle(),
                }))
            }
            _ => None,
        };

        if let Some(reply) = reply {
            if write_half.write_all(&reply.encode()).await.is_err() {
                break;
            }
        }
    }
    report
}

/// A logged-in server-side connection whose peer runs `behavior`.
pub(crate) async fn active_pair(player: &str, behavior: BotBehavior) -> (Arc<Connection>, JoinHandle<BotReport>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let peer = TcpStream::connect(addr).await.unwrap();
    let (server_side, _) = listener.accept().await.unwrap();

    let connection = Connection::new(server_side, 1, ConnectionConfig::default());
    connection.set_identity(PeerIdentity {
        player_name: player.to_string(),
        ai_name: "bot".to_string(),
    });
    connection.set_active(true);

    let bot = tokio::spawn(run_bot(peer, behavior));
    (connection, bot)
}

/// Connect to a server, log in, then play `behavior`.
pub(crate) async fn login_bot(
    addr: std::net::SocketAddr,
    player: &str,
    key: &str,
    behavior: BotBehavior,
) -> JoinHandle<BotReport> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let login = format!("LOGIN {} bot {}\n", player, key);
    stream.write_all(login.as_bytes()).await.unwrap();
    tokio::spawn(run_bot(stream, behavior))
}
