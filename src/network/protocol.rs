//! Protocol Messages
//!
//! Wire format between the server and an AI process over one TCP stream.
//! Control messages are newline-terminated text lines; parameters, actions
//! and game-state frames follow their line as fixed-size little-endian
//! binary payloads.
//!
//! ```text
//! peer -> server   LOGIN <player> <ai> <key>
//! peer -> server   PARAMETERS                 + 176 bytes (11 x speed, kick_power, possession, precision)
//! peer -> server   <step> ACTION              + 176 bytes (11 x move.x, move.y, kick.x, kick.y)
//! server -> peer   CONNECTED | <error text> | keepalive | GET PARAMETERS
//! server -> peer   GET ACTION                 + 373 bytes (i32 step, u8 kickoff, 92 x f32)
//! ```

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use tracing::debug;

use crate::game::entity::TeamSide;
use crate::game::input::{TeamAction, TeamParameters, FIELDS_PER_TEAM};
use crate::game::state::GameState;
use crate::TOTAL_PLAYERS;

/// Bytes in a parameters or action payload.
pub const PAYLOAD_SIZE: usize = FIELDS_PER_TEAM * 4;

/// Floats in a game-state frame: ball then 22 players, each position + movement.
pub const FRAME_VALUES: usize = 4 * (1 + TOTAL_PLAYERS);

/// Bytes in a game-state frame.
pub const FRAME_SIZE: usize = 4 + 1 + FRAME_VALUES * 4;

/// Longest accepted text line, newline included.
pub const MAX_LINE_LENGTH: usize = 512;

const LOGIN_KEYWORD: &str = "LOGIN";
const PARAMETERS_SUFFIX: &str = "PARAMETERS";
const ACTION_SUFFIX: &str = "ACTION";

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Socket failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stream ended inside a binary payload.
    #[error("stream ended inside a {0} payload")]
    TruncatedPayload(&'static str),

    /// Server line not understood (client side only).
    #[error("unexpected server line: {0}")]
    UnexpectedLine(String),
}

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Login credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginMessage {
    /// Account name
    pub player_name: String,
    /// Name of the AI program
    pub ai_name: String,
    /// Secret checked by the authenticator
    pub access_key: String,
}

/// One side's action, tagged with the step it answers.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionMessage {
    /// Step the action is meant for
    pub step: u32,
    /// Commands for the 11 players
    pub action: TeamAction,
}

/// Messages sent from an AI to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Identify and authenticate.
    Login(LoginMessage),
    /// Trait assignment, unvalidated.
    Parameters(TeamParameters),
    /// Per-step command.
    Action(ActionMessage),
}

impl ClientMessage {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Login(_) => "login",
            ClientMessage::Parameters(_) => "parameters",
            ClientMessage::Action(_) => "action",
        }
    }

    /// Wire bytes, as an AI would send them.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            ClientMessage::Login(login) => format!(
                "{} {} {} {}\n",
                LOGIN_KEYWORD, login.player_name, login.ai_name, login.access_key
            )
            .into_bytes(),
            ClientMessage::Parameters(params) => {
                let mut out = format!("{}\n", PARAMETERS_SUFFIX).into_bytes();
                write_floats(&mut out, &params.to_values());
                out
            }
            ClientMessage::Action(msg) => {
                let mut out = format!("{} {}\n", msg.step, ACTION_SUFFIX).into_bytes();
                write_floats(&mut out, &msg.action.to_values());
                out
            }
        }
    }
}

/// Parse a LOGIN line: exactly four whitespace-separated tokens.
pub fn parse_login(line: &str) -> Option<LoginMessage> {
    let mut tokens = line.split_whitespace();
    let (keyword, player, ai, key) = (tokens.next()?, tokens.next()?, tokens.next()?, tokens.next()?);
    if keyword != LOGIN_KEYWORD || tokens.next().is_some() {
        return None;
    }
    Some(LoginMessage {
        player_name: player.to_string(),
        ai_name: ai.to_string(),
        access_key: key.to_string(),
    })
}

/// Step tag of an ACTION line, the last token before the suffix.
fn parse_action_step(line: &str) -> Option<u32> {
    let prefix = line.strip_suffix(ACTION_SUFFIX)?;
    prefix.split_whitespace().last()?.parse().ok()
}

fn write_floats(out: &mut Vec<u8>, values: &[f32]) {
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
}

fn read_floats<const N: usize>(bytes: &[u8]) -> [f32; N] {
    let mut values = [0.0f32; N];
    for (v, chunk) in values.iter_mut().zip(bytes.chunks_exact(4)) {
        *v = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    values
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// The game as one side sees it: its own players first.
#[derive(Debug, Clone, PartialEq)]
pub struct GameStateFrame {
    /// Step the receiver should answer
    pub step: i32,
    /// A kickoff or restart placement was just applied
    pub is_kick_off: bool,
    /// Ball pos+mov, own 11 players pos+mov, opponent 11 players pos+mov
    pub values: [f32; FRAME_VALUES],
}

impl GameStateFrame {
    /// Project the state for `side`. Coordinates are not mirrored.
    pub fn for_side(state: &GameState, side: TeamSide) -> Self {
        let mut values = [0.0f32; FRAME_VALUES];
        let mut i = 0;
        let mut push = |x: f64, y: f64| {
            values[i] = x as f32;
            values[i + 1] = y as f32;
            i += 2;
        };

        push(state.ball.position.x, state.ball.position.y);
        push(state.ball.movement.x, state.ball.movement.y);
        for team in [side, side.opponent()] {
            for player in state.team(team) {
                push(player.position.x, player.position.y);
                push(player.movement.x, player.movement.y);
            }
        }

        Self {
            step: state.step as i32,
            is_kick_off: state.is_kick_off,
            values,
        }
    }

    /// Binary layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(FRAME_SIZE);
        out.extend_from_slice(&self.step.to_le_bytes());
        out.push(u8::from(self.is_kick_off));
        write_floats(&mut out, &self.values);
        out
    }

    /// Parse the binary layout.
    pub fn decode(bytes: &[u8; FRAME_SIZE]) -> Self {
        Self {
            step: i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            is_kick_off: bytes[4] != 0,
            values: read_floats(&bytes[5..]),
        }
    }
}

/// Messages sent from the server to an AI.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Login accepted.
    Connected,
    /// Login rejected or malformed message; free text.
    Error(String),
    /// Idle heartbeat.
    Keepalive,
    /// Ask for the match's parameters.
    GetParameters,
    /// Ask for the next step's action.
    GetAction(GameStateFrame),
}

impl ServerMessage {
    /// Wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            ServerMessage::Connected => b"CONNECTED\n".to_vec(),
            ServerMessage::Error(text) => {
                // Keep it on one line
                let flat: String = text.chars().map(|c| if c == '\n' { ' ' } else { c }).collect();
                format!("{}\n", flat).into_bytes()
            }
            ServerMessage::Keepalive => b"keepalive\n".to_vec(),
            ServerMessage::GetParameters => b"GET PARAMETERS\n".to_vec(),
            ServerMessage::GetAction(frame) => {
                let mut out = b"GET ACTION\n".to_vec();
                out.extend_from_slice(&frame.encode());
                out
            }
        }
    }
}

// =============================================================================
// READERS
// =============================================================================

/// Read one line, discarding overlong ones. `Ok(None)` at end of stream.
async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R, buf: &mut Vec<u8>) -> Result<Option<String>, ProtocolError> {
    loop {
        buf.clear();
        let n = (&mut *reader).take(MAX_LINE_LENGTH as u64).read_until(b'\n', buf).await?;
        if n == 0 {
            return Ok(None);
        }

        if buf.last() != Some(&b'\n') && n == MAX_LINE_LENGTH {
            // Overlong: drop the remainder of the line
            debug!("Discarding line longer than {} bytes", MAX_LINE_LENGTH);
            loop {
                buf.clear();
                let n = (&mut *reader).take(MAX_LINE_LENGTH as u64).read_until(b'\n', buf).await?;
                if n == 0 {
                    return Ok(None);
                }
                if buf.last() == Some(&b'\n') {
                    break;
                }
            }
            continue;
        }

        return Ok(Some(String::from_utf8_lossy(buf).trim().to_string()));
    }
}

async fn read_payload<R: AsyncBufRead + Unpin, const N: usize>(
    reader: &mut R,
    what: &'static str,
) -> Result<[u8; N], ProtocolError> {
    let mut payload = [0u8; N];
    match reader.read_exact(&mut payload).await {
        Ok(_) => Ok(payload),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(ProtocolError::TruncatedPayload(what)),
        Err(e) => Err(e.into()),
    }
}

/// Decodes [`ClientMessage`]s from a byte stream.
///
/// Malformed lines are skipped; `Ok(None)` means the peer closed the stream.
pub struct MessageReader<R> {
    reader: R,
    line: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> MessageReader<R> {
    /// Wrap a buffered reader.
    pub fn new(reader: R) -> Self {
        Self { reader, line: Vec::with_capacity(MAX_LINE_LENGTH) }
    }

    /// Next well-formed message.
    pub async fn next_message(&mut self) -> Result<Option<ClientMessage>, ProtocolError> {
        loop {
            let Some(line) = read_line(&mut self.reader, &mut self.line).await? else {
                return Ok(None);
            };

            if line.ends_with(PARAMETERS_SUFFIX) {
                let payload: [u8; PAYLOAD_SIZE] = read_payload(&mut self.reader, "parameters").await?;
                let values: [f32; FIELDS_PER_TEAM] = read_floats(&payload);
                return Ok(Some(ClientMessage::Parameters(TeamParameters::from_values(&values))));
            }

            if line.ends_with(ACTION_SUFFIX) {
                let payload: [u8; PAYLOAD_SIZE] = read_payload(&mut self.reader, "action").await?;
                let Some(step) = parse_action_step(&line) else {
                    debug!(line = %line, "Discarding action without a step");
                    continue;
                };
                let values: [f32; FIELDS_PER_TEAM] = read_floats(&payload);
                return Ok(Some(ClientMessage::Action(ActionMessage {
                    step,
                    action: TeamAction::from_values(&values),
                })));
            }

            if let Some(login) = parse_login(&line) {
                return Ok(Some(ClientMessage::Login(login)));
            }

            debug!(line = %line, "Discarding malformed line");
        }
    }
}

/// Decodes [`ServerMessage`]s; the AI side of the codec.
pub struct ServerMessageReader<R> {
    reader: R,
    line: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> ServerMessageReader<R> {
    /// Wrap a buffered reader.
    pub fn new(reader: R) -> Self {
        Self { reader, line: Vec::with_capacity(MAX_LINE_LENGTH) }
    }

    /// Next message, `Ok(None)` once the server closes.
    ///
    /// Lines other than the fixed keywords are returned as [`ServerMessage::Error`].
    pub async fn next_message(&mut self) -> Result<Option<ServerMessage>, ProtocolError> {
        let Some(line) = read_line(&mut self.reader, &mut self.line).await? else {
            return Ok(None);
        };

        let message = match line.as_str() {
            "CONNECTED" => ServerMessage::Connected,
            "keepalive" => ServerMessage::Keepalive,
            "GET PARAMETERS" => ServerMessage::GetParameters,
            "GET ACTION" => {
                let payload: [u8; FRAME_SIZE] = read_payload(&mut self.reader, "frame").await?;
                ServerMessage::GetAction(GameStateFrame::decode(&payload))
            }
            "" => return Err(ProtocolError::UnexpectedLine(line)),
            _ => ServerMessage::Error(line),
        };
        Ok(Some(message))
    }
}
