//! Core protocol types for the room socket.
//!
//! These are the structures that travel on the wire. Inbound frames are
//! decoded into [`ClientMessage`], outbound events are built as
//! [`ServerMessage`]. Both use the same envelope shape:
//!
//! ```text
//! { "type": "join_room", "payload": { "room_id": 42 } }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A registered user, as resolved from their session.
///
/// Serializes as a plain number (`#[serde(transparent)]`), matching the
/// integer keys used by the storage layer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U-{}", self.0)
    }
}

/// A room, pre-allocated by the HTTP layer before anyone connects.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RoomId(pub u64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R-{}", self.0)
    }
}

/// A stored question pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackId(pub u64);

impl fmt::Display for PackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PK-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Roster
// ---------------------------------------------------------------------------

/// A participant's role inside a room. Fixed at join time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The first participant of a room; drives the game.
    Owner,
    /// Everyone who joined after the owner.
    Player,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Owner => write!(f, "owner"),
            Self::Player => write!(f, "player"),
        }
    }
}

/// One roster entry as shown to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// The participant's user id.
    pub id: UserId,
    /// Display name from the user's account.
    pub name: String,
    /// Owner or player.
    pub role: Role,
    /// Points accumulated in the current match.
    pub score: u32,
    /// The room this participant belongs to.
    pub room_id: RoomId,
}

/// A question as served to clients. Never carries correctness flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionView {
    /// Zero-based position in the pack.
    pub index: usize,
    pub title: String,
    pub image_url: Option<String>,
    /// Points awarded for a correct answer.
    pub value: u32,
    /// Answer texts, in the order clients must index them.
    pub answers: Vec<String>,
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Payload of every action that only names a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomTarget {
    pub room_id: RoomId,
}

/// Payload of `answer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerPayload {
    pub room_id: RoomId,
    /// Index into the served question's `answers`.
    pub answer: usize,
}

/// Payload of `ban_user` / `unban_user`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTarget {
    pub room_id: RoomId,
    pub user_id: UserId,
}

/// Client → Server actions.
///
/// Adjacently tagged so the JSON matches the `{type, payload}` envelope
/// the browser client speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    JoinRoom(RoomTarget),
    LeaveRoom(RoomTarget),
    StartGame(RoomTarget),
    GetUsers(RoomTarget),
    GetGameState(RoomTarget),
    NextQuestion(RoomTarget),
    Answer(AnswerPayload),
    BanUser(UserTarget),
    UnbanUser(UserTarget),
}

impl ClientMessage {
    /// Every inbound `type` tag the server accepts.
    pub const ACTIONS: [&'static str; 9] = [
        "join_room",
        "leave_room",
        "start_game",
        "get_users",
        "get_game_state",
        "next_question",
        "answer",
        "ban_user",
        "unban_user",
    ];

    /// The room this action targets.
    pub fn room_id(&self) -> RoomId {
        match self {
            Self::JoinRoom(t)
            | Self::LeaveRoom(t)
            | Self::StartGame(t)
            | Self::GetUsers(t)
            | Self::GetGameState(t)
            | Self::NextQuestion(t) => t.room_id,
            Self::Answer(a) => a.room_id,
            Self::BanUser(t) | Self::UnbanUser(t) => t.room_id,
        }
    }

    /// The wire tag, for logging.
    pub fn action(&self) -> &'static str {
        match self {
            Self::JoinRoom(_) => "join_room",
            Self::LeaveRoom(_) => "leave_room",
            Self::StartGame(_) => "start_game",
            Self::GetUsers(_) => "get_users",
            Self::GetGameState(_) => "get_game_state",
            Self::NextQuestion(_) => "next_question",
            Self::Answer(_) => "answer",
            Self::BanUser(_) => "ban_user",
            Self::UnbanUser(_) => "unban_user",
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Server → Client events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent to a joiner once they are admitted.
    JoinedRoom { user_id: UserId, role: Role },

    /// Sent to a player after they left.
    LeftRoom { room_id: RoomId },

    /// Sent to every connection right before the owner's teardown closes it.
    RoomDeleted { room_id: RoomId },

    GameStarted { room_id: RoomId },

    /// The roster, in join order.
    UsersList { users: Vec<Participant> },

    GameState { started: bool, finished: bool },

    Question { question: QuestionView },

    /// Sent once, when the owner advances past the last question.
    QuestionsDone { ranking: Vec<Participant> },

    /// Sent to a participant the owner just banned.
    UserBanned { room_id: RoomId },

    /// `code` follows HTTP conventions (400, 403, 404, 409, 500, 503).
    Error { code: u16, message: String },
}

impl ServerMessage {
    /// Shorthand for an [`ServerMessage::Error`].
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }
}
