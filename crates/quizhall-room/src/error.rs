//! Error types for the room layer.

use quizhall_protocol::{PackId, RoomId, UserId};
use quizhall_store::StoreError;

use crate::PackError;

/// Errors that can occur during room operations.
///
/// Each variant knows the wire `code` it is reported with and whether
/// the requesting connection is closed afterwards.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// No stored row for the room, or no live session for it.
    #[error("room {0} not found")]
    NotFound(RoomId),

    #[error("room {0} is full")]
    RoomFull(RoomId),

    #[error("too many rooms")]
    TooManyRooms,

    /// The user is a live participant of another room.
    #[error("user {0} is already in room {1}")]
    AlreadyInAnotherRoom(UserId, RoomId),

    #[error("user {0} is banned from room {1}")]
    Banned(UserId, RoomId),

    /// An owner-only action from someone else.
    #[error("only the room owner can do that")]
    NotOwner,

    #[error("the owner cannot ban themself")]
    CannotBanSelf,

    #[error("user {0} is not in room {1}")]
    NotAParticipant(UserId, RoomId),

    #[error("no active question")]
    NoActiveQuestion,

    #[error("already answered this question")]
    AlreadyAnswered,

    #[error("game has not started")]
    GameNotStarted,

    #[error("game is finished")]
    GameFinished,

    /// The room is in a state that doesn't allow this operation.
    #[error("invalid room state for this operation: {0}")]
    InvalidState(String),

    #[error("pack {0} could not be loaded: {1}")]
    Pack(PackId, #[source] PackError),

    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),

    /// The room's actor has stopped (it was torn down mid-request).
    #[error("room {0} is unavailable")]
    Unavailable(RoomId),
}

impl RoomError {
    /// The wire error code.
    pub fn code(&self) -> u16 {
        match self {
            Self::NotAParticipant(..)
            | Self::NoActiveQuestion
            | Self::GameNotStarted
            | Self::GameFinished
            | Self::InvalidState(_)
            | Self::CannotBanSelf => 400,
            Self::NotOwner | Self::Banned(..) => 403,
            Self::NotFound(_) | Self::Unavailable(_) => 404,
            Self::AlreadyInAnotherRoom(..) | Self::AlreadyAnswered => 409,
            Self::RoomFull(_) | Self::TooManyRooms => 503,
            Self::Pack(..) | Self::Storage(_) => 500,
        }
    }

    /// Whether the requesting connection is closed after the error is sent.
    pub fn closes_connection(&self) -> bool {
        matches!(
            self,
            Self::AlreadyInAnotherRoom(..) | Self::Pack(..) | Self::Storage(_)
        )
    }

    /// The message shown to the client. Internal failures are not
    /// described in detail.
    pub fn client_message(&self) -> String {
        match self {
            Self::Pack(..) | Self::Storage(_) => "internal error".to_owned(),
            other => other.to_string(),
        }
    }
}
