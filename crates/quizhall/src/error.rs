//! Unified error type for the Quizhall server.

use quizhall_protocol::ProtocolError;
use quizhall_room::RoomError;
use quizhall_session::SessionError;
use quizhall_store::StoreError;
use quizhall_transport::TransportError;

use crate::ConfigError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum QuizhallError {
    /// A transport-level error (bind, upgrade, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame the codec couldn't handle.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The connection's session was missing, expired, or unreadable.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room action failed.
    #[error(transparent)]
    Room(#[from] RoomError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
