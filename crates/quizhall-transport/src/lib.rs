//! Transport layer for Quizhall.
//!
//! Accepts TCP connections, upgrades them to WebSockets behind an
//! [`OriginGate`], and splits each socket into:
//!
//! - a read half owned by the connection's handler task, and
//! - a writer task fed through a bounded queue ([`ConnectionSender`]).
//!
//! Anything that wants to talk to a client (a direct reply, a room
//! broadcast) goes through its `ConnectionSender`. Sends never block: a
//! full queue is reported as [`TransportError::Backpressure`] so one slow
//! socket can't stall a whole room.

mod error;
mod gate;
mod sender;
mod websocket;

pub use error::TransportError;
pub use gate::{HandshakeInfo, OriginGate};
pub use sender::{ConnectionSender, Outbound, DEFAULT_QUEUE_CAPACITY};
pub use websocket::{PendingConnection, WebSocketConnection, WebSocketTransport};

use std::fmt;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        assert_eq!(ConnectionId::new(7).to_string(), "conn-7");
    }
}
