//! Bounded, non-blocking outbound queue for one connection.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::{ConnectionId, TransportError};

/// Outbound queue size used when the caller doesn't pick one.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// A frame waiting in a connection's outbound queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A text frame. Shared so a broadcast encodes once for the whole room.
    Text(Arc<str>),
    /// Flush everything queued before this, then close the socket.
    Close,
}

/// Cloneable handle for queueing frames to one connection.
///
/// The room actor holds one per attached participant; the connection's own
/// handler holds one for direct replies. Both feed the same writer task,
/// so frames reach the client in the order they were queued.
#[derive(Debug, Clone)]
pub struct ConnectionSender {
    id: ConnectionId,
    tx: mpsc::Sender<Outbound>,
}

impl ConnectionSender {
    /// Creates a sender and the receiving end its writer drains.
    pub fn channel(
        id: ConnectionId,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { id, tx }, rx)
    }

    /// The connection this sender writes to.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues a text frame without waiting.
    ///
    /// # Errors
    /// [`TransportError::Backpressure`] if the queue is full,
    /// [`TransportError::ConnectionClosed`] if the writer is gone.
    pub fn send_text(&self, text: Arc<str>) -> Result<(), TransportError> {
        self.tx.try_send(Outbound::Text(text)).map_err(|e| match e {
            TrySendError::Full(_) => TransportError::Backpressure(self.id),
            TrySendError::Closed(_) => {
                TransportError::ConnectionClosed(format!("{} writer stopped", self.id))
            }
        })
    }

    /// Asks the writer to close the socket after draining the queue.
    ///
    /// If the queue is full the close is queued from a background task,
    /// so this never blocks the caller.
    pub fn close(&self) {
        match self.tx.try_send(Outbound::Close) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(_)) => {
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let _ = tx.send(Outbound::Close).await;
                });
            }
        }
    }

    /// Returns `true` once the writer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
