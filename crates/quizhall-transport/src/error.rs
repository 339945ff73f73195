use crate::ConnectionId;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection (or its writer task) is gone.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// The connection's outbound queue is full; the peer is not reading.
    #[error("outbound queue full for {0}")]
    Backpressure(ConnectionId),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding or accepting TCP connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The WebSocket upgrade handshake failed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// The upgrade gate refused the request's origin.
    #[error("origin {0:?} not allowed")]
    OriginRejected(Option<String>),
}
