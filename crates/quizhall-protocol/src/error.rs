//! Error types for the protocol layer.

/// Errors that can occur while encoding or decoding frames.
///
/// Every decode variant is a validation failure: the handler reports it
/// to the sending connection with code 400 and keeps the socket open.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serializing an outbound message failed.
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// The frame is not valid JSON.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// The payload has no numeric `room_id`.
    #[error("missing room_id")]
    MissingRoomId,

    /// The `type` field names an action the server does not know.
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// The action is known but its payload has the wrong shape
    /// (e.g. a non-numeric `answer`).
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The frame is JSON but not a message envelope at all.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
