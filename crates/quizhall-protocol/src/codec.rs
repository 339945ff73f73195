//! Codec trait and the JSON implementation.
//!
//! Decoding is stricter than a plain `serde_json::from_slice`: it tells the
//! caller *why* a frame was rejected (no `room_id`, unknown action, bad
//! payload) so the client gets a useful error instead of a generic one.

use serde_json::Value;

use crate::{ClientMessage, ProtocolError, ServerMessage};

/// Converts between raw socket frames and protocol messages.
///
/// `Send + Sync + 'static` because a single codec instance is shared by
/// every connection task for the lifetime of the server.
pub trait Codec: Send + Sync + 'static {
    /// Serializes an outbound message into a text frame.
    fn encode(&self, msg: &ServerMessage) -> Result<String, ProtocolError>;

    /// Parses an inbound frame into a typed action.
    fn decode(&self, data: &[u8]) -> Result<ClientMessage, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that speaks the `{type, payload}` JSON envelope.
///
/// ```rust
/// use quizhall_protocol::{ClientMessage, Codec, JsonCodec, RoomId};
///
/// let codec = JsonCodec;
/// let msg = codec
///     .decode(br#"{"type":"start_game","payload":{"room_id":42}}"#)
///     .unwrap();
/// assert_eq!(msg.room_id(), RoomId(42));
/// assert!(matches!(msg, ClientMessage::StartGame(_)));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, msg: &ServerMessage) -> Result<String, ProtocolError> {
        serde_json::to_string(msg).map_err(ProtocolError::Encode)
    }

    fn decode(&self, data: &[u8]) -> Result<ClientMessage, ProtocolError> {
        let value: Value =
            serde_json::from_slice(data).map_err(ProtocolError::Decode)?;

        let Some(envelope) = value.as_object() else {
            return Err(ProtocolError::InvalidMessage(
                "expected a JSON object".into(),
            ));
        };

        // Every action is room-scoped, so `room_id` is checked before the
        // action itself.
        let has_room_id = envelope
            .get("payload")
            .and_then(|payload| payload.get("room_id"))
            .is_some_and(Value::is_u64);
        if !has_room_id {
            return Err(ProtocolError::MissingRoomId);
        }

        let action = envelope
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::InvalidMessage("missing type".into()))?;
        if !ClientMessage::ACTIONS.contains(&action) {
            return Err(ProtocolError::UnknownAction(action.to_string()));
        }

        serde_json::from_value(value)
            .map_err(|e| ProtocolError::InvalidPayload(e.to_string()))
    }
}
