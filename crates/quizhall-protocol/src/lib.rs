//! Wire protocol for Quizhall.
//!
//! Every frame on a room socket is a JSON object `{ "type": ..., "payload": ... }`.
//! This crate defines:
//!
//! - **Identifiers** ([`UserId`], [`RoomId`], [`PackId`]).
//! - **Messages** ([`ClientMessage`] inbound, [`ServerMessage`] outbound) with
//!   typed payloads per action.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) that turns raw frames into
//!   messages and reports exactly what was wrong with a bad frame.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Transport (text frames) → Protocol (ClientMessage) → Room (actions)
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{
    AnswerPayload, ClientMessage, PackId, Participant, QuestionView, Role,
    RoomId, RoomTarget, ServerMessage, UserId, UserTarget,
};
