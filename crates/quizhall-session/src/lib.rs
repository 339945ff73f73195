//! Session resolution for Quizhall.
//!
//! Quizhall doesn't log anyone in; the HTTP side does that and leaves a
//! `session_id` cookie behind. When a socket is upgraded, this crate turns
//! that cookie into a [`UserId`](quizhall_protocol::UserId):
//!
//! 1. **Credentials** ([`Credentials`]) are pulled out of the upgrade
//!    request's `Cookie` header.
//! 2. **Resolution** ([`SessionResolver`]) maps them to a user, or rejects
//!    the connection.
//!
//! ```text
//! Transport (handshake headers) → Session (UserId) → Room actions
//! ```

mod credentials;
mod error;
mod resolver;

pub use credentials::{Credentials, SESSION_COOKIE};
pub use error::SessionError;
pub use resolver::{SessionResolver, StoreSessionResolver};
