//! Error types for session resolution.

use quizhall_store::StoreError;

/// Why a connection could not be tied to a user.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No `session_id` cookie, or the token isn't known.
    #[error("not authenticated")]
    Unauthenticated,

    /// The token exists but its expiry has passed. The row is deleted
    /// before this is returned.
    #[error("session expired")]
    Expired,

    /// The store failed while looking the token up.
    #[error("session lookup failed: {0}")]
    Store(#[from] StoreError),
}

impl SessionError {
    /// The wire error code reported before the socket is closed.
    pub fn code(&self) -> u16 {
        match self {
            Self::Unauthenticated | Self::Expired => 401,
            Self::Store(_) => 500,
        }
    }

    /// The text sent to the client. Store failures stay server-side.
    pub fn client_message(&self) -> String {
        match self {
            Self::Store(_) => "internal error".to_owned(),
            other => other.to_string(),
        }
    }
}
