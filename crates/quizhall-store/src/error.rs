//! Error types for the storage gateway.

/// Errors returned by a [`Store`](crate::Store).
///
/// Every variant is an internal failure as far as a client is concerned:
/// the handler reports code 500 and closes the socket.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The call didn't finish within the configured timeout.
    #[error("store call `{0}` timed out")]
    Timeout(&'static str),

    /// The backend can't be reached at all.
    #[error("store unavailable")]
    Unavailable,

    /// A stored value doesn't fit the type we read it into
    /// (e.g. a negative user id).
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// The database driver reported an error.
    #[cfg(feature = "postgres")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
