//! Turning credentials into a user.

use std::future::Future;
use std::sync::Arc;

use quizhall_protocol::UserId;
use quizhall_store::{SessionLookup, Store};

use crate::{Credentials, SessionError};

/// Resolves a connection's credentials to a user.
///
/// Called once per connection, after the upgrade and before the read loop
/// starts. A rejection closes the socket.
///
/// # Example
///
/// ```rust
/// use quizhall_protocol::UserId;
/// use quizhall_session::{Credentials, SessionError, SessionResolver};
///
/// /// Treats the token as a numeric user id. Development only.
/// struct TrustingResolver;
///
/// impl SessionResolver for TrustingResolver {
///     async fn resolve(&self, creds: &Credentials) -> Result<UserId, SessionError> {
///         creds
///             .session_token
///             .as_deref()
///             .and_then(|t| t.parse().ok())
///             .map(UserId)
///             .ok_or(SessionError::Unauthenticated)
///     }
/// }
/// ```
pub trait SessionResolver: Send + Sync + 'static {
    fn resolve(
        &self,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<UserId, SessionError>> + Send;
}

/// Looks sessions up in a [`Store`].
///
/// Expired sessions are deleted on sight.
#[derive(Debug)]
pub struct StoreSessionResolver<S> {
    store: Arc<S>,
}

impl<S> StoreSessionResolver<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

impl<S: Store> SessionResolver for StoreSessionResolver<S> {
    async fn resolve(&self, credentials: &Credentials) -> Result<UserId, SessionError> {
        let Some(token) = credentials.session_token.as_deref() else {
            return Err(SessionError::Unauthenticated);
        };

        match self.store.lookup_session(token).await? {
            SessionLookup::Active(user_id) => Ok(user_id),
            SessionLookup::Unknown => Err(SessionError::Unauthenticated),
            SessionLookup::Expired => {
                self.store.delete_session(token).await?;
                tracing::debug!("expired session deleted");
                Err(SessionError::Expired)
            }
        }
    }
}
