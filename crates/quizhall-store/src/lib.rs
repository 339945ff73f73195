//! Storage gateway for Quizhall.
//!
//! Live game state never touches the database; it lives in room actors and
//! dies with the process. What *is* stored:
//!
//! - room rows, pre-allocated by the HTTP side (owner, pack, capacity),
//! - pack documents (the JSON question sets),
//! - user names and win/played counters,
//! - room membership (who is in which room right now),
//! - login sessions.
//!
//! [`Store`] is the seam. [`PgStore`] talks to PostgreSQL with a per-call
//! timeout; [`MemoryStore`] keeps everything in a map for tests and for
//! running without a database.

mod error;
mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use error::StoreError;
pub use memory::{MemoryStore, UserStats};
#[cfg(feature = "postgres")]
pub use postgres::PgStore;

use std::future::Future;

use quizhall_protocol::{PackId, RoomId, UserId};

/// A room row as pre-allocated by the CRUD layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomRecord {
    pub room_id: RoomId,
    /// The user who created the row. Not necessarily the first joiner.
    pub owner_id: UserId,
    pub name: String,
    pub pack_id: PackId,
    /// Mirrors the live participant count.
    pub current_users: u32,
    pub max_users: u32,
}

/// Result of looking up a session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionLookup {
    /// The token belongs to this user and hasn't expired.
    Active(UserId),
    /// The token exists but is past its expiry.
    Expired,
    /// No such token.
    Unknown,
}

/// Everything the room engine and the session resolver need from storage.
///
/// Methods return `impl Future + Send` so implementations can be used from
/// any Tokio task. Write methods are idempotent: removing a member that
/// isn't there, or deleting a room twice, is not an error.
pub trait Store: Send + Sync + 'static {
    /// Fetches a room row.
    fn room(
        &self,
        room_id: RoomId,
    ) -> impl Future<Output = Result<Option<RoomRecord>, StoreError>> + Send;

    /// Fetches the raw JSON body of a pack.
    fn pack_body(
        &self,
        pack_id: PackId,
    ) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// Fetches a user's display name.
    fn user_name(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// Records that `user_id` is now in `room_id`, replacing any previous row.
    fn add_member(
        &self,
        user_id: UserId,
        room_id: RoomId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Removes `user_id`'s membership row.
    fn remove_member(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Removes every membership row for `room_id`.
    fn clear_members(
        &self,
        room_id: RoomId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Deletes the room row.
    fn delete_room(
        &self,
        room_id: RoomId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Updates the room's `current_users` column.
    fn set_current_users(
        &self,
        room_id: RoomId,
        count: u32,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Adds one to the user's won-match counter.
    fn record_win(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Adds one to the user's played-match counter.
    fn record_played(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Resolves a session token.
    fn lookup_session(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<SessionLookup, StoreError>> + Send;

    /// Deletes a session token.
    fn delete_session(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Drops all membership and room rows. Run on graceful shutdown, since
    /// no live room survives the process.
    fn clear_live_state(&self) -> impl Future<Output = Result<(), StoreError>> + Send;
}
