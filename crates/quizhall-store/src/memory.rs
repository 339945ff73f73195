//! In-process [`Store`] for tests and database-less development.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use quizhall_protocol::{PackId, RoomId, UserId};
use rand::Rng;
use tokio::sync::Mutex;

use crate::{RoomRecord, SessionLookup, Store, StoreError};

/// A user's persisted match counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserStats {
    pub matches_won: u32,
    pub matches_played: u32,
}

#[derive(Debug)]
struct UserRow {
    name: String,
    stats: UserStats,
}

#[derive(Debug)]
struct SessionRow {
    user_id: UserId,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, UserRow>,
    rooms: HashMap<RoomId, RoomRecord>,
    packs: HashMap<PackId, String>,
    members: HashMap<UserId, RoomId>,
    sessions: HashMap<String, SessionRow>,
}

/// A [`Store`] backed by in-memory tables.
///
/// Besides the trait, it has seeding helpers (`insert_*`, `create_session`)
/// and inspection helpers (`user_stats`, `member_room`, ...) for tests.
/// [`set_unavailable`](Self::set_unavailable) makes every call fail with
/// [`StoreError::Unavailable`], and [`fail_operation`](Self::fail_operation)
/// does the same for one named method.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
    failing: Mutex<HashSet<&'static str>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes calls to the [`Store`] method named `op` (e.g.
    /// `"set_current_users"`) fail, or succeed again.
    pub async fn fail_operation(&self, op: &'static str, failing: bool) {
        let mut ops = self.failing.lock().await;
        if failing {
            ops.insert(op);
        } else {
            ops.remove(op);
        }
    }

    async fn check(&self, op: &'static str) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) || self.failing.lock().await.contains(op) {
            return Err(StoreError::Unavailable);
        }
        Ok(())
    }

    pub async fn insert_user(&self, user_id: UserId, name: impl Into<String>) {
        self.tables.lock().await.users.insert(
            user_id,
            UserRow {
                name: name.into(),
                stats: UserStats::default(),
            },
        );
    }

    /// Inserts a room row owned by `owner_id` with `max_users` seats.
    pub async fn insert_room(
        &self,
        room_id: RoomId,
        owner_id: UserId,
        pack_id: PackId,
        max_users: u32,
    ) {
        self.tables.lock().await.rooms.insert(
            room_id,
            RoomRecord {
                room_id,
                owner_id,
                name: format!("room {}", room_id.0),
                pack_id,
                current_users: 0,
                max_users,
            },
        );
    }

    pub async fn insert_pack(&self, pack_id: PackId, body: impl Into<String>) {
        self.tables.lock().await.packs.insert(pack_id, body.into());
    }

    /// Mints a session token for `user_id` that expires after `ttl`.
    pub async fn create_session(&self, user_id: UserId, ttl: Duration) -> String {
        let token = generate_token();
        self.tables.lock().await.sessions.insert(
            token.clone(),
            SessionRow {
                user_id,
                expires_at: Instant::now() + ttl,
            },
        );
        token
    }

    /// Inserts a session token that has already expired.
    pub async fn create_expired_session(&self, user_id: UserId) -> String {
        let token = generate_token();
        self.tables.lock().await.sessions.insert(
            token.clone(),
            SessionRow {
                user_id,
                expires_at: Instant::now(),
            },
        );
        token
    }

    pub async fn has_session(&self, token: &str) -> bool {
        self.tables.lock().await.sessions.contains_key(token)
    }

    pub async fn user_stats(&self, user_id: UserId) -> Option<UserStats> {
        self.tables.lock().await.users.get(&user_id).map(|u| u.stats)
    }

    /// The room `user_id` has a membership row for, if any.
    pub async fn member_room(&self, user_id: UserId) -> Option<RoomId> {
        self.tables.lock().await.members.get(&user_id).copied()
    }

    pub async fn member_count(&self, room_id: RoomId) -> usize {
        self.tables
            .lock()
            .await
            .members
            .values()
            .filter(|r| **r == room_id)
            .count()
    }

    /// The stored room row, bypassing availability checks.
    pub async fn room_record(&self, room_id: RoomId) -> Option<RoomRecord> {
        self.tables.lock().await.rooms.get(&room_id).cloned()
    }
}

impl Store for MemoryStore {
    async fn room(&self, room_id: RoomId) -> Result<Option<RoomRecord>, StoreError> {
        self.check("room").await?;
        Ok(self.tables.lock().await.rooms.get(&room_id).cloned())
    }

    async fn pack_body(&self, pack_id: PackId) -> Result<Option<String>, StoreError> {
        self.check("pack_body").await?;
        Ok(self.tables.lock().await.packs.get(&pack_id).cloned())
    }

    async fn user_name(&self, user_id: UserId) -> Result<Option<String>, StoreError> {
        self.check("user_name").await?;
        Ok(self
            .tables
            .lock()
            .await
            .users
            .get(&user_id)
            .map(|u| u.name.clone()))
    }

    async fn add_member(&self, user_id: UserId, room_id: RoomId) -> Result<(), StoreError> {
        self.check("add_member").await?;
        self.tables.lock().await.members.insert(user_id, room_id);
        Ok(())
    }

    async fn remove_member(&self, user_id: UserId) -> Result<(), StoreError> {
        self.check("remove_member").await?;
        self.tables.lock().await.members.remove(&user_id);
        Ok(())
    }

    async fn clear_members(&self, room_id: RoomId) -> Result<(), StoreError> {
        self.check("clear_members").await?;
        self.tables
            .lock()
            .await
            .members
            .retain(|_, room| *room != room_id);
        Ok(())
    }

    async fn delete_room(&self, room_id: RoomId) -> Result<(), StoreError> {
        self.check("delete_room").await?;
        self.tables.lock().await.rooms.remove(&room_id);
        Ok(())
    }

    async fn set_current_users(&self, room_id: RoomId, count: u32) -> Result<(), StoreError> {
        self.check("set_current_users").await?;
        if let Some(room) = self.tables.lock().await.rooms.get_mut(&room_id) {
            room.current_users = count;
        }
        Ok(())
    }

    async fn record_win(&self, user_id: UserId) -> Result<(), StoreError> {
        self.check("record_win").await?;
        if let Some(user) = self.tables.lock().await.users.get_mut(&user_id) {
            user.stats.matches_won += 1;
        }
        Ok(())
    }

    async fn record_played(&self, user_id: UserId) -> Result<(), StoreError> {
        self.check("record_played").await?;
        if let Some(user) = self.tables.lock().await.users.get_mut(&user_id) {
            user.stats.matches_played += 1;
        }
        Ok(())
    }

    async fn lookup_session(&self, token: &str) -> Result<SessionLookup, StoreError> {
        self.check("lookup_session").await?;
        let tables = self.tables.lock().await;
        Ok(match tables.sessions.get(token) {
            None => SessionLookup::Unknown,
            Some(row) if row.expires_at <= Instant::now() => SessionLookup::Expired,
            Some(row) => SessionLookup::Active(row.user_id),
        })
    }

    async fn delete_session(&self, token: &str) -> Result<(), StoreError> {
        self.check("delete_session").await?;
        self.tables.lock().await.sessions.remove(token);
        Ok(())
    }

    async fn clear_live_state(&self) -> Result<(), StoreError> {
        self.check("clear_live_state").await?;
        let mut tables = self.tables.lock().await;
        tables.members.clear();
        tables.rooms.clear();
        Ok(())
    }
}

/// 32 lowercase hex characters (128 random bits).
fn generate_token() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token_shape() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_unavailable_fails_every_call() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.room(RoomId(1)).await,
            Err(StoreError::Unavailable)
        ));
        assert!(matches!(
            store.record_win(UserId(1)).await,
            Err(StoreError::Unavailable)
        ));

        store.set_unavailable(false);
        assert!(store.room(RoomId(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fail_operation_is_scoped_to_one_method() {
        let store = MemoryStore::new();
        store.fail_operation("set_current_users", true).await;
        assert!(store.add_member(UserId(1), RoomId(1)).await.is_ok());
        assert!(matches!(
            store.set_current_users(RoomId(1), 1).await,
            Err(StoreError::Unavailable)
        ));

        store.fail_operation("set_current_users", false).await;
        assert!(store.set_current_users(RoomId(1), 1).await.is_ok());
    }
}
