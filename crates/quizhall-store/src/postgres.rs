//! PostgreSQL [`Store`] on top of `sqlx`.
//!
//! Schema (owned by the HTTP side):
//!
//! ```text
//! rooms.room          (room_id, user_id, name, pack_id, current_users, max_users)
//! rooms.player        (user_id UNIQUE, room_id)
//! packs.pack          (pack_id, user_id, name, body)
//! users."user"        (user_id, name, email, password, matches_played, matches_won)
//! users.user_session  (session_id, user_id, created_at, expires_at)
//! ```
//!
//! Every call is wrapped in `tokio::time::timeout`; an elapsed timer is
//! reported as [`StoreError::Timeout`] naming the call.

use std::future::Future;
use std::time::Duration;

use quizhall_protocol::{PackId, RoomId, UserId};
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row};

use crate::{RoomRecord, SessionLookup, Store, StoreError};

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// A [`Store`] backed by a PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgStore {
    /// Opens a pool against `url`. `timeout` bounds both pool acquisition
    /// and every individual call.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .acquire_timeout(timeout)
            .connect(url)
            .await?;
        tracing::info!("connected to PostgreSQL");
        Ok(Self::from_pool(pool, timeout))
    }

    pub fn from_pool(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(|e| {
                tracing::error!(op, error = %e, "store call failed");
                StoreError::Database(e)
            }),
            Err(_) => {
                tracing::error!(op, timeout = ?self.timeout, "store call timed out");
                Err(StoreError::Timeout(op))
            }
        }
    }

    /// Single-row read.
    async fn query_row(
        &self,
        op: &'static str,
        query: PgQuery<'_>,
    ) -> Result<Option<PgRow>, StoreError> {
        self.bounded(op, query.fetch_optional(&self.pool)).await
    }

    /// Command; returns the affected row count.
    async fn execute(&self, op: &'static str, query: PgQuery<'_>) -> Result<u64, StoreError> {
        let done = self.bounded(op, query.execute(&self.pool)).await?;
        Ok(done.rows_affected())
    }
}

fn to_db(id: u64) -> Result<i64, StoreError> {
    i64::try_from(id).map_err(|_| StoreError::Corrupt(format!("id {id} out of range")))
}

fn from_db(value: i64, column: &str) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} = {value}")))
}

fn count_from_db(value: i32, column: &str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} = {value}")))
}

impl Store for PgStore {
    async fn room(&self, room_id: RoomId) -> Result<Option<RoomRecord>, StoreError> {
        let query = sqlx::query(
            "SELECT room_id::bigint, user_id::bigint, name, pack_id::bigint, \
             current_users::int, max_users::int \
             FROM rooms.room WHERE room_id = $1",
        )
        .bind(to_db(room_id.0)?);
        let Some(row) = self.query_row("room", query).await? else {
            return Ok(None);
        };
        Ok(Some(RoomRecord {
            room_id: RoomId(from_db(row.try_get(0)?, "room_id")?),
            owner_id: UserId(from_db(row.try_get(1)?, "user_id")?),
            name: row.try_get(2)?,
            pack_id: PackId(from_db(row.try_get(3)?, "pack_id")?),
            current_users: count_from_db(row.try_get(4)?, "current_users")?,
            max_users: count_from_db(row.try_get(5)?, "max_users")?,
        }))
    }

    async fn pack_body(&self, pack_id: PackId) -> Result<Option<String>, StoreError> {
        let query = sqlx::query("SELECT body::text FROM packs.pack WHERE pack_id = $1")
            .bind(to_db(pack_id.0)?);
        match self.query_row("pack_body", query).await? {
            Some(row) => Ok(Some(row.try_get(0)?)),
            None => Ok(None),
        }
    }

    async fn user_name(&self, user_id: UserId) -> Result<Option<String>, StoreError> {
        let query = sqlx::query("SELECT name FROM users.\"user\" WHERE user_id = $1")
            .bind(to_db(user_id.0)?);
        match self.query_row("user_name", query).await? {
            Some(row) => Ok(Some(row.try_get(0)?)),
            None => Ok(None),
        }
    }

    async fn add_member(&self, user_id: UserId, room_id: RoomId) -> Result<(), StoreError> {
        let query = sqlx::query(
            "INSERT INTO rooms.player (user_id, room_id) VALUES ($1, $2) \
             ON CONFLICT (user_id) DO UPDATE SET room_id = EXCLUDED.room_id",
        )
        .bind(to_db(user_id.0)?)
        .bind(to_db(room_id.0)?);
        self.execute("add_member", query).await?;
        Ok(())
    }

    async fn remove_member(&self, user_id: UserId) -> Result<(), StoreError> {
        let query = sqlx::query("DELETE FROM rooms.player WHERE user_id = $1")
            .bind(to_db(user_id.0)?);
        self.execute("remove_member", query).await?;
        Ok(())
    }

    async fn clear_members(&self, room_id: RoomId) -> Result<(), StoreError> {
        let query = sqlx::query("DELETE FROM rooms.player WHERE room_id = $1")
            .bind(to_db(room_id.0)?);
        let removed = self.execute("clear_members", query).await?;
        tracing::debug!(%room_id, removed, "membership rows cleared");
        Ok(())
    }

    async fn delete_room(&self, room_id: RoomId) -> Result<(), StoreError> {
        let query = sqlx::query("DELETE FROM rooms.room WHERE room_id = $1")
            .bind(to_db(room_id.0)?);
        self.execute("delete_room", query).await?;
        Ok(())
    }

    async fn set_current_users(&self, room_id: RoomId, count: u32) -> Result<(), StoreError> {
        let count = i32::try_from(count)
            .map_err(|_| StoreError::Corrupt(format!("current_users = {count}")))?;
        let query = sqlx::query("UPDATE rooms.room SET current_users = $1 WHERE room_id = $2")
            .bind(count)
            .bind(to_db(room_id.0)?);
        self.execute("set_current_users", query).await?;
        Ok(())
    }

    async fn record_win(&self, user_id: UserId) -> Result<(), StoreError> {
        let query = sqlx::query(
            "UPDATE users.\"user\" SET matches_won = matches_won + 1 WHERE user_id = $1",
        )
        .bind(to_db(user_id.0)?);
        self.execute("record_win", query).await?;
        Ok(())
    }

    async fn record_played(&self, user_id: UserId) -> Result<(), StoreError> {
        let query = sqlx::query(
            "UPDATE users.\"user\" SET matches_played = matches_played + 1 WHERE user_id = $1",
        )
        .bind(to_db(user_id.0)?);
        self.execute("record_played", query).await?;
        Ok(())
    }

    async fn lookup_session(&self, token: &str) -> Result<SessionLookup, StoreError> {
        let query = sqlx::query(
            "SELECT user_id::bigint, expires_at < now() \
             FROM users.user_session WHERE session_id = $1",
        )
        .bind(token.to_owned());
        let Some(row) = self.query_row("lookup_session", query).await? else {
            return Ok(SessionLookup::Unknown);
        };
        let expired: bool = row.try_get(1)?;
        if expired {
            return Ok(SessionLookup::Expired);
        }
        Ok(SessionLookup::Active(UserId(from_db(row.try_get(0)?, "user_id")?)))
    }

    async fn delete_session(&self, token: &str) -> Result<(), StoreError> {
        let query = sqlx::query("DELETE FROM users.user_session WHERE session_id = $1")
            .bind(token.to_owned());
        self.execute("delete_session", query).await?;
        Ok(())
    }

    async fn clear_live_state(&self) -> Result<(), StoreError> {
        let players = self
            .execute("clear_live_state", sqlx::query("DELETE FROM rooms.player"))
            .await?;
        let rooms = self
            .execute("clear_live_state", sqlx::query("DELETE FROM rooms.room"))
            .await?;
        tracing::info!(players, rooms, "live room state cleared");
        Ok(())
    }
}
