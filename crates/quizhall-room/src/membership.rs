//! Which room each user is in.

use std::collections::HashMap;

use quizhall_protocol::{RoomId, UserId};
use tokio::sync::Mutex;

/// Process-wide index of user → room, shared by every room actor.
///
/// A room actor claims the user while admitting them, under this index's
/// own lock, so two rooms admitting the same user at the same time can't
/// both succeed. The store's membership rows mirror this index; this one
/// is the one decisions are made on.
#[derive(Debug, Default)]
pub struct Memberships {
    rooms: Mutex<HashMap<UserId, RoomId>>,
}

impl Memberships {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `user_id` as a member of `room_id`.
    ///
    /// Claiming the room the user is already in succeeds.
    ///
    /// # Errors
    /// Returns the other room if the user is already a member elsewhere.
    pub async fn claim(&self, user_id: UserId, room_id: RoomId) -> Result<(), RoomId> {
        let mut rooms = self.rooms.lock().await;
        match rooms.get(&user_id) {
            Some(current) if *current != room_id => Err(*current),
            _ => {
                rooms.insert(user_id, room_id);
                Ok(())
            }
        }
    }

    /// Forgets `user_id`, but only if they are recorded in `room_id`.
    pub async fn release(&self, user_id: UserId, room_id: RoomId) {
        let mut rooms = self.rooms.lock().await;
        if rooms.get(&user_id) == Some(&room_id) {
            rooms.remove(&user_id);
        }
    }

    /// Forgets every member of `room_id`.
    pub async fn release_room(&self, room_id: RoomId) {
        self.rooms.lock().await.retain(|_, room| *room != room_id);
    }

    pub async fn room_of(&self, user_id: UserId) -> Option<RoomId> {
        self.rooms.lock().await.get(&user_id).copied()
    }
}
