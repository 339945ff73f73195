//! Delivering events to a room's live connections.

use std::collections::HashMap;
use std::sync::Arc;

use quizhall_protocol::{Codec, RoomId, ServerMessage, UserId};
use quizhall_transport::{ConnectionId, ConnectionSender};

/// The live connections of one room, at most one per participant.
///
/// Owned by the room actor, so every send happens in the order the actor
/// processed its commands. Sends never wait: a connection whose queue is
/// full or whose writer is gone is logged and dropped from the room, and
/// delivery to the others carries on.
pub struct Fanout {
    room_id: RoomId,
    codec: Arc<dyn Codec>,
    connections: HashMap<UserId, ConnectionSender>,
}

impl Fanout {
    pub fn new(room_id: RoomId, codec: Arc<dyn Codec>) -> Self {
        Self {
            room_id,
            codec,
            connections: HashMap::new(),
        }
    }

    /// Attaches `sender` for `user_id`, replacing (and returning) any
    /// connection already attached for them.
    pub fn attach(&mut self, user_id: UserId, sender: ConnectionSender) -> Option<ConnectionSender> {
        self.connections.insert(user_id, sender)
    }

    pub fn detach(&mut self, user_id: UserId) -> Option<ConnectionSender> {
        self.connections.remove(&user_id)
    }

    /// Detaches `user_id` only if `conn_id` is the connection attached for
    /// them. A stale socket closing must not detach a newer one.
    pub fn detach_connection(&mut self, user_id: UserId, conn_id: ConnectionId) -> bool {
        if self
            .connections
            .get(&user_id)
            .is_some_and(|s| s.id() == conn_id)
        {
            self.connections.remove(&user_id);
            return true;
        }
        false
    }

    pub fn is_attached(&self, user_id: UserId) -> bool {
        self.connections.contains_key(&user_id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    fn encode(&self, msg: &ServerMessage) -> Option<Arc<str>> {
        match self.codec.encode(msg) {
            Ok(text) => Some(Arc::from(text)),
            Err(e) => {
                tracing::error!(room_id = %self.room_id, error = %e, "failed to encode event");
                None
            }
        }
    }

    /// Sends `msg` to every attached connection. Returns how many
    /// connections it was queued on.
    pub fn broadcast(&mut self, msg: &ServerMessage) -> usize {
        let Some(text) = self.encode(msg) else {
            return 0;
        };

        let mut failed = Vec::new();
        for (user_id, sender) in &self.connections {
            if let Err(e) = sender.send_text(Arc::clone(&text)) {
                tracing::warn!(
                    room_id = %self.room_id,
                    %user_id,
                    conn_id = %sender.id(),
                    error = %e,
                    "dropping connection from room"
                );
                failed.push(*user_id);
            }
        }
        for user_id in &failed {
            self.connections.remove(user_id);
        }
        self.connections.len()
    }

    /// Sends `msg` to one participant's connection, if attached.
    pub fn send(&mut self, user_id: UserId, msg: &ServerMessage) -> bool {
        let Some(sender) = self.connections.get(&user_id) else {
            return false;
        };
        let Some(text) = self.encode(msg) else {
            return false;
        };
        match sender.send_text(text) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    room_id = %self.room_id,
                    %user_id,
                    conn_id = %sender.id(),
                    error = %e,
                    "dropping connection from room"
                );
                self.connections.remove(&user_id);
                false
            }
        }
    }

    /// Closes every attached connection (after their queued frames) and
    /// forgets them.
    pub fn close_all(&mut self) {
        for (_, sender) in self.connections.drain() {
            sender.close();
        }
    }
}
