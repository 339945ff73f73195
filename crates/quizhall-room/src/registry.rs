//! Room registry: finds live rooms and creates them on first join.

use std::collections::HashMap;
use std::sync::Arc;

use quizhall_protocol::{Codec, RoomId};
use quizhall_store::Store;
use tokio::sync::{Mutex, OnceCell};

use crate::room::{RoomSetup, spawn_room};
use crate::{Memberships, PackLoader, RoomError, RoomHandle, RoomLimits};

type Slot = Arc<OnceCell<RoomHandle>>;

/// All live rooms, keyed by room id.
///
/// The map has its own lock, separate from every room's actor, and it is
/// only held long enough to find or insert a slot. Creating a room (the
/// store lookup, loading the pack, spawning the actor) happens on the slot
/// outside that lock: the first caller for an id does the work, concurrent
/// callers for the same id wait on the slot and get the same handle, and
/// callers for other ids are never blocked by it.
pub struct RoomRegistry<S> {
    store: Arc<S>,
    packs: PackLoader<S>,
    memberships: Arc<Memberships>,
    codec: Arc<dyn Codec>,
    limits: RoomLimits,
    rooms: Mutex<HashMap<RoomId, Slot>>,
}

impl<S: Store> RoomRegistry<S> {
    pub fn new(store: Arc<S>, codec: Arc<dyn Codec>, limits: RoomLimits) -> Self {
        Self {
            packs: PackLoader::new(Arc::clone(&store)),
            store,
            memberships: Arc::new(Memberships::new()),
            codec,
            limits,
            rooms: Mutex::new(HashMap::new()),
        }
    }

    pub fn limits(&self) -> RoomLimits {
        self.limits
    }

    /// The user → room index shared by this registry's rooms.
    pub fn memberships(&self) -> &Arc<Memberships> {
        &self.memberships
    }

    /// Returns the live room for `room_id`, creating it if needed.
    ///
    /// The flag is `true` if this call created the room.
    ///
    /// # Errors
    /// - [`RoomError::TooManyRooms`] if a new room would exceed `max_rooms`
    /// - [`RoomError::NotFound`] if storage has no row for the room
    /// - [`RoomError::Pack`] / [`RoomError::Storage`] if creation failed
    pub async fn get_or_create(&self, room_id: RoomId) -> Result<(RoomHandle, bool), RoomError> {
        let slot = {
            let mut rooms = self.rooms.lock().await;
            // A room whose actor has stopped is as good as absent.
            if rooms
                .get(&room_id)
                .is_some_and(|slot| slot.get().is_some_and(RoomHandle::is_closed))
            {
                rooms.remove(&room_id);
            }
            match rooms.get(&room_id) {
                Some(slot) => Arc::clone(slot),
                None => {
                    if rooms.len() >= self.limits.max_rooms {
                        tracing::warn!(%room_id, rooms = rooms.len(), "room limit reached");
                        return Err(RoomError::TooManyRooms);
                    }
                    let slot = Slot::default();
                    rooms.insert(room_id, Arc::clone(&slot));
                    slot
                }
            }
        };

        let mut created = false;
        let result = slot
            .get_or_try_init(|| {
                created = true;
                self.create(room_id)
            })
            .await;

        match result {
            Ok(handle) => Ok((handle.clone(), created)),
            Err(e) => {
                let mut rooms = self.rooms.lock().await;
                if rooms
                    .get(&room_id)
                    .is_some_and(|s| Arc::ptr_eq(s, &slot) && !s.initialized())
                {
                    rooms.remove(&room_id);
                }
                Err(e)
            }
        }
    }

    async fn create(&self, room_id: RoomId) -> Result<RoomHandle, RoomError> {
        let record = self
            .store
            .room(room_id)
            .await?
            .ok_or(RoomError::NotFound(room_id))?;
        let questions = self
            .packs
            .load(record.pack_id)
            .await
            .map_err(|e| RoomError::Pack(record.pack_id, e))?;

        let handle = spawn_room(RoomSetup {
            room_id,
            capacity: self.limits.capacity_for(record.max_users),
            questions,
            store: Arc::clone(&self.store),
            memberships: Arc::clone(&self.memberships),
            codec: Arc::clone(&self.codec),
            channel_size: self.limits.command_channel_size,
        });
        tracing::info!(%room_id, pack_id = %record.pack_id, "room created");
        Ok(handle)
    }

    /// Returns the live room for `room_id`, if any.
    pub async fn get(&self, room_id: RoomId) -> Option<RoomHandle> {
        let rooms = self.rooms.lock().await;
        rooms
            .get(&room_id)
            .and_then(|slot| slot.get())
            .filter(|handle| !handle.is_closed())
            .cloned()
    }

    /// Removes `room_id` from the registry. Called once its actor reports
    /// the room closed.
    pub async fn delete(&self, room_id: RoomId) {
        if self.rooms.lock().await.remove(&room_id).is_some() {
            tracing::debug!(%room_id, "room removed from registry");
        }
    }

    /// Number of rooms in the registry, including ones still being created.
    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }

    /// Shuts every room down and empties the registry.
    pub async fn shutdown_all(&self) {
        let slots: Vec<Slot> = self.rooms.lock().await.drain().map(|(_, slot)| slot).collect();
        for slot in slots {
            if let Some(handle) = slot.get() {
                let _ = handle.shutdown().await;
            }
        }
        tracing::info!("all rooms shut down");
    }
}
