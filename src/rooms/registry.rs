use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OwnedMutexGuard, RwLock};
use tracing::debug;

use super::room::{Room, RoomInner, RoomPhase};

/// Outcome of [`RoomRegistry::resolve`].
pub enum Resolved {
    /// The room was already registered, possibly still loading.
    Cached(Arc<Room>),
    /// A new `Loading` room. The caller holds its lock and must load it.
    Created(Arc<Room>, OwnedMutexGuard<RoomInner>),
}

/// Every room currently held in memory, by room key.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Arc<Room>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the room for `key`, creating and registering it if needed.
    ///
    /// A new room is registered with its lock already taken, so concurrent
    /// callers for the same key queue behind the load instead of starting a
    /// second one. An `Unloaded` entry is treated as absent and replaced.
    pub async fn resolve(&self, key: &str) -> Resolved {
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(key) {
            if room.phase() != RoomPhase::Unloaded {
                return Resolved::Cached(room.clone());
            }
        }

        let room = Arc::new(Room::new(key));
        // Nobody else can see this room yet, so the lock is free.
        let guard = room.lock().await;
        rooms.insert(key.to_string(), room.clone());
        debug!("Registered room {}", key);
        Resolved::Created(room, guard)
    }

    pub async fn get(&self, key: &str) -> Option<Arc<Room>> {
        self.rooms.read().await.get(key).cloned()
    }

    /// Drop the entry for this exact room.
    ///
    /// Does nothing if the key now maps to a newer room.
    pub async fn remove(&self, room: &Arc<Room>) -> bool {
        let mut rooms = self.rooms.write().await;
        match rooms.get(room.key()) {
            Some(current) if Arc::ptr_eq(current, room) => {
                rooms.remove(room.key());
                debug!("Removed room {}", room.key());
                true
            }
            _ => false,
        }
    }

    pub async fn rooms(&self) -> Vec<Arc<Room>> {
        self.rooms.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rooms.read().await.is_empty()
    }
}
