use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

/// Per-room mutual exclusion.
///
/// Every mutation in a room and the broadcast that follows it run while the
/// room's guard is held, so all connections see a room's changes in the order
/// they hit the store. Joins and the idle sweep take the same guard.
#[derive(Clone, Default)]
pub struct Sequencer {
    rooms: Arc<Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>>,
}

pub type RoomGuard = OwnedMutexGuard<()>;

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, room_id: Uuid) -> RoomGuard {
        let slot = {
            let mut rooms = self.rooms.lock().unwrap_or_else(|e| e.into_inner());
            // Only the map holds an idle room's slot; drop those as we go.
            rooms.retain(|id, slot| *id == room_id || Arc::strong_count(slot) > 1);
            rooms.entry(room_id).or_default().clone()
        };
        slot.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.rooms.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
