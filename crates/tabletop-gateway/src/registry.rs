use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use tabletop_types::events::ServerEvent;

/// Identifies one live socket. A participant may hold several.
pub type ConnId = Uuid;

/// Outbound half of a connection: events queued here are written to the socket.
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

/// Who is on the other end of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub participant_id: Uuid,
    pub room_id: Uuid,
    pub is_gm: bool,
}

struct Entry {
    binding: Binding,
    tx: EventSender,
}

#[derive(Default)]
struct Indices {
    /// conn_id -> binding + outbound channel
    connections: HashMap<ConnId, Entry>,
    /// room_id -> live conn_ids
    rooms: HashMap<Uuid, HashSet<ConnId>>,
}

/// Tracks every live connection and which room it belongs to.
///
/// Both indices sit behind one lock so a broadcast never sees a connection
/// that is half removed.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RwLock<Indices>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, conn_id: ConnId, binding: Binding, tx: EventSender) {
        let mut idx = self.inner.write().await;
        idx.rooms.entry(binding.room_id).or_default().insert(conn_id);
        idx.connections.insert(conn_id, Entry { binding, tx });
    }

    /// Drop a connection. Returns its binding the first time only.
    pub async fn remove(&self, conn_id: ConnId) -> Option<Binding> {
        let mut idx = self.inner.write().await;
        let entry = idx.connections.remove(&conn_id)?;
        let room_id = entry.binding.room_id;
        if let Some(conns) = idx.rooms.get_mut(&room_id) {
            conns.remove(&conn_id);
            if conns.is_empty() {
                idx.rooms.remove(&room_id);
            }
        }
        Some(entry.binding)
    }

    /// Send to every connection in the room except `exclude`.
    pub async fn broadcast(&self, room_id: Uuid, event: &ServerEvent, exclude: Option<ConnId>) {
        self.fan_out(room_id, event, |conn_id, _| Some(conn_id) != exclude)
            .await;
    }

    /// Like `broadcast`, limited to GM connections.
    pub async fn send_to_gms(&self, room_id: Uuid, event: &ServerEvent, exclude: Option<ConnId>) {
        self.fan_out(room_id, event, |conn_id, binding| {
            binding.is_gm && Some(conn_id) != exclude
        })
        .await;
    }

    pub async fn send_to(&self, conn_id: ConnId, event: ServerEvent) {
        let idx = self.inner.read().await;
        if let Some(entry) = idx.connections.get(&conn_id) {
            // A closed receiver means the socket is already going away
            let _ = entry.tx.send(event);
        }
    }

    pub async fn connections_in_room(&self, room_id: Uuid) -> HashSet<ConnId> {
        self.inner
            .read()
            .await
            .rooms
            .get(&room_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn is_room_live(&self, room_id: Uuid) -> bool {
        self.inner.read().await.rooms.contains_key(&room_id)
    }

    pub async fn binding(&self, conn_id: ConnId) -> Option<Binding> {
        self.inner
            .read()
            .await
            .connections
            .get(&conn_id)
            .map(|e| e.binding)
    }

    async fn fan_out<F>(&self, room_id: Uuid, event: &ServerEvent, include: F)
    where
        F: Fn(ConnId, &Binding) -> bool,
    {
        let idx = self.inner.read().await;
        let Some(conns) = idx.rooms.get(&room_id) else {
            return;
        };
        for conn_id in conns {
            let Some(entry) = idx.connections.get(conn_id) else {
                continue;
            };
            if include(*conn_id, &entry.binding) {
                let _ = entry.tx.send(event.clone());
            }
        }
    }
}
