//! Authoritative lobby: rooms, membership and the handlers that mutate them.
//!
//! [`RoomServer`] is the [`SessionHandler`](crate::net::SessionHandler) both
//! engines dispatch into. Room state lives behind one `tokio::sync::Mutex`
//! per room; the room directory is a separate `RwLock`. Locks are taken
//! directory first, and no handler waits on the directory while holding a
//! room lock.

use dashmap::DashMap;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::config::RoomConfig;
use crate::error::{EngineError, EngineResult};
use crate::metrics::ServerMetrics;
use crate::persistence::PersistenceService;
use crate::protocol::{NetworkObject, Packet, PacketError, PacketHeader};
use crate::session::{Session, SessionId};

mod account_service;
mod authority;
mod message_router;
#[cfg(test)]
mod message_router_tests;
mod messaging;
mod room_service;

pub use room_service::LeaveReason;

pub type RoomId = u32;

/// Members of one room, in join order. Sized for the default room size.
pub type RoomMembers = SmallVec<[Arc<Session>; 4]>;

/// One lobby room. Only ever touched under its own lock.
#[derive(Debug)]
pub struct Room {
    id: RoomId,
    host_client_id: SessionId,
    sessions: RoomMembers,
    spawned_objects: BTreeMap<i32, NetworkObject>,
    /// Authority session id to the network id of its player object.
    player_objects: BTreeMap<SessionId, i32>,
    current_scene: String,
    /// Set once the room emptied; a joiner holding a stale handle skips it.
    retired: bool,
}

impl Room {
    fn new(id: RoomId, host: Arc<Session>, scene: String) -> Self {
        let host_client_id = host.id();
        let mut sessions = RoomMembers::new();
        sessions.push(host);
        Self {
            id,
            host_client_id,
            sessions,
            spawned_objects: BTreeMap::new(),
            player_objects: BTreeMap::new(),
            current_scene: scene,
            retired: false,
        }
    }

    fn contains(&self, session_id: SessionId) -> bool {
        self.sessions.iter().any(|s| s.id() == session_id)
    }

    /// A game end can empty a room between the membership lookup and the lock.
    fn ensure_member(&self, session_id: SessionId) -> EngineResult<()> {
        if self.retired || !self.contains(session_id) {
            return Err(EngineError::NotInRoom(session_id));
        }
        Ok(())
    }

    fn has_room_for(&self, max_room_size: usize) -> bool {
        !self.retired && self.sessions.len() < max_room_size
    }

    fn remove_member(&mut self, session_id: SessionId) -> Option<Arc<Session>> {
        let index = self.sessions.iter().position(|s| s.id() == session_id)?;
        Some(self.sessions.remove(index))
    }

    /// Build one pooled packet per member except `exclude`. Returns how many
    /// sends were queued.
    fn broadcast<F>(&self, header: PacketHeader, exclude: Option<SessionId>, build: F) -> usize
    where
        F: Fn(&mut Packet) -> Result<(), PacketError>,
    {
        let mut delivered = 0;
        for session in &self.sessions {
            if Some(session.id()) == exclude {
                continue;
            }
            match session.send(header, &build) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    debug!(room_id = self.id, session_id = session.id(), %header, error = %e, "relay skipped member");
                }
            }
        }
        delivered
    }

    /// Copy `body` verbatim to every member except `exclude`.
    fn relay(&self, header: PacketHeader, body: &[u8], exclude: Option<SessionId>) -> usize {
        self.broadcast(header, exclude, |packet| packet.copy_buffer(body))
    }

    fn view(&self) -> RoomView {
        RoomView {
            id: self.id,
            host_client_id: self.host_client_id,
            members: self.sessions.iter().map(|s| s.id()).collect(),
            spawned_objects: self.spawned_objects.keys().copied().collect(),
            player_objects: self
                .player_objects
                .iter()
                .map(|(authority, network_id)| (*authority, *network_id))
                .collect(),
            current_scene: self.current_scene.clone(),
        }
    }
}

/// Point-in-time copy of a room for inspection and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomView {
    pub id: RoomId,
    pub host_client_id: SessionId,
    pub members: Vec<SessionId>,
    pub spawned_objects: Vec<i32>,
    pub player_objects: Vec<(SessionId, i32)>,
    pub current_scene: String,
}

/// Room directory plus the session-to-room map kept in lock-step with it.
pub struct RoomServer {
    rooms: RwLock<BTreeMap<RoomId, Arc<Mutex<Room>>>>,
    memberships: DashMap<SessionId, RoomId>,
    next_room_id: AtomicU32,
    persistence: Arc<dyn PersistenceService>,
    config: RoomConfig,
    metrics: Arc<ServerMetrics>,
}

impl RoomServer {
    #[must_use]
    pub fn new(
        config: RoomConfig,
        persistence: Arc<dyn PersistenceService>,
        metrics: Arc<ServerMetrics>,
    ) -> Self {
        Self {
            rooms: RwLock::new(BTreeMap::new()),
            memberships: DashMap::new(),
            next_room_id: AtomicU32::new(1),
            persistence,
            config,
            metrics,
        }
    }

    #[must_use]
    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<ServerMetrics> {
        &self.metrics
    }

    /// The room `session_id` currently belongs to.
    #[must_use]
    pub fn room_of(&self, session_id: SessionId) -> Option<RoomId> {
        self.memberships.get(&session_id).map(|entry| *entry.value())
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.read().await.keys().copied().collect()
    }

    pub async fn room_view(&self, room_id: RoomId) -> Option<RoomView> {
        let room = self.room_handle(room_id).await?;
        let guard = room.lock().await;
        (!guard.retired).then(|| guard.view())
    }

    async fn room_handle(&self, room_id: RoomId) -> Option<Arc<Mutex<Room>>> {
        self.rooms.read().await.get(&room_id).cloned()
    }

    fn allocate_room_id(&self) -> RoomId {
        loop {
            let id = self.next_room_id.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }
}

impl std::fmt::Debug for RoomServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomServer")
            .field("memberships", &self.memberships.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
