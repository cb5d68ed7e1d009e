use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::protocol::{Packet, PacketError, PacketHeader};
use crate::session::{SendError, Session, SessionId};

use super::{Room, RoomId, RoomServer};

/// Why a session is leaving its room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveReason {
    /// The client asked; it gets its own leave notice as confirmation.
    Requested,
    /// The connection is gone; only the remaining members are told.
    Disconnected,
}

impl RoomServer {
    /// Place `session` in the lowest-id room with a free slot, or open a new
    /// room with it as host. The joiner receives the full room snapshot and
    /// everyone else a join notice.
    pub async fn handle_join_room(
        &self,
        session: &Arc<Session>,
        requested_name: Option<String>,
    ) -> EngineResult<RoomId> {
        let session_id = session.id();
        if let Some(room) = self.room_of(session_id) {
            return Err(EngineError::AlreadyInRoom {
                session: session_id,
                room,
            });
        }
        if session.user_name().is_none() {
            if let Some(name) = requested_name.filter(|name| !name.is_empty()) {
                session.set_user_name(name);
            }
        }

        // Fast path: clone the handles out of the read lock, then inspect
        // rooms one at a time.
        let candidates: Vec<Arc<Mutex<Room>>> =
            self.rooms.read().await.values().cloned().collect();
        for room in candidates {
            let mut guard = room.lock().await;
            if guard.has_room_for(self.config.max_room_size) {
                return self.seat(&mut guard, session);
            }
        }

        self.join_or_create(session).await
    }

    /// Slow path: a concurrent joiner may have opened a room since the scan,
    /// so look again while holding the directory write lock before creating.
    /// Lock order is directory then room; nothing waits on the directory
    /// while holding a room lock.
    async fn join_or_create(&self, session: &Arc<Session>) -> EngineResult<RoomId> {
        let mut rooms = self.rooms.write().await;
        for room in rooms.values() {
            let mut guard = room.lock().await;
            if guard.has_room_for(self.config.max_room_size) {
                return self.seat(&mut guard, session);
            }
        }

        let room_id = loop {
            let id = self.allocate_room_id();
            if !rooms.contains_key(&id) {
                break id;
            }
        };
        let room = Room::new(room_id, Arc::clone(session), self.config.initial_scene.clone());
        // Not yet published, so nothing else can observe it before the reply
        // is queued.
        let snapshot = self.prepare_snapshot(&room, session)?;
        self.memberships.insert(session.id(), room_id);
        session.enqueue(snapshot);
        rooms.insert(room_id, Arc::new(Mutex::new(room)));
        drop(rooms);

        self.metrics.increment_rooms_created();
        self.metrics.increment_rooms_joined();
        info!(room_id, host = session.id(), "room created");
        Ok(room_id)
    }

    /// Add `joiner` to an open room. The snapshot is built first; if it does
    /// not fit, the room is left untouched.
    fn seat(&self, room: &mut Room, joiner: &Arc<Session>) -> EngineResult<RoomId> {
        let snapshot = self.prepare_snapshot(room, joiner)?;
        let joiner_id = joiner.id();
        let name = joiner.display_name();

        room.sessions.push(Arc::clone(joiner));
        self.memberships.insert(joiner_id, room.id);
        room.broadcast(PacketHeader::RoomJoin, Some(joiner_id), |packet| {
            packet.write_u32(joiner_id)?;
            packet.write_string(&name)
        });
        joiner.enqueue(snapshot);

        self.metrics.increment_rooms_joined();
        info!(
            room_id = room.id,
            session_id = joiner_id,
            members = room.sessions.len(),
            "session joined room"
        );
        Ok(room.id)
    }

    fn prepare_snapshot(&self, room: &Room, joiner: &Arc<Session>) -> EngineResult<Packet> {
        let name = joiner.display_name();
        joiner
            .prepare(PacketHeader::RoomJoin, |packet| {
                write_room_snapshot(packet, room, joiner, &name)
            })
            .map_err(|e| match e {
                SendError::Packet(PacketError::BufferOverrun { .. }) => {
                    EngineError::SnapshotTooLarge {
                        session: joiner.id(),
                        room: room.id,
                    }
                }
                other => other.into(),
            })
    }

    /// Remove `session` from its room. A departing host hands over to the
    /// first remaining member; the last member out deletes the room.
    pub async fn leave_room(&self, session: &Arc<Session>, reason: LeaveReason) -> EngineResult<()> {
        let session_id = session.id();
        let Some((_, room_id)) = self.memberships.remove(&session_id) else {
            return Err(EngineError::NotInRoom(session_id));
        };
        let Some(room) = self.room_handle(room_id).await else {
            return Ok(());
        };

        let mut guard = room.lock().await;
        // A game end may have emptied the room while we waited.
        if guard.remove_member(session_id).is_none() {
            return Ok(());
        }
        guard.player_objects.remove(&session_id);
        self.metrics.increment_rooms_left();

        guard.broadcast(PacketHeader::RoomLeave, None, |packet| {
            packet.write_u32(session_id)
        });
        if reason == LeaveReason::Requested {
            if let Err(e) = session.send(PacketHeader::RoomLeave, |packet| packet.write_u32(session_id)) {
                debug!(room_id, session_id, error = %e, "leave confirmation not sent");
            }
        }
        info!(room_id, session_id, ?reason, remaining = guard.sessions.len(), "session left room");

        if guard.sessions.is_empty() {
            guard.retired = true;
            drop(guard);
            self.remove_room(room_id).await;
            return Ok(());
        }

        if guard.host_client_id == session_id {
            let new_host = guard.sessions[0].id();
            guard.host_client_id = new_host;
            guard.broadcast(PacketHeader::SetHostClient, None, |packet| {
                packet.write_u32(new_host)
            });
            self.metrics.increment_host_migrations();
            info!(room_id, old_host = session_id, new_host, "host migrated");
        }
        Ok(())
    }

    /// Every member gets its own leave notice, then the room is deleted.
    pub async fn handle_game_end(&self, session: &Arc<Session>) -> EngineResult<()> {
        let (room_id, room) = self.member_room(session.id()).await?;
        let mut guard = room.lock().await;
        guard.ensure_member(session.id())?;

        for member in &guard.sessions {
            let member_id = member.id();
            if let Err(e) = member.send(PacketHeader::RoomLeave, |packet| packet.write_u32(member_id)) {
                debug!(room_id, session_id = member_id, error = %e, "game end notice not sent");
            }
            // Only clear the entry if it still points here.
            self.memberships
                .remove_if(&member_id, |_, member_room| *member_room == room_id);
            self.metrics.increment_rooms_left();
        }
        let members = guard.sessions.len();
        guard.sessions.clear();
        guard.retired = true;
        drop(guard);

        self.remove_room(room_id).await;
        info!(room_id, ended_by = session.id(), members, "game ended");
        Ok(())
    }

    /// Host-only. Updates the scene new joiners are told about and relays it.
    pub async fn handle_scene_change(&self, session: &Arc<Session>, scene: String) -> EngineResult<()> {
        let session_id = session.id();
        let (room_id, room) = self.member_room(session_id).await?;
        let mut guard = room.lock().await;
        guard.ensure_member(session_id)?;
        if guard.host_client_id != session_id {
            return Err(EngineError::NotHost {
                session: session_id,
                room: room_id,
            });
        }
        guard.relay_scene(&scene, session_id);
        debug!(room_id, scene = %scene, "scene changed");
        guard.current_scene = scene;
        Ok(())
    }

    /// Handle to the caller's room. Membership is re-checked under the room
    /// lock with [`Room::ensure_member`].
    pub(super) async fn member_room(
        &self,
        session_id: SessionId,
    ) -> EngineResult<(RoomId, Arc<Mutex<Room>>)> {
        let room_id = self
            .room_of(session_id)
            .ok_or(EngineError::NotInRoom(session_id))?;
        let room = self
            .room_handle(room_id)
            .await
            .ok_or(EngineError::NotInRoom(session_id))?;
        Ok((room_id, room))
    }

    async fn remove_room(&self, room_id: RoomId) {
        if self.rooms.write().await.remove(&room_id).is_some() {
            self.metrics.increment_rooms_deleted();
            info!(room_id, "room deleted");
        }
    }
}

impl Room {
    fn relay_scene(&self, scene: &str, from: SessionId) {
        self.broadcast(PacketHeader::SceneChange, Some(from), |packet| {
            packet.write_string(scene)
        });
    }
}

/// Join reply: the notice prefix followed by host, members, player objects,
/// spawned objects and scene. The member list includes `joiner` whether or
/// not it has been seated yet.
fn write_room_snapshot(
    packet: &mut Packet,
    room: &Room,
    joiner: &Arc<Session>,
    joiner_name: &str,
) -> Result<(), PacketError> {
    let joiner_id = joiner.id();
    let seated = room.contains(joiner_id);
    packet.write_u32(joiner_id)?;
    packet.write_string(joiner_name)?;
    packet.write_u32(room.host_client_id)?;

    packet.write_count(room.sessions.len() + usize::from(!seated))?;
    for member in &room.sessions {
        packet.write_u32(member.id())?;
        packet.write_string(&member.display_name())?;
    }
    if !seated {
        packet.write_u32(joiner_id)?;
        packet.write_string(joiner_name)?;
    }

    packet.write_count(room.player_objects.len())?;
    for (authority, network_id) in &room.player_objects {
        packet.write_u32(*authority)?;
        packet.write_i32(*network_id)?;
    }

    packet.write_count(room.spawned_objects.len())?;
    for object in room.spawned_objects.values() {
        packet.write_struct(object)?;
    }

    packet.write_string(&room.current_scene)
}
