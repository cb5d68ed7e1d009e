use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::protocol::{NetworkObject, Packet, PacketHeader};
use crate::session::Session;

use super::RoomServer;

impl RoomServer {
    /// Record a client-numbered object and announce it to the other members.
    /// An id already present in the room is refused outright.
    pub async fn handle_object_spawn(&self, session: &Arc<Session>, packet: &mut Packet) -> EngineResult<()> {
        let object: NetworkObject = packet.read_struct()?;
        let session_id = session.id();
        let (room_id, room) = self.member_room(session_id).await?;
        let mut guard = room.lock().await;
        guard.ensure_member(session_id)?;

        let network_id = object.network_id;
        if guard.spawned_objects.contains_key(&network_id) {
            self.metrics.increment_spawn_conflicts();
            warn!(room_id, session_id, network_id, "duplicate network id rejected");
            return Err(EngineError::DuplicateNetworkId {
                room: room_id,
                network_id,
            });
        }

        guard.broadcast(PacketHeader::ObjectSpawn, Some(session_id), |out| {
            out.write_struct(&object)
        });
        debug!(room_id, session_id, network_id, prefab = %object.prefab_name, "object spawned");
        guard.spawned_objects.insert(network_id, object);
        self.metrics.increment_objects_spawned();
        Ok(())
    }

    /// Sync frames are forwarded untouched; the server never merges them.
    pub async fn handle_object_sync(&self, session: &Arc<Session>, packet: &Packet) -> EngineResult<()> {
        let body = packet.body();
        if body.is_empty() {
            return Ok(());
        }
        let session_id = session.id();
        let (_, room) = self.member_room(session_id).await?;
        let guard = room.lock().await;
        guard.ensure_member(session_id)?;
        guard.relay(PacketHeader::ObjectSync, body, Some(session_id));
        Ok(())
    }

    /// Forget the object and tell the others, even if it was never recorded
    /// here; clients may hold local-only copies.
    pub async fn handle_object_despawn(&self, session: &Arc<Session>, packet: &mut Packet) -> EngineResult<()> {
        let network_id = packet.read_i32()?;
        let session_id = session.id();
        let (room_id, room) = self.member_room(session_id).await?;
        let mut guard = room.lock().await;
        guard.ensure_member(session_id)?;

        if guard.spawned_objects.remove(&network_id).is_some() {
            self.metrics.increment_objects_despawned();
        }
        guard
            .player_objects
            .retain(|_, player_object| *player_object != network_id);
        guard.broadcast(PacketHeader::ObjectDespawn, Some(session_id), |out| {
            out.write_i32(network_id)
        });
        debug!(room_id, session_id, network_id, "object despawned");
        Ok(())
    }

    /// Assign the player object driven by `authority`, replacing any earlier one.
    pub async fn handle_set_player_object(&self, session: &Arc<Session>, packet: &mut Packet) -> EngineResult<()> {
        let authority = packet.read_u32()?;
        let network_id = packet.read_i32()?;
        let session_id = session.id();
        let (room_id, room) = self.member_room(session_id).await?;
        let mut guard = room.lock().await;
        guard.ensure_member(session_id)?;

        guard.player_objects.insert(authority, network_id);
        guard.broadcast(PacketHeader::SetPlayerObject, Some(session_id), |out| {
            out.write_u32(authority)?;
            out.write_i32(network_id)
        });
        debug!(room_id, authority, network_id, "player object set");
        Ok(())
    }
}
