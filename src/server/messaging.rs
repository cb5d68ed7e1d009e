use std::sync::Arc;
use tracing::debug;

use crate::error::EngineResult;
use crate::protocol::{Packet, PacketHeader};
use crate::session::Session;

use super::RoomServer;

impl RoomServer {
    /// Relay a chat line, tagged with the sender id, to the other members.
    pub async fn handle_chat(&self, session: &Arc<Session>, packet: &mut Packet) -> EngineResult<()> {
        let message = packet.read_string()?;
        let session_id = session.id();
        let (room_id, room) = self.member_room(session_id).await?;
        let guard = room.lock().await;
        guard.ensure_member(session_id)?;

        let delivered = guard.broadcast(PacketHeader::Chat, Some(session_id), |out| {
            out.write_u32(session_id)?;
            out.write_string(&message)
        });
        debug!(room_id, session_id, delivered, "chat relayed");
        Ok(())
    }

    /// RPC payloads are opaque to the server.
    pub async fn handle_rpc(&self, session: &Arc<Session>, packet: &Packet) -> EngineResult<()> {
        let session_id = session.id();
        let (room_id, room) = self.member_room(session_id).await?;
        let guard = room.lock().await;
        guard.ensure_member(session_id)?;

        let delivered = guard.relay(PacketHeader::Rpc, packet.body(), Some(session_id));
        debug!(room_id, session_id, delivered, bytes = packet.body().len(), "rpc relayed");
        Ok(())
    }
}
