use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::net::SessionHandler;
use crate::protocol::{Packet, PacketHeader};
use crate::session::Session;

use super::{LeaveReason, RoomServer};

impl RoomServer {
    /// Route one client packet by opcode. Server-to-client opcodes arriving
    /// from a client are refused.
    pub async fn handle_client_packet(
        &self,
        session: &Arc<Session>,
        header: PacketHeader,
        packet: &mut Packet,
    ) -> EngineResult<()> {
        match header {
            PacketHeader::Ping => self.handle_ping(session),
            PacketHeader::RequestRoomJoin => {
                let requested_name = if packet.remaining() > 0 {
                    Some(packet.read_string()?)
                } else {
                    None
                };
                self.handle_join_room(session, requested_name).await.map(|_| ())
            }
            PacketHeader::RequestRoomLeave => {
                self.leave_room(session, LeaveReason::Requested).await
            }
            PacketHeader::RequestObjectSpawn => self.handle_object_spawn(session, packet).await,
            PacketHeader::RequestObjectSync => self.handle_object_sync(session, packet).await,
            PacketHeader::RequestObjectDespawn => {
                self.handle_object_despawn(session, packet).await
            }
            PacketHeader::Chat => self.handle_chat(session, packet).await,
            PacketHeader::Rpc => self.handle_rpc(session, packet).await,
            PacketHeader::RequestSetPlayerObject => {
                self.handle_set_player_object(session, packet).await
            }
            PacketHeader::RequestSignIn => self.handle_sign_in(session, packet).map(drop),
            PacketHeader::RequestSignUp => self.handle_sign_up(session, packet).map(drop),
            PacketHeader::RequestRank => {
                drop(self.handle_rank_request(session));
                Ok(())
            }
            PacketHeader::RequestRecord => self.handle_record_request(session, packet).map(drop),
            PacketHeader::RequestCreateRecord => {
                self.handle_create_record(session, packet).map(drop)
            }
            PacketHeader::RequestGameEnd => self.handle_game_end(session).await,
            PacketHeader::RequestSceneChange => {
                let scene = packet.read_string()?;
                self.handle_scene_change(session, scene).await
            }
            PacketHeader::Pong
            | PacketHeader::RoomJoin
            | PacketHeader::RoomLeave
            | PacketHeader::ObjectSpawn
            | PacketHeader::ObjectSync
            | PacketHeader::ObjectDespawn
            | PacketHeader::SetPlayerObject
            | PacketHeader::SetHostClient
            | PacketHeader::SignInAllow
            | PacketHeader::SignInDeny
            | PacketHeader::SignUpAllow
            | PacketHeader::SignUpDeny
            | PacketHeader::Rank
            | PacketHeader::Record
            | PacketHeader::SceneChange => Err(EngineError::UnexpectedOpcode(header.into())),
        }
    }

    fn handle_ping(&self, session: &Arc<Session>) -> EngineResult<()> {
        let session_id = session.id();
        session.send(PacketHeader::Pong, |out| out.write_u32(session_id))?;
        Ok(())
    }
}

#[async_trait]
impl SessionHandler for RoomServer {
    async fn on_packet(&self, session: &Arc<Session>, packet: &mut Packet) {
        let header = match packet.header() {
            Ok(header) => header,
            Err(e) => {
                self.metrics.increment_packets_dropped();
                warn!(session_id = session.id(), error = %e, "dropping packet");
                return;
            }
        };

        if let Err(e) = self.handle_client_packet(session, header, packet).await {
            if matches!(e, EngineError::UnexpectedOpcode(_)) {
                self.metrics.increment_packets_dropped();
            }
            if e.is_client_rule() {
                debug!(session_id = session.id(), %header, error = %e, "request refused");
            } else {
                warn!(session_id = session.id(), %header, error = %e, "request failed");
            }
        }
    }

    async fn on_disconnected(&self, session: &Arc<Session>) {
        match self.leave_room(session, LeaveReason::Disconnected).await {
            Ok(()) | Err(EngineError::NotInRoom(_)) => {}
            Err(e) => warn!(session_id = session.id(), error = %e, "leave on disconnect failed"),
        }
    }
}
