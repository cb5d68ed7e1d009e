//! Crate-wide error aggregate.
//!
//! Each layer owns a narrow `thiserror` enum; [`EngineError`] folds them
//! together for the room handlers, which log and drop rather than propagate.

use thiserror::Error;

use crate::persistence::PersistenceError;
use crate::pool::PoolError;
use crate::protocol::{FramingError, PacketError};
use crate::server::RoomId;
use crate::session::{SendError, SessionId};

pub use crate::net::{RegisterSessionError, TransportError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Packet(#[from] PacketError),

    #[error(transparent)]
    Framing(#[from] FramingError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Send(#[from] SendError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("session {0} is not in a room")]
    NotInRoom(SessionId),

    #[error("session {session} is already in room {room}")]
    AlreadyInRoom { session: SessionId, room: RoomId },

    #[error("network id {network_id} already exists in room {room}")]
    DuplicateNetworkId { room: RoomId, network_id: i32 },

    #[error("session {session} is not the host of room {room}")]
    NotHost { session: SessionId, room: RoomId },

    #[error("opcode {0} is not accepted from clients")]
    UnexpectedOpcode(i16),

    /// The join reply would not fit one packet; the join is refused.
    #[error("room {room} snapshot does not fit one packet for session {session}")]
    SnapshotTooLarge { session: SessionId, room: RoomId },
}

impl EngineError {
    /// Rule violations by a well-formed client, as opposed to malformed input
    /// or resource trouble. Logged at debug level.
    #[must_use]
    pub const fn is_client_rule(&self) -> bool {
        matches!(
            self,
            Self::NotInRoom(_)
                | Self::AlreadyInRoom { .. }
                | Self::NotHost { .. }
                | Self::UnexpectedOpcode(_)
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_errors_convert() {
        let err: EngineError = PacketError::InvalidUtf8.into();
        assert!(matches!(err, EngineError::Packet(PacketError::InvalidUtf8)));
        assert!(!err.is_client_rule());
    }

    #[test]
    fn test_rule_violations_are_classified() {
        assert!(EngineError::NotInRoom(3).is_client_rule());
        assert!(EngineError::NotHost { session: 1, room: 2 }.is_client_rule());
        assert!(!EngineError::DuplicateNetworkId {
            room: 1,
            network_id: 7
        }
        .is_client_rule());
        assert!(!EngineError::SnapshotTooLarge { session: 2, room: 1 }.is_client_rule());
        assert_eq!(
            EngineError::AlreadyInRoom { session: 4, room: 9 }.to_string(),
            "session 4 is already in room 9"
        );
    }
}
