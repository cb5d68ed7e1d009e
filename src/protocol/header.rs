use std::fmt;

use super::PacketError;

macro_rules! packet_headers {
    ($($(#[$meta:meta])* $name:ident = $value:literal,)+) => {
        /// Opcodes understood by the lobby protocol.
        ///
        /// Values are part of the wire format; new opcodes are only ever
        /// appended.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(i16)]
        pub enum PacketHeader {
            $($(#[$meta])* $name = $value,)+
        }

        impl PacketHeader {
            pub const ALL: &'static [PacketHeader] = &[$(PacketHeader::$name,)+];

            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(PacketHeader::$name => stringify!($name),)+
                }
            }
        }

        impl TryFrom<i16> for PacketHeader {
            type Error = PacketError;

            fn try_from(value: i16) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok(PacketHeader::$name),)+
                    other => Err(PacketError::UnknownOpcode(other)),
                }
            }
        }
    };
}

packet_headers! {
    Ping = 0,
    /// Carries the receiving session's id.
    Pong = 1,
    RequestRoomJoin = 2,
    RoomJoin = 3,
    RequestRoomLeave = 4,
    RoomLeave = 5,
    RequestObjectSpawn = 6,
    ObjectSpawn = 7,
    RequestObjectSync = 8,
    ObjectSync = 9,
    RequestObjectDespawn = 10,
    ObjectDespawn = 11,
    Chat = 12,
    Rpc = 13,
    RequestSetPlayerObject = 14,
    SetPlayerObject = 15,
    SetHostClient = 16,
    RequestSignIn = 17,
    SignInAllow = 18,
    SignInDeny = 19,
    RequestSignUp = 20,
    SignUpAllow = 21,
    SignUpDeny = 22,
    RequestRank = 23,
    Rank = 24,
    RequestRecord = 25,
    Record = 26,
    RequestCreateRecord = 27,
    RequestGameEnd = 28,
    /// Host only.
    RequestSceneChange = 29,
    SceneChange = 30,
}

impl From<PacketHeader> for i16 {
    fn from(header: PacketHeader) -> Self {
        header as i16
    }
}

impl fmt::Display for PacketHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
