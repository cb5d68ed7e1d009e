//! Plain data carried inside packet bodies.

use super::{BinaryStruct, Packet, PacketError};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Identity and ownership of a replicated object.
///
/// Transform updates travel as opaque sync frames and are never folded back
/// into this record.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkObject {
    pub network_id: i32,
    pub prefab_name: String,
    pub position: Vector3,
    pub rotation: Vector3,
    /// Session id allowed to drive the object.
    pub authority: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankEntry {
    /// 1-based.
    pub rank: i32,
    pub name: String,
    pub kill_count: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordEntry {
    pub name: String,
    pub kill_count: i32,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl BinaryStruct for Vector2 {
    fn encode(&self, packet: &mut Packet) -> Result<(), PacketError> {
        packet.write_vector2(*self)
    }

    fn decode(packet: &mut Packet) -> Result<Self, PacketError> {
        packet.read_vector2()
    }
}

impl BinaryStruct for Vector3 {
    fn encode(&self, packet: &mut Packet) -> Result<(), PacketError> {
        packet.write_vector3(*self)
    }

    fn decode(packet: &mut Packet) -> Result<Self, PacketError> {
        packet.read_vector3()
    }
}

impl BinaryStruct for NetworkObject {
    fn encode(&self, packet: &mut Packet) -> Result<(), PacketError> {
        packet.write_i32(self.network_id)?;
        packet.write_string(&self.prefab_name)?;
        packet.write_vector3(self.position)?;
        packet.write_vector3(self.rotation)?;
        packet.write_u32(self.authority)
    }

    fn decode(packet: &mut Packet) -> Result<Self, PacketError> {
        Ok(Self {
            network_id: packet.read_i32()?,
            prefab_name: packet.read_string()?,
            position: packet.read_vector3()?,
            rotation: packet.read_vector3()?,
            authority: packet.read_u32()?,
        })
    }
}

impl BinaryStruct for RankEntry {
    fn encode(&self, packet: &mut Packet) -> Result<(), PacketError> {
        packet.write_i32(self.rank)?;
        packet.write_string(&self.name)?;
        packet.write_i32(self.kill_count)
    }

    fn decode(packet: &mut Packet) -> Result<Self, PacketError> {
        Ok(Self {
            rank: packet.read_i32()?,
            name: packet.read_string()?,
            kill_count: packet.read_i32()?,
        })
    }
}

// Timestamps travel as RFC 3339 strings; an unparsable one decodes as the epoch.
impl BinaryStruct for RecordEntry {
    fn encode(&self, packet: &mut Packet) -> Result<(), PacketError> {
        packet.write_string(&self.name)?;
        packet.write_i32(self.kill_count)?;
        packet.write_string(&self.timestamp.to_rfc3339())
    }

    fn decode(packet: &mut Packet) -> Result<Self, PacketError> {
        let name = packet.read_string()?;
        let kill_count = packet.read_i32()?;
        let timestamp = chrono::DateTime::parse_from_rfc3339(&packet.read_string()?)
            .map(|t| t.with_timezone(&chrono::Utc))
            .unwrap_or_default();
        Ok(Self {
            name,
            kill_count,
            timestamp,
        })
    }
}
