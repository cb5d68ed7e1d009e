//! Self-describing values: a 16-bit type tag followed by the encoded value.

use bytes::Bytes;

use super::{BinaryStruct, Packet, PacketError, Vector2, Vector3};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum DataType {
    Bool = 0,
    Short = 1,
    Int = 2,
    UInt = 3,
    Float = 4,
    String = 5,
    Vector2 = 6,
    Vector3 = 7,
    Struct = 8,
}

impl TryFrom<i16> for DataType {
    type Error = PacketError;

    fn try_from(tag: i16) -> Result<Self, Self::Error> {
        Ok(match tag {
            0 => Self::Bool,
            1 => Self::Short,
            2 => Self::Int,
            3 => Self::UInt,
            4 => Self::Float,
            5 => Self::String,
            6 => Self::Vector2,
            7 => Self::Vector3,
            8 => Self::Struct,
            other => return Err(PacketError::UnknownDataType(other)),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Short(i16),
    Int(i32),
    UInt(u32),
    Float(f32),
    String(String),
    Vector2(Vector2),
    Vector3(Vector3),
    /// An encoded [`BinaryStruct`], carried with an i32 length prefix.
    Struct(Bytes),
}

impl Value {
    #[must_use]
    pub const fn data_type(&self) -> DataType {
        match self {
            Self::Bool(_) => DataType::Bool,
            Self::Short(_) => DataType::Short,
            Self::Int(_) => DataType::Int,
            Self::UInt(_) => DataType::UInt,
            Self::Float(_) => DataType::Float,
            Self::String(_) => DataType::String,
            Self::Vector2(_) => DataType::Vector2,
            Self::Vector3(_) => DataType::Vector3,
            Self::Struct(_) => DataType::Struct,
        }
    }

    /// Encodes `value` into a standalone struct payload.
    pub fn from_struct<T: BinaryStruct>(value: &T, max_size: usize) -> Result<Self, PacketError> {
        let mut scratch = Packet::with_capacity(super::HEADER_SIZE + max_size);
        scratch.write_struct(value)?;
        Ok(Self::Struct(Bytes::copy_from_slice(scratch.body())))
    }

    /// Decodes a struct payload; `None` for any other variant.
    pub fn to_struct<T: BinaryStruct>(&self) -> Option<Result<T, PacketError>> {
        let Self::Struct(bytes) = self else {
            return None;
        };
        let mut scratch = Packet::with_capacity(super::HEADER_SIZE + bytes.len());
        Some(
            scratch
                .copy_buffer(bytes)
                .and_then(|()| scratch.read_struct::<T>()),
        )
    }
}

impl Packet {
    pub fn write_value(&mut self, value: &Value) -> Result<(), PacketError> {
        let mark = self.write_offset();
        let result = self.write_tagged(value);
        if result.is_err() {
            self.truncate(mark);
        }
        result
    }

    fn write_tagged(&mut self, value: &Value) -> Result<(), PacketError> {
        self.write_i16(value.data_type() as i16)?;
        match value {
            Value::Bool(v) => self.write_bool(*v),
            Value::Short(v) => self.write_i16(*v),
            Value::Int(v) => self.write_i32(*v),
            Value::UInt(v) => self.write_u32(*v),
            Value::Float(v) => self.write_f32(*v),
            Value::String(v) => self.write_string(v),
            Value::Vector2(v) => self.write_vector2(*v),
            Value::Vector3(v) => self.write_vector3(*v),
            Value::Struct(bytes) => {
                let len = i32::try_from(bytes.len()).map_err(|_| PacketError::BufferOverrun {
                    requested: bytes.len(),
                    available: 0,
                })?;
                if !self.can_write(4 + bytes.len()) {
                    return Err(PacketError::BufferOverrun {
                        requested: 4 + bytes.len(),
                        available: self.capacity() - self.write_offset(),
                    });
                }
                self.write_i32(len)?;
                self.copy_buffer(bytes)
            }
        }
    }

    pub fn read_value(&mut self) -> Result<Value, PacketError> {
        let mark = self.read_offset();
        let result = self.read_tagged();
        if result.is_err() {
            self.rewind(mark);
        }
        result
    }

    fn read_tagged(&mut self) -> Result<Value, PacketError> {
        let tag = DataType::try_from(self.read_i16()?)?;
        Ok(match tag {
            DataType::Bool => Value::Bool(self.read_bool()?),
            DataType::Short => Value::Short(self.read_i16()?),
            DataType::Int => Value::Int(self.read_i32()?),
            DataType::UInt => Value::UInt(self.read_u32()?),
            DataType::Float => Value::Float(self.read_f32()?),
            DataType::String => Value::String(self.read_string()?),
            DataType::Vector2 => Value::Vector2(self.read_vector2()?),
            DataType::Vector3 => Value::Vector3(self.read_vector3()?),
            DataType::Struct => {
                let len = self.read_len()?;
                Value::Struct(Bytes::copy_from_slice(self.read_bytes(len)?))
            }
        })
    }
}
