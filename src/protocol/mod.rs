// Protocol module: frame layout, opcodes, and body codecs

pub mod codec;
pub mod error;
pub mod header;
pub mod packet;
pub mod types;
pub mod value;

pub use codec::BinaryStruct;
pub use error::{FramingError, PacketError};
pub use header::PacketHeader;
pub use packet::{Packet, HEADER_SIZE, LENGTH_SIZE, OPCODE_SIZE};
pub use types::{NetworkObject, RankEntry, RecordEntry, Vector2, Vector3};
pub use value::{DataType, Value};
