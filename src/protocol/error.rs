use thiserror::Error;

use super::HEADER_SIZE;
use crate::pool::PoolError;

/// Cursor and decoding failures on a single [`Packet`](super::Packet).
///
/// These never tear a session down on their own; the room layer logs them and
/// drops the request that produced them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("buffer overrun: {requested} bytes requested, {available} free")]
    BufferOverrun { requested: usize, available: usize },
    #[error("buffer underrun: {requested} bytes requested, {available} unread")]
    BufferUnderrun { requested: usize, available: usize },
    #[error("unknown data type tag {0}")]
    UnknownDataType(i16),
    #[error("negative length prefix {0}")]
    NegativeLength(i32),
    #[error("string payload is not valid UTF-8")]
    InvalidUtf8,
    #[error("unknown opcode {0}")]
    UnknownOpcode(i16),
}

/// Stream-level failures while cutting frames out of a receive accumulator.
///
/// Any of these ends the session that produced the bytes.
#[derive(Debug, Error)]
pub enum FramingError {
    #[error("frame length {length} is smaller than the {HEADER_SIZE}-byte header")]
    TooShort { length: i32 },
    #[error("frame length {length} exceeds packet capacity {capacity}")]
    TooLong { length: i32, capacity: usize },
    #[error("{incoming} incoming bytes overflow the accumulator ({buffered}/{capacity} in use)")]
    Overflow {
        incoming: usize,
        buffered: usize,
        capacity: usize,
    },
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Packet(#[from] PacketError),
}
