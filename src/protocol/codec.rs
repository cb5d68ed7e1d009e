use super::{Packet, PacketError};

/// Explicit field-by-field wire codec for a body struct.
///
/// Implementations write fields in declaration order using the packet's
/// primitive writers, so the byte layout is fixed by the code rather than by
/// in-memory representation.
pub trait BinaryStruct: Sized {
    fn encode(&self, packet: &mut Packet) -> Result<(), PacketError>;

    fn decode(packet: &mut Packet) -> Result<Self, PacketError>;
}

impl Packet {
    /// A failed encode rolls the write cursor back.
    pub fn write_struct<T: BinaryStruct>(&mut self, value: &T) -> Result<(), PacketError> {
        let mark = self.write_offset();
        let result = value.encode(self);
        if result.is_err() {
            self.truncate(mark);
        }
        result
    }

    /// A failed decode rolls the read cursor back.
    pub fn read_struct<T: BinaryStruct>(&mut self) -> Result<T, PacketError> {
        let mark = self.read_offset();
        let result = T::decode(self);
        if result.is_err() {
            self.rewind(mark);
        }
        result
    }

    /// Element count prefix shared by every list on the wire.
    pub fn write_count(&mut self, count: usize) -> Result<(), PacketError> {
        let count = i32::try_from(count).map_err(|_| PacketError::BufferOverrun {
            requested: count,
            available: 0,
        })?;
        self.write_i32(count)
    }

    /// Writes `i32 count` followed by each item.
    pub fn write_list<T: BinaryStruct>(&mut self, items: &[T]) -> Result<(), PacketError> {
        self.write_count(items.len())?;
        for item in items {
            self.write_struct(item)?;
        }
        Ok(())
    }

    /// Like [`write_list`](Self::write_list), but keeps only the longest
    /// leading run of `items` that fits. Returns how many were written.
    pub fn write_list_truncated<T: BinaryStruct>(&mut self, items: &[T]) -> Result<usize, PacketError> {
        let mark = self.write_offset();
        self.write_count(items.len())?;
        let mut written = 0;
        for item in items {
            match self.write_struct(item) {
                Ok(()) => written += 1,
                Err(PacketError::BufferOverrun { .. }) => break,
                Err(e) => {
                    self.truncate(mark);
                    return Err(e);
                }
            }
        }
        if written < items.len() {
            // Rewrite with the corrected count; the prefix fitted once already.
            self.truncate(mark);
            self.write_list(&items[..written])?;
        }
        Ok(written)
    }

    pub fn read_list<T: BinaryStruct>(&mut self) -> Result<Vec<T>, PacketError> {
        let count = self.read_len()?;
        // A hostile count must not drive the allocation.
        let mut items = Vec::with_capacity(count.min(self.remaining()));
        for _ in 0..count {
            items.push(self.read_struct()?);
        }
        Ok(items)
    }
}
