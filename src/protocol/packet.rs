//! Fixed-capacity frame buffer with independent read and write cursors.
//!
//! Layout on the wire is `[opcode: i16 BE][frame_length: i32 BE][body]`, where
//! `frame_length` counts the header too. A fresh or reset packet has both
//! cursors parked at [`HEADER_SIZE`] so writers only ever touch the body.

use bytes::{Buf, BufMut};

use super::{PacketError, PacketHeader, Vector2, Vector3};

/// Opcode plus length prefix.
pub const HEADER_SIZE: usize = OPCODE_SIZE + LENGTH_SIZE;
pub const OPCODE_SIZE: usize = 2;
pub const LENGTH_SIZE: usize = 4;

#[derive(Debug, Clone)]
pub struct Packet {
    header: i16,
    buffer: Box<[u8]>,
    write_offset: usize,
    read_offset: usize,
}

impl Packet {
    /// Capacities below the header size are raised to it.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            header: 0,
            buffer: vec![0u8; capacity.max(HEADER_SIZE)].into_boxed_slice(),
            write_offset: HEADER_SIZE,
            read_offset: HEADER_SIZE,
        }
    }

    pub fn reset(&mut self) {
        self.header = 0;
        self.write_offset = HEADER_SIZE;
        self.read_offset = HEADER_SIZE;
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub const fn raw_header(&self) -> i16 {
        self.header
    }

    pub fn header(&self) -> Result<PacketHeader, PacketError> {
        PacketHeader::try_from(self.header)
    }

    /// Stamps the opcode and the current frame length into the header bytes.
    pub fn set_header(&mut self, header: impl Into<i16>) {
        self.header = header.into();
        self.stamp_header();
    }

    fn stamp_header(&mut self) {
        // write_offset never exceeds capacity, and capacity is validated to fit i32
        let length = i32::try_from(self.write_offset).unwrap_or(i32::MAX);
        let mut head = &mut self.buffer[..HEADER_SIZE];
        head.put_i16(self.header);
        head.put_i32(length);
    }

    #[must_use]
    pub const fn write_offset(&self) -> usize {
        self.write_offset
    }

    #[must_use]
    pub const fn read_offset(&self) -> usize {
        self.read_offset
    }

    /// Total frame length, header included.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.write_offset
    }

    /// True when nothing has been written past the header.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.write_offset == HEADER_SIZE
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.buffer[HEADER_SIZE..self.write_offset]
    }

    /// Bytes written but not yet read.
    #[must_use]
    pub fn unread(&self) -> &[u8] {
        &self.buffer[self.read_offset..self.write_offset]
    }

    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.write_offset - self.read_offset
    }

    /// The complete frame as it goes on the wire. Call after [`set_header`](Self::set_header).
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[..self.write_offset]
    }

    #[must_use]
    pub fn can_write(&self, size: usize) -> bool {
        size <= self.buffer.len() - self.write_offset
    }

    #[must_use]
    pub const fn can_read(&self, size: usize) -> bool {
        size <= self.write_offset - self.read_offset
    }

    fn ensure_write(&self, size: usize) -> Result<(), PacketError> {
        if self.can_write(size) {
            Ok(())
        } else {
            Err(PacketError::BufferOverrun {
                requested: size,
                available: self.buffer.len() - self.write_offset,
            })
        }
    }

    fn ensure_read(&self, size: usize) -> Result<(), PacketError> {
        if self.can_read(size) {
            Ok(())
        } else {
            Err(PacketError::BufferUnderrun {
                requested: size,
                available: self.remaining(),
            })
        }
    }

    fn tail_mut(&mut self) -> &mut [u8] {
        &mut self.buffer[self.write_offset..]
    }

    fn unread_slice(&self) -> &[u8] {
        &self.buffer[self.read_offset..self.write_offset]
    }

    /// Replace the contents with one complete received frame.
    ///
    /// The opcode is taken from the frame; the read cursor lands on the body.
    pub fn load_frame(&mut self, frame: &[u8]) -> Result<(), PacketError> {
        if frame.len() > self.buffer.len() {
            return Err(PacketError::BufferOverrun {
                requested: frame.len(),
                available: self.buffer.len(),
            });
        }
        if frame.len() < HEADER_SIZE {
            return Err(PacketError::BufferUnderrun {
                requested: HEADER_SIZE,
                available: frame.len(),
            });
        }
        self.buffer[..frame.len()].copy_from_slice(frame);
        self.header = (&frame[..OPCODE_SIZE]).get_i16();
        self.write_offset = frame.len();
        self.read_offset = HEADER_SIZE;
        Ok(())
    }

    /// Discards everything written past `offset`, never cutting into the header.
    pub fn truncate(&mut self, offset: usize) {
        self.write_offset = offset.clamp(HEADER_SIZE, self.write_offset);
        self.read_offset = self.read_offset.min(self.write_offset);
    }

    /// Moves the read cursor back to `offset`.
    pub fn rewind(&mut self, offset: usize) {
        self.read_offset = offset.clamp(HEADER_SIZE, self.write_offset);
    }

    /// Append raw bytes to the body.
    pub fn copy_buffer(&mut self, bytes: &[u8]) -> Result<(), PacketError> {
        self.ensure_write(bytes.len())?;
        self.tail_mut()[..bytes.len()].copy_from_slice(bytes);
        self.write_offset += bytes.len();
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Writers
    // ---------------------------------------------------------------------

    pub fn write_bool(&mut self, value: bool) -> Result<(), PacketError> {
        self.ensure_write(1)?;
        self.tail_mut().put_u8(u8::from(value));
        self.write_offset += 1;
        Ok(())
    }

    pub fn write_i16(&mut self, value: i16) -> Result<(), PacketError> {
        self.ensure_write(2)?;
        self.tail_mut().put_i16(value);
        self.write_offset += 2;
        Ok(())
    }

    pub fn write_i32(&mut self, value: i32) -> Result<(), PacketError> {
        self.ensure_write(4)?;
        self.tail_mut().put_i32(value);
        self.write_offset += 4;
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), PacketError> {
        self.ensure_write(4)?;
        self.tail_mut().put_u32(value);
        self.write_offset += 4;
        Ok(())
    }

    /// Floats are not byte-swapped: they travel little-endian.
    pub fn write_f32(&mut self, value: f32) -> Result<(), PacketError> {
        self.ensure_write(4)?;
        self.tail_mut().put_f32_le(value);
        self.write_offset += 4;
        Ok(())
    }

    pub fn write_string(&mut self, value: &str) -> Result<(), PacketError> {
        let len = i32::try_from(value.len()).map_err(|_| PacketError::BufferOverrun {
            requested: value.len(),
            available: self.buffer.len() - self.write_offset,
        })?;
        self.ensure_write(4 + value.len())?;
        self.write_i32(len)?;
        self.copy_buffer(value.as_bytes())
    }

    pub fn write_vector2(&mut self, value: Vector2) -> Result<(), PacketError> {
        self.ensure_write(8)?;
        self.write_f32(value.x)?;
        self.write_f32(value.y)
    }

    pub fn write_vector3(&mut self, value: Vector3) -> Result<(), PacketError> {
        self.ensure_write(12)?;
        self.write_f32(value.x)?;
        self.write_f32(value.y)?;
        self.write_f32(value.z)
    }

    // ---------------------------------------------------------------------
    // Readers
    // ---------------------------------------------------------------------

    pub fn read_bool(&mut self) -> Result<bool, PacketError> {
        self.ensure_read(1)?;
        let value = self.unread_slice().get_u8() != 0;
        self.read_offset += 1;
        Ok(value)
    }

    pub fn read_i16(&mut self) -> Result<i16, PacketError> {
        self.ensure_read(2)?;
        let value = self.unread_slice().get_i16();
        self.read_offset += 2;
        Ok(value)
    }

    pub fn read_i32(&mut self) -> Result<i32, PacketError> {
        self.ensure_read(4)?;
        let value = self.unread_slice().get_i32();
        self.read_offset += 4;
        Ok(value)
    }

    pub fn read_u32(&mut self) -> Result<u32, PacketError> {
        self.ensure_read(4)?;
        let value = self.unread_slice().get_u32();
        self.read_offset += 4;
        Ok(value)
    }

    pub fn read_f32(&mut self) -> Result<f32, PacketError> {
        self.ensure_read(4)?;
        let value = self.unread_slice().get_f32_le();
        self.read_offset += 4;
        Ok(value)
    }

    /// Reads `len` raw bytes, advancing the cursor.
    pub fn read_bytes(&mut self, len: usize) -> Result<&[u8], PacketError> {
        self.ensure_read(len)?;
        let start = self.read_offset;
        self.read_offset += len;
        Ok(&self.buffer[start..start + len])
    }

    /// Reads an i32 length prefix, rejecting negatives.
    pub fn read_len(&mut self) -> Result<usize, PacketError> {
        let len = self.read_i32()?;
        usize::try_from(len).map_err(|_| PacketError::NegativeLength(len))
    }

    /// On failure the read cursor is restored to where the length prefix began.
    pub fn read_string(&mut self) -> Result<String, PacketError> {
        let start = self.read_offset;
        let result = self.read_string_at_cursor();
        if result.is_err() {
            self.read_offset = start;
        }
        result
    }

    fn read_string_at_cursor(&mut self) -> Result<String, PacketError> {
        let len = self.read_len()?;
        let bytes = self.read_bytes(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| PacketError::InvalidUtf8)
    }

    pub fn read_vector2(&mut self) -> Result<Vector2, PacketError> {
        self.ensure_read(8)?;
        Ok(Vector2 {
            x: self.read_f32()?,
            y: self.read_f32()?,
        })
    }

    pub fn read_vector3(&mut self) -> Result<Vector3, PacketError> {
        self.ensure_read(12)?;
        Ok(Vector3 {
            x: self.read_f32()?,
            y: self.read_f32()?,
            z: self.read_f32()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reread(packet: &Packet) -> Packet {
        let mut copy = Packet::with_capacity(packet.capacity());
        copy.load_frame(packet.as_bytes()).unwrap();
        copy
    }

    #[test]
    fn test_new_packet_cursors_sit_after_header() {
        let packet = Packet::with_capacity(64);
        assert_eq!(packet.write_offset(), HEADER_SIZE);
        assert_eq!(packet.read_offset(), HEADER_SIZE);
        assert!(packet.is_empty());
        assert_eq!(Packet::with_capacity(2).capacity(), HEADER_SIZE);
    }

    #[test]
    fn test_header_encodes_opcode_and_total_length() {
        let mut packet = Packet::with_capacity(64);
        packet.write_u32(7).unwrap();
        packet.set_header(PacketHeader::Pong);

        assert_eq!(
            packet.as_bytes(),
            &[0x00, 0x01, 0x00, 0x00, 0x00, 0x0A, 0x00, 0x00, 0x00, 0x07]
        );
    }

    #[test]
    fn test_scalars_round_trip_through_a_frame() {
        let mut packet = Packet::with_capacity(128);
        packet.write_bool(true).unwrap();
        packet.write_bool(false).unwrap();
        packet.write_i16(-1234).unwrap();
        packet.write_i32(i32::MIN).unwrap();
        packet.write_u32(u32::MAX).unwrap();
        packet.write_f32(-0.5).unwrap();
        packet.set_header(PacketHeader::Rpc);

        let mut read = reread(&packet);
        assert_eq!(read.header().unwrap(), PacketHeader::Rpc);
        assert!(read.read_bool().unwrap());
        assert!(!read.read_bool().unwrap());
        assert_eq!(read.read_i16().unwrap(), -1234);
        assert_eq!(read.read_i32().unwrap(), i32::MIN);
        assert_eq!(read.read_u32().unwrap(), u32::MAX);
        assert_eq!(read.read_f32().unwrap(), -0.5);
        assert_eq!(read.remaining(), 0);
    }

    #[test]
    fn test_integers_are_big_endian_floats_are_not() {
        let mut packet = Packet::with_capacity(64);
        packet.write_i32(1).unwrap();
        packet.write_f32(1.0).unwrap();
        assert_eq!(packet.body(), &[0, 0, 0, 1, 0x00, 0x00, 0x80, 0x3F]);
    }

    #[test]
    fn test_strings_round_trip_including_empty_and_multibyte() {
        let mut packet = Packet::with_capacity(128);
        packet.write_string("").unwrap();
        packet.write_string("Ωmega ✓ ünïcode").unwrap();
        packet.write_string("ship-01").unwrap();
        packet.set_header(PacketHeader::Chat);

        let mut read = reread(&packet);
        assert_eq!(read.read_string().unwrap(), "");
        assert_eq!(read.read_string().unwrap(), "Ωmega ✓ ünïcode");
        assert_eq!(read.read_string().unwrap(), "ship-01");
    }

    #[test]
    fn test_vectors_round_trip() {
        let mut packet = Packet::with_capacity(64);
        packet.write_vector2(Vector2 { x: 1.5, y: -2.0 }).unwrap();
        packet.write_vector3(Vector3::new(0.0, 9.25, -3.0)).unwrap();

        assert_eq!(packet.read_vector2().unwrap(), Vector2 { x: 1.5, y: -2.0 });
        assert_eq!(packet.read_vector3().unwrap(), Vector3::new(0.0, 9.25, -3.0));
    }

    #[test]
    fn test_write_past_capacity_is_an_overrun() {
        let mut packet = Packet::with_capacity(HEADER_SIZE + 3);
        assert!(packet.can_write(3));
        assert!(!packet.can_write(4));
        assert_eq!(
            packet.write_i32(1),
            Err(PacketError::BufferOverrun {
                requested: 4,
                available: 3
            })
        );
        // A failed write leaves the cursor untouched.
        assert_eq!(packet.write_offset(), HEADER_SIZE);
        assert!(packet.write_string("abcd").is_err());
        assert_eq!(packet.write_offset(), HEADER_SIZE);
    }

    #[test]
    fn test_read_past_write_cursor_is_an_underrun() {
        let mut packet = Packet::with_capacity(64);
        packet.write_i16(5).unwrap();
        assert_eq!(
            packet.read_i32(),
            Err(PacketError::BufferUnderrun {
                requested: 4,
                available: 2
            })
        );
        assert_eq!(packet.read_i16().unwrap(), 5);
    }

    #[test]
    fn test_string_decode_errors_leave_cursor_in_place() {
        let mut packet = Packet::with_capacity(64);
        packet.write_i32(-3).unwrap();
        assert_eq!(packet.read_string(), Err(PacketError::NegativeLength(-3)));
        assert_eq!(packet.read_offset(), HEADER_SIZE);

        let mut packet = Packet::with_capacity(64);
        packet.write_i32(2).unwrap();
        packet.copy_buffer(&[0xC3, 0x28]).unwrap();
        assert_eq!(packet.read_string(), Err(PacketError::InvalidUtf8));
        assert_eq!(packet.read_offset(), HEADER_SIZE);

        let mut packet = Packet::with_capacity(64);
        packet.write_i32(10).unwrap();
        assert!(matches!(
            packet.read_string(),
            Err(PacketError::BufferUnderrun { .. })
        ));
        assert_eq!(packet.read_offset(), HEADER_SIZE);
    }

    #[test]
    fn test_reset_rewinds_both_cursors() {
        let mut packet = Packet::with_capacity(64);
        packet.write_u32(1).unwrap();
        packet.read_u32().unwrap();
        packet.set_header(PacketHeader::Pong);
        packet.reset();
        assert!(packet.is_empty());
        assert_eq!(packet.read_offset(), HEADER_SIZE);
        assert_eq!(packet.raw_header(), 0);
    }

    #[test]
    fn test_load_frame_rejects_oversized_and_truncated_frames() {
        let mut packet = Packet::with_capacity(HEADER_SIZE + 2);
        assert!(packet.load_frame(&[0u8; HEADER_SIZE + 3]).is_err());
        assert!(packet.load_frame(&[0u8; 3]).is_err());
    }
}
