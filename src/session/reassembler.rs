//! Cuts complete frames out of a byte stream.
//!
//! Bytes accumulate in a pooled buffer. Whenever at least a header is
//! buffered, the length prefix is peeked; once the whole frame is present it is
//! copied into a pooled [`Packet`], the remainder is shifted to the front, and
//! the loop continues. Partial frames stay buffered until more bytes arrive.

use bytes::Buf;

use crate::pool::{Pool, PooledBuffer};
use crate::protocol::{FramingError, Packet, HEADER_SIZE, OPCODE_SIZE};

#[derive(Debug)]
pub struct Reassembler {
    buffer: PooledBuffer,
    offset: usize,
    max_frame: usize,
}

impl Reassembler {
    /// `max_frame` is the largest frame accepted, normally the packet capacity.
    #[must_use]
    pub fn new(buffer: PooledBuffer, max_frame: usize) -> Self {
        let max_frame = max_frame.min(buffer.len());
        Self {
            buffer,
            offset: 0,
            max_frame,
        }
    }

    /// Bytes waiting for the rest of their frame.
    #[must_use]
    pub const fn buffered(&self) -> usize {
        self.offset
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Free tail of the accumulator, for reading straight from a socket.
    /// Follow with [`commit`](Self::commit).
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.buffer[self.offset..]
    }

    /// Account for `n` bytes written into [`spare_mut`](Self::spare_mut) and
    /// extract every complete frame. Returns how many packets were produced.
    pub fn commit(
        &mut self,
        n: usize,
        packets: &Pool<Packet>,
        sink: impl FnMut(Packet),
    ) -> Result<usize, FramingError> {
        let spare = self.buffer.len() - self.offset;
        if n > spare {
            return Err(FramingError::Overflow {
                incoming: n,
                buffered: self.offset,
                capacity: self.buffer.len(),
            });
        }
        self.offset += n;
        self.drain_frames(packets, sink)
    }

    /// Copy `bytes` into the accumulator and extract every complete frame.
    pub fn receive(
        &mut self,
        bytes: &[u8],
        packets: &Pool<Packet>,
        sink: impl FnMut(Packet),
    ) -> Result<usize, FramingError> {
        let spare = self.buffer.len() - self.offset;
        if bytes.len() > spare {
            return Err(FramingError::Overflow {
                incoming: bytes.len(),
                buffered: self.offset,
                capacity: self.buffer.len(),
            });
        }
        self.buffer[self.offset..self.offset + bytes.len()].copy_from_slice(bytes);
        self.offset += bytes.len();
        self.drain_frames(packets, sink)
    }

    fn drain_frames(
        &mut self,
        packets: &Pool<Packet>,
        mut sink: impl FnMut(Packet),
    ) -> Result<usize, FramingError> {
        let mut produced = 0;
        while self.offset >= HEADER_SIZE {
            let length = (&self.buffer[OPCODE_SIZE..HEADER_SIZE]).get_i32();
            let frame_len = match usize::try_from(length) {
                Ok(len) if len < HEADER_SIZE => return Err(FramingError::TooShort { length }),
                Ok(len) if len > self.max_frame => {
                    return Err(FramingError::TooLong {
                        length,
                        capacity: self.max_frame,
                    })
                }
                Ok(len) => len,
                Err(_) => return Err(FramingError::TooShort { length }),
            };
            if self.offset < frame_len {
                break;
            }

            let mut packet = packets.acquire()?;
            if let Err(e) = packet.load_frame(&self.buffer[..frame_len]) {
                packets.release(packet);
                return Err(e.into());
            }
            self.buffer.copy_within(frame_len..self.offset, 0);
            self.offset -= frame_len;
            sink(packet);
            produced += 1;
        }
        Ok(produced)
    }

    /// Drop any partial frame.
    pub fn clear(&mut self) {
        self.offset = 0;
    }

    /// Give the accumulator back so it can be returned to its pool.
    #[must_use]
    pub fn into_buffer(self) -> PooledBuffer {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::BufferPool;
    use crate::protocol::PacketHeader;
    use proptest::prelude::*;

    const PACKET_SIZE: usize = 64;

    fn packet_pool() -> Pool<Packet> {
        Pool::builder(|| Packet::with_capacity(PACKET_SIZE))
            .capacity(8)
            .on_despawn(Packet::reset)
            .build()
    }

    fn frame(header: PacketHeader, body: &[u8]) -> Vec<u8> {
        let mut packet = Packet::with_capacity(PACKET_SIZE);
        packet.copy_buffer(body).unwrap();
        packet.set_header(header);
        packet.as_bytes().to_vec()
    }

    fn collect(reassembler: &mut Reassembler, pool: &Pool<Packet>, bytes: &[u8]) -> Vec<(i16, Vec<u8>)> {
        let mut out = Vec::new();
        reassembler
            .receive(bytes, pool, |p| out.push((p.raw_header(), p.body().to_vec())))
            .unwrap();
        out
    }

    #[test]
    fn test_two_frames_in_one_receive() {
        let buffers = BufferPool::new(1, PACKET_SIZE * 4);
        let pool = packet_pool();
        let mut reassembler = Reassembler::new(buffers.acquire().unwrap(), PACKET_SIZE);

        let mut stream = frame(PacketHeader::Ping, &[]);
        stream.extend(frame(PacketHeader::Chat, b"hi"));

        let got = collect(&mut reassembler, &pool, &stream);
        assert_eq!(
            got,
            vec![(0, vec![]), (PacketHeader::Chat as i16, b"hi".to_vec())]
        );
        assert_eq!(reassembler.buffered(), 0);
    }

    #[test]
    fn test_partial_header_and_partial_body_wait_for_more() {
        let buffers = BufferPool::new(1, PACKET_SIZE * 4);
        let pool = packet_pool();
        let mut reassembler = Reassembler::new(buffers.acquire().unwrap(), PACKET_SIZE);
        let bytes = frame(PacketHeader::Rpc, &[1, 2, 3, 4]);

        assert!(collect(&mut reassembler, &pool, &bytes[..3]).is_empty());
        assert!(collect(&mut reassembler, &pool, &bytes[3..8]).is_empty());
        assert_eq!(reassembler.buffered(), 8);
        let got = collect(&mut reassembler, &pool, &bytes[8..]);
        assert_eq!(got, vec![(PacketHeader::Rpc as i16, vec![1, 2, 3, 4])]);
    }

    #[test]
    fn test_produced_packet_is_positioned_at_body() {
        let buffers = BufferPool::new(1, PACKET_SIZE * 4);
        let pool = packet_pool();
        let mut reassembler = Reassembler::new(buffers.acquire().unwrap(), PACKET_SIZE);
        let mut source = Packet::with_capacity(PACKET_SIZE);
        source.write_u32(99).unwrap();
        source.set_header(PacketHeader::Pong);

        let mut packets = Vec::new();
        reassembler
            .receive(source.as_bytes(), &pool, |p| packets.push(p))
            .unwrap();
        let mut packet = packets.pop().unwrap();
        assert_eq!(packet.header().unwrap(), PacketHeader::Pong);
        assert_eq!(packet.read_u32().unwrap(), 99);
    }

    #[test]
    fn test_length_below_header_is_a_framing_error() {
        let buffers = BufferPool::new(2, PACKET_SIZE * 4);
        let pool = packet_pool();
        let mut reassembler = Reassembler::new(buffers.acquire().unwrap(), PACKET_SIZE);
        let result = reassembler.receive(&[0, 0, 0, 0, 0, 5], &pool, |_| {});
        assert!(matches!(result, Err(FramingError::TooShort { length: 5 })));

        let mut reassembler = Reassembler::new(buffers.acquire().unwrap(), PACKET_SIZE);
        let result = reassembler.receive(&[0, 0, 0xFF, 0xFF, 0xFF, 0xFF], &pool, |_| {});
        assert!(matches!(result, Err(FramingError::TooShort { length: -1 })));
    }

    #[test]
    fn test_length_above_packet_capacity_is_a_framing_error() {
        let buffers = BufferPool::new(1, PACKET_SIZE * 4);
        let pool = packet_pool();
        let mut reassembler = Reassembler::new(buffers.acquire().unwrap(), PACKET_SIZE);
        let result = reassembler.receive(&[0, 1, 0, 0, 0, 65], &pool, |_| {});
        assert!(matches!(
            result,
            Err(FramingError::TooLong {
                length: 65,
                capacity: PACKET_SIZE
            })
        ));
    }

    #[test]
    fn test_overflowing_receive_is_rejected() {
        let buffers = BufferPool::new(1, 8);
        let pool = packet_pool();
        let mut reassembler = Reassembler::new(buffers.acquire().unwrap(), 8);
        let result = reassembler.receive(&[0u8; 9], &pool, |_| {});
        assert!(matches!(result, Err(FramingError::Overflow { incoming: 9, .. })));
    }

    #[test]
    fn test_commit_after_reading_into_spare() {
        let buffers = BufferPool::new(1, PACKET_SIZE * 2);
        let pool = packet_pool();
        let mut reassembler = Reassembler::new(buffers.acquire().unwrap(), PACKET_SIZE);
        let bytes = frame(PacketHeader::Chat, b"abc");

        reassembler.spare_mut()[..bytes.len()].copy_from_slice(&bytes);
        let mut count = 0;
        let produced = reassembler.commit(bytes.len(), &pool, |_| count += 1).unwrap();
        assert_eq!(produced, 1);
        assert_eq!(count, 1);
    }

    proptest! {
        #[test]
        fn prop_chunking_never_changes_the_frames(
            bodies in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..40), 1..12),
            cuts in proptest::collection::vec(1usize..23, 1..64),
        ) {
            let buffers = BufferPool::new(2, PACKET_SIZE * 4);
            let pool = packet_pool();

            let mut stream = Vec::new();
            for body in &bodies {
                stream.extend(frame(PacketHeader::Rpc, body));
            }

            let mut whole = Reassembler::new(buffers.acquire().unwrap(), PACKET_SIZE);
            let expected = collect(&mut whole, &pool, &stream);
            prop_assert_eq!(expected.len(), bodies.len());

            let mut chunked = Reassembler::new(buffers.acquire().unwrap(), PACKET_SIZE);
            let mut got = Vec::new();
            let mut rest = &stream[..];
            let mut cut_iter = cuts.iter().cycle();
            while !rest.is_empty() {
                let n = (*cut_iter.next().unwrap()).min(rest.len());
                got.extend(collect(&mut chunked, &pool, &rest[..n]));
                rest = &rest[n..];
            }
            prop_assert_eq!(got, expected);
            prop_assert_eq!(chunked.buffered(), 0);
        }
    }
}
