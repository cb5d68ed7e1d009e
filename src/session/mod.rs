//! Server-side state for one client connection.

pub mod reassembler;

pub use reassembler::Reassembler;

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crossbeam::queue::SegQueue;
use thiserror::Error;
use tokio::sync::Notify;

use crate::pool::{Pool, PoolError};
use crate::protocol::{Packet, PacketError, PacketHeader};

pub type SessionId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp(SocketAddr),
    Udp(SocketAddr),
    /// Not bound to a socket; used by in-process harnesses.
    Memory,
}

impl Transport {
    #[must_use]
    pub const fn peer_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Tcp(addr) | Self::Udp(addr) => Some(*addr),
            Self::Memory => None,
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "tcp://{addr}"),
            Self::Udp(addr) => write!(f, "udp://{addr}"),
            Self::Memory => f.write_str("memory"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("session {0} is disconnected")]
    Disconnected(SessionId),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Packet(#[from] PacketError),
}

/// One connected client.
///
/// Shared as `Arc<Session>` between the engine's reader and writer tasks and
/// the room layer. Queues are lock-free; the reassembler slot is only touched
/// by whichever task is feeding received bytes.
pub struct Session {
    id: SessionId,
    transport: Transport,
    connected: AtomicBool,
    user_name: RwLock<Option<String>>,
    reassembler: Mutex<Option<Reassembler>>,
    inbound: SegQueue<Packet>,
    outbound: SegQueue<Packet>,
    outbound_ready: Notify,
    packets: Arc<Pool<Packet>>,
}

impl Session {
    #[must_use]
    pub fn new(id: SessionId, transport: Transport, packets: Arc<Pool<Packet>>) -> Self {
        Self {
            id,
            transport,
            connected: AtomicBool::new(true),
            user_name: RwLock::new(None),
            reassembler: Mutex::new(None),
            inbound: SegQueue::new(),
            outbound: SegQueue::new(),
            outbound_ready: Notify::new(),
            packets,
        }
    }

    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub const fn transport(&self) -> Transport {
        self.transport
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Flip to disconnected. Returns `true` only for the caller that did it,
    /// so teardown runs once.
    pub fn mark_disconnected(&self) -> bool {
        let was_connected = self.connected.swap(false, Ordering::AcqRel);
        if was_connected {
            // Wake the writer so it can observe the flag and exit.
            self.outbound_ready.notify_one();
        }
        was_connected
    }

    #[must_use]
    pub fn user_name(&self) -> Option<String> {
        self.user_name
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_user_name(&self, name: impl Into<String>) {
        *self
            .user_name
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(name.into());
    }

    /// Name shown to other room members.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.user_name()
            .unwrap_or_else(|| format!("Player{}", self.id))
    }

    #[must_use]
    pub fn packet_pool(&self) -> &Arc<Pool<Packet>> {
        &self.packets
    }

    // ---------------------------------------------------------------------
    // Receive side
    // ---------------------------------------------------------------------

    pub fn install_reassembler(&self, reassembler: Reassembler) -> Option<Reassembler> {
        self.reassembler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(reassembler)
    }

    pub fn take_reassembler(&self) -> Option<Reassembler> {
        self.reassembler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Run `f` against the installed reassembler, if any.
    pub fn with_reassembler<R>(&self, f: impl FnOnce(&mut Reassembler) -> R) -> Option<R> {
        self.reassembler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
            .map(f)
    }

    pub fn push_inbound(&self, packet: Packet) {
        self.inbound.push(packet);
    }

    pub fn pop_inbound(&self) -> Option<Packet> {
        self.inbound.pop()
    }

    // ---------------------------------------------------------------------
    // Send side
    // ---------------------------------------------------------------------

    /// Build a packet from the pool and queue it for sending.
    ///
    /// `build` writes the body; the header is stamped afterwards. On any
    /// failure the packet goes straight back to the pool.
    pub fn send<F>(&self, header: PacketHeader, build: F) -> Result<(), SendError>
    where
        F: FnOnce(&mut Packet) -> Result<(), PacketError>,
    {
        let packet = self.prepare(header, build)?;
        self.enqueue(packet);
        Ok(())
    }

    /// Build a framed packet without queueing it, so a caller can find out
    /// whether a reply fits before committing to anything.
    pub fn prepare<F>(&self, header: PacketHeader, build: F) -> Result<Packet, SendError>
    where
        F: FnOnce(&mut Packet) -> Result<(), PacketError>,
    {
        if !self.is_connected() {
            return Err(SendError::Disconnected(self.id));
        }
        let mut packet = self.packets.acquire()?;
        packet.reset();
        if let Err(e) = build(&mut packet) {
            self.packets.release(packet);
            return Err(e.into());
        }
        packet.set_header(header);
        Ok(packet)
    }

    /// Queue an already framed packet. Dropped back to the pool when the
    /// session is gone.
    pub fn enqueue(&self, packet: Packet) {
        if !self.is_connected() {
            self.packets.release(packet);
            return;
        }
        self.outbound.push(packet);
        self.outbound_ready.notify_one();
    }

    pub fn pop_outbound(&self) -> Option<Packet> {
        self.outbound.pop()
    }

    #[must_use]
    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    /// Resolves once something was queued since the last wake-up, or the
    /// session was disconnected.
    pub async fn outbound_ready(&self) {
        self.outbound_ready.notified().await;
    }

    /// Return every queued packet to the pool.
    pub fn drain_queues(&self) -> usize {
        let mut drained = 0;
        while let Some(packet) = self.inbound.pop() {
            self.packets.release(packet);
            drained += 1;
        }
        while let Some(packet) = self.outbound.pop() {
            self.packets.release(packet);
            drained += 1;
        }
        drained
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("transport", &self.transport)
            .field("connected", &self.is_connected())
            .field("outbound", &self.outbound.len())
            .finish()
    }
}
