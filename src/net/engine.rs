use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::registry::SessionRegistry;
use crate::config::BufferConfig;
use crate::metrics::ServerMetrics;
use crate::pool::{BufferPool, Pool};
use crate::protocol::{FramingError, Packet};
use crate::session::{Reassembler, Session, Transport};

/// Lifecycle callbacks an engine drives for every session.
///
/// Implementations must not block; anything slow belongs on a spawned task.
#[async_trait]
pub trait SessionHandler: Send + Sync + 'static {
    async fn on_accepted(&self, _session: &Arc<Session>) {}

    /// The packet's read cursor sits at the start of the body. The engine
    /// returns the packet to its pool once this returns.
    async fn on_packet(&self, session: &Arc<Session>, packet: &mut Packet);

    async fn on_disconnected(&self, _session: &Arc<Session>) {}
}

/// Pools, counters and the session table shared by every engine in the
/// process. Sharing the registry keeps session ids unique across transports
/// and makes `max_connections` a process-wide cap.
#[derive(Debug, Clone)]
pub struct EngineResources {
    pub packets: Arc<Pool<Packet>>,
    pub buffers: Arc<BufferPool>,
    pub registry: Arc<SessionRegistry>,
    pub metrics: Arc<ServerMetrics>,
    pub packet_size: usize,
}

impl EngineResources {
    #[must_use]
    pub fn new(
        config: &BufferConfig,
        max_connections: usize,
        metrics: Arc<ServerMetrics>,
    ) -> Self {
        let packet_size = config.packet_size;
        let packets = Pool::builder(move || Packet::with_capacity(packet_size))
            .name("packet")
            .capacity(config.packet_pool_capacity)
            .expand(config.expand_packet_pool)
            .on_despawn(Packet::reset)
            .build();
        Self {
            packets: Arc::new(packets),
            buffers: Arc::new(BufferPool::new(
                config.buffer_pool_capacity,
                config.buffer_size,
            )),
            registry: Arc::new(SessionRegistry::new(max_connections)),
            metrics,
            packet_size,
        }
    }
}

/// State common to the TCP and UDP engines.
pub(crate) struct EngineCore {
    pub(crate) label: &'static str,
    pub(crate) resources: EngineResources,
    pub(crate) handler: Arc<dyn SessionHandler>,
    pub(crate) registry: Arc<SessionRegistry>,
    pub(crate) shutdown: CancellationToken,
}

impl EngineCore {
    pub(crate) fn new(
        label: &'static str,
        resources: EngineResources,
        handler: Arc<dyn SessionHandler>,
    ) -> Self {
        Self {
            label,
            registry: Arc::clone(&resources.registry),
            resources,
            handler,
            shutdown: CancellationToken::new(),
        }
    }

    /// Register a session and give it a pooled receive accumulator.
    pub(crate) fn open_session(&self, transport: Transport) -> Option<Arc<Session>> {
        let session = match self.registry.register(transport, &self.resources.packets) {
            Ok(session) => session,
            Err(e) => {
                self.resources.metrics.increment_rejected_connections();
                warn!(engine = self.label, %transport, error = %e, "rejecting connection");
                return None;
            }
        };

        let buffer = match self.resources.buffers.acquire() {
            Ok(buffer) => buffer,
            Err(e) => {
                self.resources.metrics.increment_pool_exhaustions();
                self.resources.metrics.increment_rejected_connections();
                warn!(engine = self.label, %transport, error = %e, "no receive buffer for connection");
                self.registry.remove(session.id());
                session.mark_disconnected();
                return None;
            }
        };
        session.install_reassembler(Reassembler::new(buffer, self.resources.packet_size));
        self.resources.metrics.increment_connections();
        info!(
            engine = self.label,
            session_id = session.id(),
            %transport,
            "client connected"
        );
        Some(session)
    }

    /// Hand every queued inbound packet to the handler, then back to the pool.
    pub(crate) async fn dispatch(&self, session: &Arc<Session>) {
        while let Some(mut packet) = session.pop_inbound() {
            self.resources.metrics.increment_packets_received();
            self.handler.on_packet(session, &mut packet).await;
            self.resources.packets.release(packet);
        }
    }

    /// Feed a received chunk through the session's reassembler and dispatch
    /// whatever frames it completes.
    pub(crate) async fn ingest(
        &self,
        session: &Arc<Session>,
        bytes: &[u8],
    ) -> Result<usize, FramingError> {
        self.resources.metrics.record_received(bytes.len());
        let produced = session
            .with_reassembler(|reassembler| {
                reassembler.receive(bytes, &self.resources.packets, |packet| {
                    session.push_inbound(packet);
                })
            })
            .unwrap_or(Ok(0))?;
        self.dispatch(session).await;
        Ok(produced)
    }

    /// Remove, notify, and release. Safe to call more than once.
    pub(crate) async fn teardown(&self, session: &Arc<Session>, reassembler: Option<Reassembler>) {
        let first = session.mark_disconnected();
        let reassembler = reassembler.or_else(|| session.take_reassembler());
        if let Some(reassembler) = reassembler {
            if let Err(e) = self.resources.buffers.release(reassembler.into_buffer()) {
                warn!(engine = self.label, session_id = session.id(), error = %e, "receive buffer not returned");
            }
        }
        if !first {
            return;
        }

        self.registry.remove(session.id());
        self.handler.on_disconnected(session).await;
        let dropped = session.drain_queues();
        self.resources.metrics.decrement_active_connections();
        info!(
            engine = self.label,
            session_id = session.id(),
            transport = %session.transport(),
            dropped,
            "client disconnected"
        );
    }

    pub(crate) fn record_framing_error(&self, session: &Session, error: &FramingError) {
        if matches!(error, FramingError::Pool(_)) {
            self.resources.metrics.increment_pool_exhaustions();
        } else {
            self.resources.metrics.increment_framing_errors();
        }
        warn!(
            engine = self.label,
            session_id = session.id(),
            error = %error,
            "closing session after framing error"
        );
    }

    pub(crate) fn record_sent(&self, session: &Session, bytes: usize) {
        self.resources.metrics.record_sent(bytes);
        debug!(engine = self.label, session_id = session.id(), bytes, "frame sent");
    }
}
