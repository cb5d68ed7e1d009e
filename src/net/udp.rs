use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::engine::{EngineCore, EngineResources, SessionHandler};
use super::registry::SessionRegistry;
use super::TransportError;
use crate::session::{Session, Transport};

/// Datagram engine: one socket, sessions demultiplexed by remote endpoint.
///
/// A session is created on the first datagram from an unseen endpoint. An
/// empty datagram or a framing error ends that endpoint's session only.
pub struct UdpEngine {
    core: Arc<EngineCore>,
    endpoints: Arc<DashMap<SocketAddr, Arc<Session>>>,
    local_addr: SocketAddr,
    receive_task: JoinHandle<()>,
}

impl UdpEngine {
    pub async fn bind(
        addr: SocketAddr,
        resources: EngineResources,
        handler: Arc<dyn SessionHandler>,
    ) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| TransportError::Bind { addr, source })?;
        let local_addr = socket.local_addr()?;
        let core = Arc::new(EngineCore::new("udp", resources, handler));
        let endpoints = Arc::new(DashMap::new());

        info!(%local_addr, "UDP engine listening");
        let receive_task = tokio::spawn(receive_loop(
            Arc::clone(&core),
            Arc::new(socket),
            Arc::clone(&endpoints),
        ));
        Ok(Self {
            core,
            endpoints,
            local_addr,
            receive_task,
        })
    }

    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.core.registry
    }

    #[must_use]
    pub fn session_for(&self, peer: &SocketAddr) -> Option<Arc<Session>> {
        self.endpoints.get(peer).map(|entry| Arc::clone(entry.value()))
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.core.shutdown.is_cancelled()
    }

    pub fn stop(&self) {
        if !self.core.shutdown.is_cancelled() {
            info!(local_addr = %self.local_addr, "UDP engine stopping");
            self.core.shutdown.cancel();
        }
    }

    /// Wait for the receive loop to exit and every endpoint to be torn down.
    pub async fn join(self) {
        if let Err(e) = self.receive_task.await {
            error!(error = %e, "UDP receive task panicked");
        }
    }
}

async fn receive_loop(
    core: Arc<EngineCore>,
    socket: Arc<UdpSocket>,
    endpoints: Arc<DashMap<SocketAddr, Arc<Session>>>,
) {
    // One datagram at a time; sized like a session accumulator.
    let mut datagram = vec![0u8; core.resources.buffers.buffer_size()];

    loop {
        let received = tokio::select! {
            () = core.shutdown.cancelled() => break,
            received = socket.recv_from(&mut datagram) => received,
        };
        let (n, peer) = match received {
            Ok(received) => received,
            Err(e) => {
                // ICMP port-unreachable and friends surface here; the socket
                // itself stays usable.
                core.resources.metrics.increment_transport_errors();
                debug!(error = %e, "recv_from failed");
                continue;
            }
        };

        let existing = endpoints.get(&peer).map(|entry| Arc::clone(entry.value()));
        let session = match existing {
            Some(session) => session,
            None if n == 0 => continue,
            None => {
                let Some(session) = core.open_session(Transport::Udp(peer)) else {
                    continue;
                };
                endpoints.insert(peer, Arc::clone(&session));
                tokio::spawn(write_loop(
                    Arc::clone(&core),
                    Arc::clone(&socket),
                    Arc::clone(&session),
                    peer,
                ));
                core.handler.on_accepted(&session).await;
                session
            }
        };

        if n == 0 {
            debug!(session_id = session.id(), %peer, "empty datagram, closing session");
            endpoints.remove(&peer);
            core.teardown(&session, None).await;
            continue;
        }

        if let Err(e) = core.ingest(&session, &datagram[..n]).await {
            core.record_framing_error(&session, &e);
            endpoints.remove(&peer);
            core.teardown(&session, None).await;
        }
    }

    let sessions: Vec<Arc<Session>> = endpoints
        .iter()
        .map(|entry| Arc::clone(entry.value()))
        .collect();
    endpoints.clear();
    for session in sessions {
        core.teardown(&session, None).await;
    }
    debug!("UDP receive loop exited");
}

async fn write_loop(
    core: Arc<EngineCore>,
    socket: Arc<UdpSocket>,
    session: Arc<Session>,
    peer: SocketAddr,
) {
    loop {
        while let Some(packet) = session.pop_outbound() {
            let result = socket.send_to(packet.as_bytes(), peer).await;
            let len = packet.len();
            core.resources.packets.release(packet);
            match result {
                Ok(_) => core.record_sent(&session, len),
                Err(e) => {
                    core.resources.metrics.increment_transport_errors();
                    warn!(session_id = session.id(), %peer, error = %e, "send_to failed");
                }
            }
        }
        if !session.is_connected() {
            break;
        }
        tokio::select! {
            () = core.shutdown.cancelled() => break,
            () = session.outbound_ready() => {}
        }
    }
}
