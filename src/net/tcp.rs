use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::engine::{EngineCore, EngineResources, SessionHandler};
use super::registry::SessionRegistry;
use super::TransportError;
use crate::session::{Reassembler, Session, Transport};

/// Stream engine: one reader and one writer task per connection.
pub struct TcpEngine {
    core: Arc<EngineCore>,
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

impl TcpEngine {
    /// Bind and start accepting immediately.
    pub async fn bind(
        addr: SocketAddr,
        resources: EngineResources,
        handler: Arc<dyn SessionHandler>,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;
        let core = Arc::new(EngineCore::new("tcp", resources, handler));

        info!(%local_addr, "TCP engine listening");
        let accept_task = tokio::spawn(accept_loop(Arc::clone(&core), listener));
        Ok(Self {
            core,
            local_addr,
            accept_task,
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
    pub fn is_running(&self) -> bool {
        !self.core.shutdown.is_cancelled()
    }

    /// Stop accepting and end every receive loop. The listening socket is
    /// closed when the accept task exits.
    pub fn stop(&self) {
        if !self.core.shutdown.is_cancelled() {
            info!(local_addr = %self.local_addr, "TCP engine stopping");
            self.core.shutdown.cancel();
        }
    }

    /// Wait for the accept loop to finish after [`stop`](Self::stop).
    pub async fn join(self) {
        if let Err(e) = self.accept_task.await {
            error!(error = %e, "TCP accept task panicked");
        }
    }
}

async fn accept_loop(core: Arc<EngineCore>, listener: TcpListener) {
    loop {
        tokio::select! {
            () = core.shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    // Hand off before touching the connection so the next
                    // accept is armed right away.
                    tokio::spawn(serve_connection(Arc::clone(&core), stream, peer));
                }
                Err(e) => {
                    core.resources.metrics.increment_transport_errors();
                    warn!(error = %e, "accept failed");
                }
            },
        }
    }
    debug!("TCP accept loop exited");
}

async fn serve_connection(core: Arc<EngineCore>, stream: TcpStream, peer: SocketAddr) {
    let Some(session) = core.open_session(Transport::Tcp(peer)) else {
        return;
    };
    if let Err(e) = stream.set_nodelay(true) {
        debug!(session_id = session.id(), error = %e, "failed to set TCP_NODELAY");
    }

    let (reader, writer) = stream.into_split();
    // Cancelled by engine shutdown, or by the writer when the socket breaks.
    let closing = core.shutdown.child_token();
    core.handler.on_accepted(&session).await;
    let writer_task = tokio::spawn(write_loop(
        Arc::clone(&core),
        Arc::clone(&session),
        writer,
        closing.clone(),
    ));

    let reassembler = session.take_reassembler();
    let reassembler = match reassembler {
        Some(reassembler) => read_loop(&core, &session, reader, reassembler, &closing).await,
        None => None,
    };
    core.teardown(&session, reassembler).await;
    closing.cancel();

    if let Err(e) = writer_task.await {
        error!(session_id = session.id(), error = %e, "TCP writer task panicked");
    }
}

/// Returns the reassembler so its buffer can go back to the pool.
async fn read_loop(
    core: &EngineCore,
    session: &Arc<Session>,
    mut reader: OwnedReadHalf,
    mut reassembler: Reassembler,
    closing: &CancellationToken,
) -> Option<Reassembler> {
    loop {
        let read = tokio::select! {
            () = closing.cancelled() => break,
            read = reader.read(reassembler.spare_mut()) => read,
        };
        match read {
            Ok(0) => {
                debug!(session_id = session.id(), "peer closed the connection");
                break;
            }
            Ok(n) => {
                core.resources.metrics.record_received(n);
                let committed = reassembler.commit(n, &core.resources.packets, |packet| {
                    session.push_inbound(packet);
                });
                // Frames completed before a bad one still get delivered.
                core.dispatch(session).await;
                if let Err(e) = committed {
                    core.record_framing_error(session, &e);
                    break;
                }
            }
            Err(e) => {
                core.resources.metrics.increment_transport_errors();
                debug!(session_id = session.id(), error = %e, "read failed");
                break;
            }
        }
        if !session.is_connected() {
            break;
        }
    }
    Some(reassembler)
}

async fn write_loop(
    core: Arc<EngineCore>,
    session: Arc<Session>,
    mut writer: OwnedWriteHalf,
    closing: CancellationToken,
) {
    'outer: loop {
        while let Some(packet) = session.pop_outbound() {
            let result = writer.write_all(packet.as_bytes()).await;
            let len = packet.len();
            core.resources.packets.release(packet);
            match result {
                Ok(()) => core.record_sent(&session, len),
                Err(e) => {
                    core.resources.metrics.increment_transport_errors();
                    debug!(session_id = session.id(), error = %e, "write failed");
                    closing.cancel();
                    break 'outer;
                }
            }
        }
        if !session.is_connected() {
            break;
        }
        tokio::select! {
            () = closing.cancelled() => break,
            () = session.outbound_ready() => {}
        }
    }
    let _ = writer.shutdown().await;
}
