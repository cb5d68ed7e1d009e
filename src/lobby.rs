//! Process wiring: pools, room server and the enabled engines.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::config::Config;
use crate::metrics::ServerMetrics;
use crate::net::{EngineResources, SessionHandler, TcpEngine, UdpEngine};
use crate::persistence::PersistenceService;
use crate::server::RoomServer;

/// A running lobby. Dropping it leaves the engines running; call
/// [`shutdown`](Self::shutdown).
pub struct Lobby {
    rooms: Arc<RoomServer>,
    resources: EngineResources,
    tcp: Option<TcpEngine>,
    udp: Option<UdpEngine>,
}

impl Lobby {
    /// Build shared resources and bind every enabled transport.
    pub async fn start(config: &Config, persistence: Arc<dyn PersistenceService>) -> anyhow::Result<Self> {
        let metrics = Arc::new(ServerMetrics::new());
        let resources = EngineResources::new(
            &config.buffers,
            config.network.max_connections,
            Arc::clone(&metrics),
        );
        let rooms = Arc::new(RoomServer::new(config.room.clone(), persistence, metrics));
        let handler: Arc<dyn SessionHandler> = rooms.clone();

        let tcp = if config.network.enable_tcp {
            let addr = config.network.tcp_addr()?;
            let engine = TcpEngine::bind(addr, resources.clone(), Arc::clone(&handler))
                .await
                .with_context(|| format!("starting TCP engine on {addr}"))?;
            Some(engine)
        } else {
            None
        };

        let udp = if config.network.enable_udp {
            let addr = config.network.udp_addr()?;
            let engine = UdpEngine::bind(addr, resources.clone(), Arc::clone(&handler))
                .await
                .with_context(|| format!("starting UDP engine on {addr}"))?;
            Some(engine)
        } else {
            None
        };

        info!(
            tcp = ?tcp.as_ref().map(TcpEngine::local_addr),
            udp = ?udp.as_ref().map(UdpEngine::local_addr),
            max_room_size = config.room.max_room_size,
            "lobby started"
        );
        Ok(Self {
            rooms,
            resources,
            tcp,
            udp,
        })
    }

    #[must_use]
    pub fn tcp_addr(&self) -> Option<SocketAddr> {
        self.tcp.as_ref().map(TcpEngine::local_addr)
    }

    #[must_use]
    pub fn udp_addr(&self) -> Option<SocketAddr> {
        self.udp.as_ref().map(UdpEngine::local_addr)
    }

    #[must_use]
    pub fn rooms(&self) -> &Arc<RoomServer> {
        &self.rooms
    }

    #[must_use]
    pub fn resources(&self) -> &EngineResources {
        &self.resources
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<ServerMetrics> {
        &self.resources.metrics
    }

    /// Stop both engines and wait for their loops to finish.
    pub async fn shutdown(self) {
        if let Some(tcp) = &self.tcp {
            tcp.stop();
        }
        if let Some(udp) = &self.udp {
            udp.stop();
        }
        if let Some(tcp) = self.tcp {
            tcp.join().await;
        }
        if let Some(udp) = self.udp {
            udp.join().await;
        }
        let snapshot = self.resources.metrics.snapshot();
        info!(
            total_connections = snapshot.connections.total_connections,
            rooms_created = snapshot.rooms.rooms_created,
            "lobby stopped"
        );
    }
}
