//! Socket engines that turn bytes into sessions and packets.
//!
//! Both engines share [`EngineResources`] and report to a [`SessionHandler`].

pub mod engine;
pub mod registry;
pub mod tcp;
pub mod udp;

pub use engine::{EngineResources, SessionHandler};
pub use registry::{RegisterSessionError, SessionRegistry};
pub use tcp::TcpEngine;
pub use udp::UdpEngine;

use std::net::SocketAddr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
}
