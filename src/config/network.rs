//! Listener configuration for the TCP and UDP engines.

use super::defaults::{
    default_bind_address, default_enable_tcp, default_enable_udp, default_max_connections,
    default_tcp_port, default_udp_port,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Network listener configuration.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NetworkConfig {
    /// Address both listeners bind to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_tcp_port")]
    pub tcp_port: u16,
    #[serde(default = "default_udp_port")]
    pub udp_port: u16,
    /// Upper bound on live sessions across TCP and UDP together
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_enable_tcp")]
    pub enable_tcp: bool,
    #[serde(default = "default_enable_udp")]
    pub enable_udp: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            tcp_port: default_tcp_port(),
            udp_port: default_udp_port(),
            max_connections: default_max_connections(),
            enable_tcp: default_enable_tcp(),
            enable_udp: default_enable_udp(),
        }
    }
}

impl NetworkConfig {
    pub fn tcp_addr(&self) -> anyhow::Result<SocketAddr> {
        parse_addr(&self.bind_address, self.tcp_port)
    }

    pub fn udp_addr(&self) -> anyhow::Result<SocketAddr> {
        parse_addr(&self.bind_address, self.udp_port)
    }
}

fn parse_addr(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    format!("{host}:{port}")
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid bind address '{host}:{port}': {e}"))
}
