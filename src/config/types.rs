//! Root configuration types.

use super::buffers::BufferConfig;
use super::logging::LoggingConfig;
use super::network::NetworkConfig;
use super::room::RoomConfig;
use serde::{Deserialize, Serialize};

/// Root configuration struct for the lobby server.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub buffers: BufferConfig,
    #[serde(default)]
    pub room: RoomConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}
