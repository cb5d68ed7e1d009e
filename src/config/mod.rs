//! Configuration module for the lobby server.
//!
//! Supports JSON configuration files, inline JSON, environment variable
//! overrides and compiled-in defaults.
//!
//! # Module Structure
//!
//! - [`crate::config::types`]: Root `Config` struct
//! - [`network`]: Listener addresses, ports and connection cap
//! - [`buffers`]: Packet and receive-buffer pool sizing
//! - [`room`]: Lobby behaviour (room size, rank list length)
//! - [`logging`]: Logging configuration
//! - [`crate::config::loader`]: Configuration loading functions
//! - [`crate::config::validation`]: Configuration validation functions
//! - [`crate::config::defaults`]: Default value functions

pub mod buffers;
pub mod defaults;
pub mod loader;
pub mod logging;
pub mod network;
pub mod room;
pub mod types;
pub mod validation;

pub use buffers::BufferConfig;

pub use loader::{load, ConfigLoader};

pub use logging::{LogFormat, LogLevel, LogRotation, LoggingConfig};

pub use network::NetworkConfig;

pub use room::RoomConfig;

pub use types::Config;

pub use validation::validate_config;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();

        assert_eq!(config.network.tcp_port, 8000);
        assert_eq!(config.network.udp_port, 8001);
        assert_eq!(config.network.max_connections, 3000);
        assert!(config.network.enable_tcp);
        assert!(config.network.enable_udp);

        assert_eq!(config.buffers.packet_size, 4096);
        assert_eq!(config.buffers.buffer_size, 4096 * 16);

        assert_eq!(config.room.max_room_size, 4);
        assert_eq!(config.room.rank_limit, 10);
        assert_eq!(config.room.record_limit, 20);

        assert_eq!(config.logging.dir, "logs");
        assert_eq!(config.logging.rotation, LogRotation::Daily);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let deserialized: Config = serde_json::from_str(&json).unwrap();

        assert_eq!(config.network.tcp_port, deserialized.network.tcp_port);
        assert_eq!(
            config.buffers.buffer_pool_capacity,
            deserialized.buffers.buffer_pool_capacity
        );
        assert_eq!(config.room.max_room_size, deserialized.room.max_room_size);
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let config: Config = serde_json::from_str(r#"{"room": {"rank_limit": 3}}"#).unwrap();
        assert_eq!(config.room.rank_limit, 3);
        assert_eq!(config.room.max_room_size, 4);
        assert_eq!(config.network.tcp_port, 8000);
    }

    #[test]
    fn test_log_level_aliases() {
        let level: LogLevel = serde_json::from_str(r#""WARNING""#).unwrap();
        assert_eq!(level, LogLevel::Warn);
        assert_eq!(LogLevel::Error.to_string(), "error");
        assert!(serde_json::from_str::<LogLevel>(r#""loud""#).is_err());
        assert!(serde_json::from_str::<LogRotation>(r#""weekly""#).is_err());
    }
}
