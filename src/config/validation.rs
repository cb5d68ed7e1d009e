//! Configuration validation functions.

use super::Config;
use crate::protocol::HEADER_SIZE;

/// Reject configurations the engines cannot run with.
pub fn validate_config(config: &Config) -> anyhow::Result<()> {
    let network = &config.network;
    if !network.enable_tcp && !network.enable_udp {
        anyhow::bail!("at least one of network.enable_tcp / network.enable_udp must be true");
    }
    if network.max_connections == 0 {
        anyhow::bail!("network.max_connections must be greater than zero");
    }
    if network.enable_tcp {
        network.tcp_addr()?;
    }
    if network.enable_udp {
        network.udp_addr()?;
    }

    let buffers = &config.buffers;
    // Room for the header plus one list count, the smallest list reply.
    if buffers.packet_size < HEADER_SIZE + 4 {
        anyhow::bail!(
            "buffers.packet_size ({}) must exceed the {HEADER_SIZE}-byte frame header by at least 4 bytes",
            buffers.packet_size
        );
    }
    if buffers.packet_size > i32::MAX as usize {
        anyhow::bail!("buffers.packet_size must fit the 32-bit frame length prefix");
    }
    if buffers.buffer_size < buffers.packet_size {
        anyhow::bail!(
            "buffers.buffer_size ({}) must hold at least one full packet ({})",
            buffers.buffer_size,
            buffers.packet_size
        );
    }
    if buffers.packet_pool_capacity == 0 || buffers.buffer_pool_capacity == 0 {
        anyhow::bail!("pool capacities must be greater than zero");
    }

    if config.room.max_room_size == 0 {
        anyhow::bail!("room.max_room_size must be greater than zero");
    }
    if config.room.rank_limit == 0 || config.room.record_limit == 0 {
        anyhow::bail!("room.rank_limit and room.record_limit must be greater than zero");
    }

    if config.logging.enable_file_logging && config.logging.filename.trim().is_empty() {
        anyhow::bail!("logging.filename must be set when file logging is enabled");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_packet_smaller_than_header_rejected() {
        let mut config = Config::default();
        config.buffers.packet_size = HEADER_SIZE;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("packet_size"));
    }

    #[test]
    fn test_buffer_smaller_than_packet_rejected() {
        let mut config = Config::default();
        config.buffers.buffer_size = config.buffers.packet_size - 1;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_both_transports_disabled_rejected() {
        let mut config = Config::default();
        config.network.enable_tcp = false;
        config.network.enable_udp = false;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_room_size_rejected() {
        let mut config = Config::default();
        config.room.max_room_size = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_bad_bind_address_rejected() {
        let mut config = Config::default();
        config.network.bind_address = "not an address".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_file_logging_needs_a_filename() {
        let mut config = Config::default();
        config.logging.enable_file_logging = true;
        config.logging.filename = " ".to_string();
        assert!(validate_config(&config).is_err());
    }
}
