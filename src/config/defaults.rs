//! Default value functions for configuration fields.
//!
//! Used by serde's `#[serde(default = ...)]` attributes throughout the
//! configuration system, grouped by section.

// =============================================================================
// Network Defaults
// =============================================================================

pub const fn default_tcp_port() -> u16 {
    8000
}

pub const fn default_udp_port() -> u16 {
    8001
}

pub fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

pub const fn default_max_connections() -> usize {
    3000
}

pub const fn default_enable_tcp() -> bool {
    true
}

pub const fn default_enable_udp() -> bool {
    true
}

// =============================================================================
// Buffer Defaults
// =============================================================================

pub const fn default_packet_size() -> usize {
    4096
}

/// Accumulator size per session: room for sixteen maximum-size frames.
pub const fn default_buffer_size() -> usize {
    default_packet_size() * 16
}

pub const fn default_packet_pool_capacity() -> usize {
    1024
}

/// One receive buffer per connection the server is willing to accept.
pub const fn default_buffer_pool_capacity() -> usize {
    default_max_connections()
}

pub const fn default_pool_expand() -> bool {
    true
}

// =============================================================================
// Room Defaults
// =============================================================================

pub const fn default_max_room_size() -> usize {
    4
}

pub const fn default_rank_limit() -> usize {
    10
}

pub const fn default_record_limit() -> usize {
    20
}

pub fn default_scene() -> String {
    String::new()
}

// =============================================================================
// Logging Defaults
// =============================================================================

pub fn default_log_dir() -> String {
    "logs".to_string()
}

pub fn default_log_filename() -> String {
    "lobbynet.log".to_string()
}
