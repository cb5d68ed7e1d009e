//! Packet and buffer pool sizing.

use super::defaults::{
    default_buffer_pool_capacity, default_buffer_size, default_packet_pool_capacity,
    default_packet_size, default_pool_expand,
};
use serde::{Deserialize, Serialize};

/// Sizing for pooled packets and per-session receive buffers.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BufferConfig {
    /// Capacity of a single packet, header included
    #[serde(default = "default_packet_size")]
    pub packet_size: usize,
    /// Capacity of a session's receive accumulator
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Packets pre-allocated at startup
    #[serde(default = "default_packet_pool_capacity")]
    pub packet_pool_capacity: usize,
    /// Receive buffers pre-allocated at startup
    #[serde(default = "default_buffer_pool_capacity")]
    pub buffer_pool_capacity: usize,
    /// Allocate past the packet pool's capacity instead of failing
    #[serde(default = "default_pool_expand")]
    pub expand_packet_pool: bool,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            packet_size: default_packet_size(),
            buffer_size: default_buffer_size(),
            packet_pool_capacity: default_packet_pool_capacity(),
            buffer_pool_capacity: default_buffer_pool_capacity(),
            expand_packet_pool: default_pool_expand(),
        }
    }
}
