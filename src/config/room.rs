//! Lobby behaviour configuration.

use super::defaults::{
    default_max_room_size, default_rank_limit, default_record_limit, default_scene,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RoomConfig {
    /// Members per room before a new room is opened
    #[serde(default = "default_max_room_size")]
    pub max_room_size: usize,
    /// Entries returned by a rank query
    #[serde(default = "default_rank_limit")]
    pub rank_limit: usize,
    /// Newest records returned for one user
    #[serde(default = "default_record_limit")]
    pub record_limit: usize,
    /// Scene a freshly created room starts in
    #[serde(default = "default_scene")]
    pub initial_scene: String,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_room_size: default_max_room_size(),
            rank_limit: default_rank_limit(),
            record_limit: default_record_limit(),
            initial_scene: default_scene(),
        }
    }
}
