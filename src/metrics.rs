use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters for the engines and the lobby.
#[derive(Debug, Default)]
pub struct ServerMetrics {
    // Connection metrics
    pub total_connections: AtomicU64,
    pub active_connections: AtomicU64,
    pub disconnections: AtomicU64,
    pub rejected_connections: AtomicU64,
    pub framing_errors: AtomicU64,
    pub transport_errors: AtomicU64,

    // Traffic metrics
    pub packets_received: AtomicU64,
    pub packets_sent: AtomicU64,
    pub bytes_received: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub packets_dropped: AtomicU64,

    // Pool metrics
    pub pool_exhaustions: AtomicU64,

    // Room metrics
    pub rooms_created: AtomicU64,
    pub rooms_deleted: AtomicU64,
    pub rooms_joined: AtomicU64,
    pub rooms_left: AtomicU64,
    pub host_migrations: AtomicU64,
    pub objects_spawned: AtomicU64,
    pub objects_despawned: AtomicU64,
    pub spawn_conflicts: AtomicU64,

    // Persistence metrics
    pub persistence_failures: AtomicU64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub connections: ConnectionMetrics,
    pub traffic: TrafficMetrics,
    pub rooms: RoomMetrics,
    pub pool_exhaustions: u64,
    pub persistence_failures: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ConnectionMetrics {
    pub total_connections: u64,
    pub active_connections: u64,
    pub disconnections: u64,
    pub rejected_connections: u64,
    pub framing_errors: u64,
    pub transport_errors: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TrafficMetrics {
    pub packets_received: u64,
    pub packets_sent: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub packets_dropped: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RoomMetrics {
    pub rooms_created: u64,
    pub rooms_deleted: u64,
    pub rooms_joined: u64,
    pub rooms_left: u64,
    pub host_migrations: u64,
    pub objects_spawned: u64,
    pub objects_despawned: u64,
    pub spawn_conflicts: u64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl ServerMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // Connection metrics
    pub fn increment_connections(&self) {
        bump(&self.total_connections);
        bump(&self.active_connections);
    }

    pub fn decrement_active_connections(&self) {
        // Check-then-decrement so a stray teardown cannot underflow.
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                current.checked_sub(1)
            });
        bump(&self.disconnections);
    }

    pub fn increment_rejected_connections(&self) {
        bump(&self.rejected_connections);
    }

    pub fn increment_framing_errors(&self) {
        bump(&self.framing_errors);
    }

    pub fn increment_transport_errors(&self) {
        bump(&self.transport_errors);
    }

    // Traffic metrics
    pub fn record_received(&self, bytes: usize) {
        self.bytes_received
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn increment_packets_received(&self) {
        bump(&self.packets_received);
    }

    pub fn record_sent(&self, bytes: usize) {
        bump(&self.packets_sent);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn increment_packets_dropped(&self) {
        bump(&self.packets_dropped);
    }

    pub fn increment_pool_exhaustions(&self) {
        bump(&self.pool_exhaustions);
    }

    // Room metrics
    pub fn increment_rooms_created(&self) {
        bump(&self.rooms_created);
    }

    pub fn increment_rooms_deleted(&self) {
        bump(&self.rooms_deleted);
    }

    pub fn increment_rooms_joined(&self) {
        bump(&self.rooms_joined);
    }

    pub fn increment_rooms_left(&self) {
        bump(&self.rooms_left);
    }

    pub fn increment_host_migrations(&self) {
        bump(&self.host_migrations);
    }

    pub fn increment_objects_spawned(&self) {
        bump(&self.objects_spawned);
    }

    pub fn increment_objects_despawned(&self) {
        bump(&self.objects_despawned);
    }

    pub fn increment_spawn_conflicts(&self) {
        bump(&self.spawn_conflicts);
    }

    pub fn increment_persistence_failures(&self) {
        bump(&self.persistence_failures);
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        MetricsSnapshot {
            timestamp: chrono::Utc::now(),
            connections: ConnectionMetrics {
                total_connections: load(&self.total_connections),
                active_connections: load(&self.active_connections),
                disconnections: load(&self.disconnections),
                rejected_connections: load(&self.rejected_connections),
                framing_errors: load(&self.framing_errors),
                transport_errors: load(&self.transport_errors),
            },
            traffic: TrafficMetrics {
                packets_received: load(&self.packets_received),
                packets_sent: load(&self.packets_sent),
                bytes_received: load(&self.bytes_received),
                bytes_sent: load(&self.bytes_sent),
                packets_dropped: load(&self.packets_dropped),
            },
            rooms: RoomMetrics {
                rooms_created: load(&self.rooms_created),
                rooms_deleted: load(&self.rooms_deleted),
                rooms_joined: load(&self.rooms_joined),
                rooms_left: load(&self.rooms_left),
                host_migrations: load(&self.host_migrations),
                objects_spawned: load(&self.objects_spawned),
                objects_despawned: load(&self.objects_despawned),
                spawn_conflicts: load(&self.spawn_conflicts),
            },
            pool_exhaustions: load(&self.pool_exhaustions),
            persistence_failures: load(&self.persistence_failures),
        }
    }
}
