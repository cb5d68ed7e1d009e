#![cfg_attr(not(test), deny(clippy::panic))]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_excessive_bools,
    clippy::too_many_lines,
    clippy::similar_names
)]

//! # Lobbynet Server
//!
//! A binary-protocol TCP/UDP game server with pooled packet framing and an
//! authoritative room layer for up to four players per room.
//!
//! Everything is in memory: accounts and records live in the process, and no
//! external services are required.

/// Server configuration and environment variables
pub mod config;

/// Crate-wide error aggregate
pub mod error;

/// Process wiring for the binary and integration tests
pub mod lobby;

/// Structured logging configuration
pub mod logging;

/// Metrics collection and reporting
pub mod metrics;

/// TCP and UDP engines, session registry
pub mod net;

/// Account, rank and record storage (in-memory implementation)
pub mod persistence;

/// Object and buffer pools
pub mod pool;

/// Wire format: packets, opcodes and body codecs
pub mod protocol;

/// Room state machine
pub mod server;

/// Per-connection state and stream reassembly
pub mod session;
