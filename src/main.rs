#![cfg_attr(not(test), deny(clippy::panic))]

use clap::Parser;
use lobbynet_server::config;
use lobbynet_server::lobby::Lobby;
use lobbynet_server::logging;
use lobbynet_server::persistence::{create_persistence, PersistenceConfig};

/// Lobbynet -- binary-protocol TCP/UDP lobby server for small multiplayer rooms
#[derive(Parser, Debug)]
#[command(name = "lobbynet-server")]
#[command(about = "A binary-protocol TCP/UDP lobby server for small multiplayer rooms")]
#[command(version)]
struct Cli {
    /// Validate configuration and exit without starting the server.
    /// Useful for CI/CD pipelines and pre-deployment checks.
    #[arg(long, short = 'c', conflicts_with = "print_config")]
    validate_config: bool,

    /// Print the loaded configuration to stdout (as JSON) and exit.
    /// Useful for debugging configuration loading from multiple sources.
    #[arg(long, conflicts_with = "validate_config")]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // config.json, LOBBYNET_CONFIG_* and LOBBYNET__ overrides; defaults otherwise.
    let cfg = config::load();

    if cli.print_config {
        let json = serde_json::to_string_pretty(&cfg)
            .map_err(|e| anyhow::anyhow!("Failed to serialize config: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    // config::load() only reports problems on stderr; here they decide the
    // exit code.
    let validation_result = config::validate_config(&cfg);

    if cli.validate_config {
        match validation_result {
            Ok(()) => {
                println!("Configuration validation passed");
                println!();
                println!("Configuration summary:");
                println!(
                    "  TCP: {} (port {})",
                    enabled(cfg.network.enable_tcp),
                    cfg.network.tcp_port
                );
                println!(
                    "  UDP: {} (port {})",
                    enabled(cfg.network.enable_udp),
                    cfg.network.udp_port
                );
                println!("  Max connections: {}", cfg.network.max_connections);
                println!("  Packet size: {} bytes", cfg.buffers.packet_size);
                println!("  Receive buffer: {} bytes", cfg.buffers.buffer_size);
                println!("  Max players per room: {}", cfg.room.max_room_size);
                println!("  Storage backend: InMemory");
                return Ok(());
            }
            Err(e) => {
                eprintln!("Configuration validation failed:\n{e}");
                std::process::exit(1);
            }
        }
    }

    validation_result?;

    // Keep the guard alive so buffered file logs flush on exit.
    let _log_guard = logging::init_with_config(&cfg.logging);

    tracing::info!(
        bind_address = %cfg.network.bind_address,
        tcp_port = cfg.network.tcp_port,
        udp_port = cfg.network.udp_port,
        "Starting Lobbynet server"
    );

    let persistence = create_persistence(PersistenceConfig::InMemory);
    let lobby = Lobby::start(&cfg, persistence).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    lobby.shutdown().await;

    Ok(())
}

const fn enabled(flag: bool) -> &'static str {
    if flag {
        "enabled"
    } else {
        "disabled"
    }
}
