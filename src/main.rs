use crossbeam_channel::bounded;
use tracing::{info, Level};

use petri_arena_server::config::EngineConfig;
use petri_arena_server::game::game_loop::{OutboundMessage, TickScheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    info!("Petri Arena Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = EngineConfig::load_or_default();
    config.validate().map_err(anyhow::Error::msg)?;
    info!(
        "Configuration loaded: {}x{} world, {}ms tick",
        config.world_width, config.world_height, config.tick_interval_ms
    );

    let seed = std::env::var("ARENA_SEED")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(rand::random);
    info!("World seed: {}", seed);

    let (outbound_tx, outbound_rx) = bounded::<OutboundMessage>(config.outbound_capacity);
    let scheduler = TickScheduler::new(config, seed, outbound_tx);
    let _commands = scheduler.command_sender();

    // Transport is out of scope here: drain the outbound channel so the
    // engine never backs up, and surface the traffic in the log
    let drain = tokio::task::spawn_blocking(move || {
        let mut ticks_sent = 0u64;
        for message in outbound_rx.iter() {
            match message {
                OutboundMessage::TickUpdate { .. } => ticks_sent += 1,
                OutboundMessage::Leaderboard { entries } => {
                    info!("leaderboard: {} entries, {} diffs sent", entries.len(), ticks_sent);
                }
                OutboundMessage::SpawnRefused { session } => {
                    info!("spawn refused for {}", session);
                }
                OutboundMessage::SessionDied { session } => {
                    info!("session {} died", session);
                }
            }
        }
    });

    // Shutdown signal handler
    let shutdown = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Shutdown signal received");
    };

    tokio::select! {
        _ = scheduler.run() => {}
        _ = shutdown => {
            info!("Shutting down...");
        }
    }

    drop(drain);
    info!("Server stopped");

    Ok(())
}
