//! Host process for the booking engine: replays the journal, keeps it
//! compacted, and flushes a final snapshot on shutdown. Transports embed
//! `roomledger::service::BookingService` and are not part of this binary.

use std::sync::Arc;

use tracing::info;

use roomledger::compactor;
use roomledger::config::Config;
use roomledger::engine::Engine;
use roomledger::service::BookingService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    roomledger::observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let wal_path = config.wal_path();
    let engine = Arc::new(Engine::open(&wal_path)?);
    let service = BookingService::new(engine.clone());

    info!("roomledger started");
    info!("  journal: {}", wal_path.display());
    info!("  compact threshold: {} appends", config.compact_threshold);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );
    info!(
        "  {} rooms, {} active reservations",
        service.list_rooms(None).await.len(),
        service.public_reservations().await.len()
    );

    let compactor_engine = engine.clone();
    let compactor = tokio::spawn(compactor::run_compactor(
        compactor_engine,
        config.compact_threshold,
        config.compact_interval,
    ));

    // Graceful shutdown on SIGTERM/ctrl-c
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }

    info!("shutdown signal received");
    compactor.abort();
    engine.compact_log().await?;
    info!("roomledger stopped");
    Ok(())
}
