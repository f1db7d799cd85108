use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;

use watchroom::{AppState, AssetStore, Config, RetentionSweeper, Room, UploadController};

#[derive(Debug, Parser)]
#[command(name = "watchroom", about = "Two-seat watch-together coordination server")]
struct Args {
    /// Configuration file (without extension)
    #[arg(long, default_value = "config/watchroom")]
    config: String,

    /// Override the configured HTTP port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;
    let port = args.port.unwrap_or(cfg.service.http.port);

    info!("{} v0.1.0", cfg.service.name);
    info!(
        "room: up to {} participants, {}s call timeout",
        cfg.room.max_participants, cfg.room.call_timeout_secs
    );
    info!(
        "storage: {} ({} byte cap, {}h retention)",
        cfg.storage.media_dir, cfg.storage.max_total_bytes, cfg.storage.retention_hours
    );

    let room = Room::new(&cfg.room);
    let assets = Arc::new(AssetStore::open(&cfg.storage.media_dir).await?);
    let uploads = UploadController::new(
        Arc::clone(&room),
        Arc::clone(&assets),
        cfg.storage.max_total_bytes,
        cfg.storage.max_file_bytes,
        cfg.room.broadcast_throttle(),
    );

    RetentionSweeper::new(
        Arc::clone(&assets),
        Arc::clone(&uploads),
        Arc::clone(&room),
        cfg.storage.retention_age(),
        cfg.storage.sweep_interval(),
    )
    .spawn();

    let state = AppState {
        room,
        assets,
        uploads,
    };
    let router = watchroom::create_router(state);

    let addr = format!("{}:{}", cfg.service.http.bind, port);
    info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, router).await.context("server error")?;

    Ok(())
}
