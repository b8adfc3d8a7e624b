//! Headless control surface for the autoflow engine.
//!
//! Stands in for the windowed UI collaborator: `record` captures input
//! until Ctrl+C, `play` replays the stored trace, `schedule` runs the
//! daily scheduler until Ctrl+C.

use anyhow::{Context, Result};
use autoflow::{Player, Recorder, RecorderConfig, Scheduler, Store};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::ctrl_c;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let store = Store::in_exe_dir().context("failed to locate state directory")?;

    match args.first().map(String::as_str) {
        Some("record") => record(store).await,
        Some("play") => {
            let speed = match args.get(1) {
                Some(raw) => raw
                    .parse::<f64>()
                    .with_context(|| format!("invalid speed factor {raw:?}"))?,
                None => 1.0,
            };
            play(store, speed).await
        }
        Some("schedule") => schedule(store).await,
        _ => {
            eprintln!("usage: autoflow-agent <record | play [speed] | schedule>");
            std::process::exit(2);
        }
    }
}

async fn record(store: Store) -> Result<()> {
    let recorder = Recorder::new(store, RecorderConfig::default());
    recorder.start().await.context("failed to start recording")?;
    info!("Recording. Press Ctrl+C to stop and save.");

    ctrl_c().await.context("failed to wait for Ctrl+C")?;
    recorder.stop().await.context("failed to stop recording")?;
    info!("Trace saved.");
    Ok(())
}

async fn play(store: Store, speed: f64) -> Result<()> {
    let player = Player::new(store).context("failed to initialize input backend")?;
    player.start(speed).await.context("failed to start playback")?;
    info!("Replaying trace at speed {speed}...");

    while player.is_playing() {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    info!("Playback finished.");
    Ok(())
}

async fn schedule(store: Store) -> Result<()> {
    let player = Arc::new(
        Player::new(store.clone()).context("failed to initialize input backend")?,
    );
    let scheduler = Arc::new(Scheduler::new(store, player));
    scheduler.set_callbacks(
        || info!("Scheduled replay completed"),
        |err| tracing::error!("Scheduled replay failed: {err}"),
    );

    scheduler.start().await.context("failed to start scheduler")?;
    info!("Scheduler running. Press Ctrl+C to exit.");

    ctrl_c().await.context("failed to wait for Ctrl+C")?;
    scheduler.stop().context("failed to stop scheduler")?;
    Ok(())
}
