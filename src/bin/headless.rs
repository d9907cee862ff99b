//! Headless streaming client
//!
//! Connects to a streaming server, runs one session and logs pipeline
//! statistics. Useful for soak-testing the core without a UI.

use anyhow::Result;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use emustream_client::{
    config::AppConfig,
    input::{map_key, Edge},
    session::{SessionEvent, SessionManager},
    transport::TransportMode,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rom = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "demo.gba".to_string());

    let config = AppConfig::load();
    config.install_key_mapping();
    tracing::info!(ws_url = %config.network.ws_url, rom, "starting headless client");

    let manager = SessionManager::new(config);
    let (session_id, mut events) = manager
        .create_session(&rom, TransportMode::Both)
        .await?;
    tracing::info!(session = %session_id, "session created");

    manager.start_session(&session_id)?;

    // Poke a button now and then so the emulator has something to chew on.
    let demo_key = map_key("enter");

    let mut stats_timer = tokio::time::interval(Duration::from_secs(5));
    let mut input_timer = tokio::time::interval(Duration::from_secs(10));
    let mut frames_seen: u64 = 0;

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(SessionEvent::VideoFrame(_)) => {
                        frames_seen += 1;
                    }
                    Some(SessionEvent::Connected { transport }) => {
                        tracing::info!(?transport, "connected");
                    }
                    Some(SessionEvent::AudioReady) => {
                        tracing::info!("audio playback ready");
                    }
                    Some(SessionEvent::StateSaved { state, thumbnail }) => {
                        tracing::info!(
                            state_bytes = state.len(),
                            has_thumbnail = thumbnail.is_some(),
                            "save state received"
                        );
                    }
                    Some(SessionEvent::Error { message }) => {
                        tracing::warn!(message, "session error");
                    }
                    Some(SessionEvent::Disconnected { transport, reason }) => {
                        tracing::warn!(?transport, reason, "disconnected");
                        if transport == emustream_client::transport::TransportKind::Reliable {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = stats_timer.tick() => {
                if let Ok(stats) = manager.session_stats(&session_id) {
                    tracing::info!(
                        state = ?stats.state,
                        mode = ?stats.mode,
                        frames_seen,
                        frames_drawn = stats.frames_drawn,
                        frames_dropped = stats.frames_dropped,
                        queued_audio_ms = stats.queued_audio_ms,
                        underruns = stats.audio_underruns,
                        audio_blocks = stats.audio_blocks_decoded,
                        audio_failed = stats.audio_blocks_failed,
                        "session stats"
                    );
                }
            }
            _ = input_timer.tick() => {
                if let Some(button) = demo_key {
                    let _ = manager.send_input(&session_id, button.name(), Edge::Down).await;
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    let _ = manager.send_input(&session_id, button.name(), Edge::Up).await;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
        }
    }

    manager.stop_session(&session_id).await?;
    Ok(())
}
