mod audio;
mod config;
mod controller;
mod error;
mod net_link;
mod protocol;

use std::time::Duration;

use tokio::signal;
use uuid::Uuid;

use audio::AlsaBackend;
use config::Config;
use controller::{SessionController, SessionState};
use net_link::WsChannelFactory;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = Config::new().unwrap_or_default();
    log::info!("{} v{} starting", config.app_name, config.app_version);

    // Call id from the command line, or a fresh one for ad-hoc runs
    let call_id = std::env::args()
        .nth(1)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let factory = WsChannelFactory::new(config.ws_url, config.channel_buffer);
    let mut controller = SessionController::new(
        config.capture_constraints(),
        config.block_size,
        AlsaBackend,
        factory,
    );

    controller.start(&call_id).await?;
    println!(
        "Streaming call {} to {} (Ctrl+C to stop)",
        call_id,
        net_link::endpoint_url(config.ws_url, &call_id)
    );

    let mut status = tokio::time::interval(Duration::from_secs(5));
    status.tick().await; // immediate first tick
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                println!("Received Ctrl+C, shutting down...");
                break;
            }
            _ = status.tick() => {
                log::debug!(
                    "level={:.2} dropped={}",
                    controller.audio_level(),
                    controller.dropped_frames(),
                );
                if controller.state() == SessionState::Error {
                    log::error!("Session lost its channel, shutting down");
                    break;
                }
            }
        }
    }

    controller.stop().await;
    if controller.dropped_frames() > 0 {
        log::warn!("{} frames were dropped this run", controller.dropped_frames());
    }
    Ok(())
}
