use anyhow::{bail, Result};
use clap::Parser;
use slingshot::logging::{init_logging, LogOptions};
use slingshot::protocol::ServerMessage;
use slingshot::{ClientMessage, LayoutAllocator, SlingshotConfig, TransportSession, TransportState};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "slingshot-display")]
#[command(about = "Display client that places hub broadcasts on a shot wall")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "slingshot.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Hub websocket URL, overriding transport.url
    #[arg(short, long, help = "Hub websocket URL, e.g. ws://hub:3001/ws")]
    url: Option<String>,

    #[command(flatten)]
    log: LogOptions,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log)?;

    let mut config = SlingshotConfig::load_from_file(&args.config)?;
    if let Some(url) = args.url {
        config.transport.url = url;
    }
    config.validate()?;

    let session = TransportSession::connect(&config.transport);
    let mut frames = session.events();
    // Fires for the initial connection too, which requests history
    let mut states = session.state_changes();
    let mut layout = LayoutAllocator::new(config.layout.clone());

    info!("Display connecting to {}", session.url());
    session.wait_connected().await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT signal (Ctrl+C)");
                break;
            }

            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                match state {
                    TransportState::Connected => {
                        info!("Display connected to hub");
                        if let Err(e) = session.send(&ClientMessage::GetMessages).await {
                            debug!("History request failed: {}", e);
                        }
                    }
                    TransportState::Disconnected => {
                        error!("Hub unreachable, giving up");
                        bail!("hub at {} is unreachable", session.url());
                    }
                    other => debug!("Transport {}", other),
                }
            }

            frame = frames.recv() => {
                match frame {
                    Ok(ServerMessage::DisplayShot(shot)) => {
                        let slot = layout.place(&shot);
                        info!(
                            "{} says \"{}\" at ({:.1}, {:.1}) force {:.1} [{:?}, {} visible]",
                            shot.user_name,
                            shot.message,
                            slot.x,
                            slot.y,
                            shot.force,
                            slot.placement,
                            layout.len()
                        );
                    }
                    Ok(ServerMessage::ReceiveMessage(message)) => {
                        info!("Message from {}: {}", message.user_name, message.message);
                    }
                    Ok(ServerMessage::AllMessages(list)) => {
                        info!("Hub holds {} recent messages", list.messages.len());
                    }
                    Ok(other) => debug!("Ignoring {:?}", other),
                    Err(RecvError::Lagged(skipped)) => warn!("Display lagged, skipped {} frames", skipped),
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    info!(
        "Display stopping ({} grid and {} unconstrained fallbacks)",
        layout.grid_fallbacks(),
        layout.unconstrained_fallbacks()
    );
    session.close().await;
    Ok(())
}
