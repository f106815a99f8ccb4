use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use clap::Parser;
use slingshot::gesture::{drive, ReplaySource};
use slingshot::logging::{init_logging, LogOptions};
use slingshot::protocol::{ServerMessage, ShotSubmission};
use slingshot::{ClientMessage, GestureClassifier, ShotContent, SlingshotConfig, TransportSession};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Wait this long for outstanding acknowledgments after the last shot
const ACK_GRACE: Duration = Duration::from_secs(5);

/// Shots awaiting a reply from the hub
#[derive(Debug, Default)]
struct AckTracker {
    fired: usize,
    confirmed: usize,
    pending: usize,
    deadline: Option<Instant>,
}

impl AckTracker {
    fn record_fired(&mut self) {
        self.fired += 1;
        self.pending += 1;
    }

    fn settled(&mut self, committed: bool) {
        self.pending = self.pending.saturating_sub(1);
        if committed {
            self.confirmed += 1;
        }
    }

    /// Opens the grace window once; the deadline never moves afterwards
    fn source_finished(&mut self, now: Instant) {
        self.deadline.get_or_insert(now + ACK_GRACE);
    }

    fn source_done(&self) -> bool {
        self.deadline.is_some()
    }

    fn is_complete(&self) -> bool {
        self.source_done() && self.pending == 0
    }
}

#[derive(Parser, Debug)]
#[command(name = "slingshot-sender")]
#[command(about = "Replays recorded motion through the gesture classifier and fires shots at the hub")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "slingshot.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Recorded samples, one `{"x","y","z","t"}` JSON object per line
    #[arg(short, long, help = "JSON-lines file of accelerometer samples")]
    samples: String,

    #[arg(long, default_value = "Anonymous", help = "Author name attached to every shot")]
    name: String,

    #[arg(long, default_value = "Hello!", help = "Message attached to every shot")]
    message: String,

    /// Selfie image file (png, jpeg, gif or webp)
    #[arg(long, help = "Image file sent as the selfie")]
    selfie: String,

    /// Hub websocket URL, overriding transport.url
    #[arg(short, long, help = "Hub websocket URL, e.g. ws://hub:3001/ws")]
    url: Option<String>,

    /// Honor the recorded sample timing instead of replaying as fast as possible
    #[arg(long)]
    realtime: bool,

    #[command(flatten)]
    log: LogOptions,
}

async fn selfie_data_url(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading selfie {}", path.display()))?;
    let mime = match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/png",
    };
    Ok(format!("data:{};base64,{}", mime, STANDARD.encode(bytes)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log)?;

    let mut config = SlingshotConfig::load_from_file(&args.config)?;
    if let Some(url) = args.url.clone() {
        config.transport.url = url;
    }
    config.validate()?;

    let selfie = selfie_data_url(Path::new(&args.selfie)).await?;
    let content = ShotContent::new(args.name.as_str(), args.message.as_str(), selfie);

    let mut source = ReplaySource::load(&args.samples)
        .await?
        .realtime(args.realtime);
    info!("Replaying {} samples from {}", source.remaining(), args.samples);

    let session = TransportSession::connect(&config.transport);
    let mut frames = session.events();
    session.wait_connected().await?;

    let mut classifier = GestureClassifier::for_source(config.gesture.clone(), content, &source);
    let (shots_tx, mut shots_rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let driver_cancel = cancel.clone();
    let driver = tokio::spawn(async move {
        drive(&mut classifier, &mut source, shots_tx, driver_cancel).await
    });

    let mut acks = AckTracker::default();

    loop {
        // Evaluated every pass but only polled once the source is done
        let grace = tokio::time::sleep_until(acks.deadline.unwrap_or_else(Instant::now));

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT signal (Ctrl+C)");
                cancel.cancel();
                break;
            }

            shot = shots_rx.recv(), if !acks.source_done() => {
                let Some(shot) = shot else {
                    acks.source_finished(Instant::now());
                    if acks.is_complete() {
                        break;
                    }
                    continue;
                };
                let force = shot.force;
                match session.send(&ClientMessage::ShotFired(ShotSubmission::from(shot))).await {
                    Ok(()) => {
                        acks.record_fired();
                        info!("Shot fired with force {:.1}", force);
                    }
                    // At most once: a shot is not retried after a failed send
                    Err(e) => warn!("Shot dropped: {}", e),
                }
            }

            frame = frames.recv() => {
                match frame {
                    Ok(ServerMessage::ShotSuccess(ack)) => {
                        acks.settled(true);
                        info!("Hub committed shot {}", ack.message_id);
                    }
                    Ok(ServerMessage::Error(err)) => {
                        acks.settled(false);
                        error!("Hub rejected shot: {}", err.message);
                    }
                    Ok(other) => debug!("Ignoring {:?}", other),
                    Err(e) => debug!("Frame stream: {}", e),
                }
                if acks.is_complete() {
                    break;
                }
            }

            _ = grace, if acks.source_done() => {
                warn!("{} shots unacknowledged", acks.pending);
                break;
            }
        }
    }

    match driver.await {
        Ok(Ok(shots)) => debug!("Classifier produced {} shots", shots),
        Ok(Err(e)) => error!("Gesture source failed: {}", e),
        Err(e) => error!("Gesture driver panicked: {}", e),
    }

    info!("Sent {} shots, {} committed", acks.fired, acks.confirmed);
    session.close().await;
    Ok(())
}
