use super::reconnect::ReconnectPolicy;
use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::protocol::{ClientMessage, ServerMessage};
use futures::{SinkExt, StreamExt};
use std::fmt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const OUTBOUND_CAPACITY: usize = 64;
const INBOUND_CAPACITY: usize = 256;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection state observed by session users
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    /// Reconnection attempts exhausted; stays here until a new session is made
    Disconnected,
    /// Closed by the owner
    Closed,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::Connecting => write!(f, "connecting"),
            TransportState::Connected => write!(f, "connected"),
            TransportState::Reconnecting { attempt } => write!(f, "reconnecting ({})", attempt),
            TransportState::Disconnected => write!(f, "disconnected"),
            TransportState::Closed => write!(f, "closed"),
        }
    }
}

enum LinkEnd {
    Lost,
    Cancelled,
}

/// Auto-reconnecting websocket session to the hub.
///
/// Outbound frames are sent at most once; anything submitted while the link
/// is down is rejected with [`TransportError::NotConnected`].
pub struct TransportSession {
    url: String,
    policy: ReconnectPolicy,
    outbound: mpsc::Sender<String>,
    inbound: broadcast::Sender<ServerMessage>,
    state: watch::Receiver<TransportState>,
    cancel: CancellationToken,
    driver: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl TransportSession {
    /// Start the session; the first connection attempt runs in the background
    pub fn connect(config: &TransportConfig) -> Self {
        let policy = ReconnectPolicy::from_config(config);
        let connect_timeout = Duration::from_millis(config.connect_timeout_ms);
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (inbound, _) = broadcast::channel(INBOUND_CAPACITY);
        let (state_tx, state) = watch::channel(TransportState::Connecting);
        let cancel = CancellationToken::new();

        let driver = Driver {
            url: config.url.clone(),
            policy,
            connect_timeout,
            state: state_tx,
            inbound: inbound.clone(),
            outbound: outbound_rx,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(driver.run());

        Self {
            url: config.url.clone(),
            policy,
            outbound,
            inbound,
            state,
            cancel,
            driver: parking_lot::Mutex::new(Some(handle)),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> TransportState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == TransportState::Connected
    }

    /// Watch channel for state transitions
    pub fn state_changes(&self) -> watch::Receiver<TransportState> {
        self.state.clone()
    }

    /// Subscribe to decoded frames from the hub
    pub fn events(&self) -> broadcast::Receiver<ServerMessage> {
        self.inbound.subscribe()
    }

    /// Resolve once connected, or fail once the session has given up
    pub async fn wait_connected(&self) -> Result<(), TransportError> {
        let mut state = self.state.clone();
        loop {
            let current = *state.borrow_and_update();
            match current {
                TransportState::Connected => return Ok(()),
                TransportState::Disconnected => {
                    return Err(TransportError::RetriesExhausted {
                        attempts: self.policy.max_attempts,
                    })
                }
                TransportState::Closed => return Err(TransportError::Closed),
                _ => {}
            }
            if state.changed().await.is_err() {
                return Err(TransportError::Closed);
            }
        }
    }

    /// Queue a frame for the current link
    pub async fn send(&self, message: &ClientMessage) -> Result<(), TransportError> {
        match self.state() {
            TransportState::Connected => {}
            TransportState::Closed => return Err(TransportError::Closed),
            _ => return Err(TransportError::NotConnected),
        }

        let text = message.to_text()?;
        self.outbound
            .send(text)
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Stop reconnecting and close the link
    pub async fn close(&self) {
        self.cancel.cancel();
        let handle = self.driver.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Transport driver ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// One connection attempt bounded by `timeout`
async fn dial(url: &str, timeout: Duration) -> Result<Socket, TransportError> {
    match tokio::time::timeout(timeout, tokio_tungstenite::connect_async(url)).await {
        Ok(Ok((socket, _))) => Ok(socket),
        Ok(Err(e)) => Err(TransportError::Connect {
            url: url.to_string(),
            details: e.to_string(),
        }),
        Err(_) => Err(TransportError::Connect {
            url: url.to_string(),
            details: format!("timed out after {:?}", timeout),
        }),
    }
}

struct Driver {
    url: String,
    policy: ReconnectPolicy,
    connect_timeout: Duration,
    state: watch::Sender<TransportState>,
    inbound: broadcast::Sender<ServerMessage>,
    outbound: mpsc::Receiver<String>,
    cancel: CancellationToken,
}

impl Driver {
    async fn run(mut self) {
        let mut attempt = 0u32;

        loop {
            if attempt == 0 {
                self.state.send_replace(TransportState::Connecting);
            }

            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => break,
                outcome = dial(&self.url, self.connect_timeout) => outcome,
            };

            match outcome {
                Ok(socket) => {
                    info!("Connected to {}", self.url);
                    attempt = 0;
                    self.drain_stale();
                    self.state.send_replace(TransportState::Connected);
                    match self.pump(socket).await {
                        LinkEnd::Cancelled => break,
                        LinkEnd::Lost => warn!("Connection to {} lost", self.url),
                    }
                }
                Err(e) => warn!("{}", e),
            }

            attempt += 1;
            let Some(delay) = self.policy.delay_for_attempt(attempt) else {
                error!(
                    "Giving up on {} after {} reconnection attempts",
                    self.url, self.policy.max_attempts
                );
                self.state.send_replace(TransportState::Disconnected);
                return;
            };

            self.state
                .send_replace(TransportState::Reconnecting { attempt });
            debug!("Reconnection attempt {} in {:?}", attempt, delay);
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.state.send_replace(TransportState::Closed);
        debug!("Transport session for {} closed", self.url);
    }

    /// Frames queued for a previous link are not replayed
    fn drain_stale(&mut self) {
        let mut dropped = 0;
        while self.outbound.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!("Dropped {} frames queued before reconnect", dropped);
        }
    }

    async fn pump(&mut self, socket: Socket) -> LinkEnd {
        let (mut sink, mut stream) = socket.split();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return LinkEnd::Cancelled;
                }

                queued = self.outbound.recv() => {
                    let Some(text) = queued else {
                        let _ = sink.send(Message::Close(None)).await;
                        return LinkEnd::Cancelled;
                    };
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        debug!("Write failed: {}", e);
                        return LinkEnd::Lost;
                    }
                }

                frame = stream.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => self.dispatch(text.as_str()),
                        Some(Ok(Message::Close(_))) | None => return LinkEnd::Lost,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            debug!("Read failed: {}", e);
                            return LinkEnd::Lost;
                        }
                    }
                }
            }
        }
    }

    fn dispatch(&self, text: &str) {
        match ServerMessage::parse(text) {
            Ok(message) => {
                // No subscribers is fine for fire-and-forget senders
                let _ = self.inbound.send(message);
            }
            Err(e) => warn!("Undecodable frame from hub: {}", e),
        }
    }
}
