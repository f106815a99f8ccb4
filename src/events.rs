use crate::error::EventBusError;
use crate::protocol::{DisplayShot, MessageView};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Events that can occur in the slingshot hub
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SlingshotEvent {
    /// A websocket client connected to the hub
    ClientConnected {
        connection_id: String,
        timestamp: SystemTime,
    },
    /// A websocket client went away
    ClientDisconnected {
        connection_id: String,
        timestamp: SystemTime,
    },
    /// A shot was committed and must be shown on every display
    ShotDisplayed(DisplayShot),
    /// A legacy message was committed and must be shown on every display
    MessageReceived(MessageView),
    /// An upload fell through to the next storage backend
    StorageFallback {
        from: String,
        to: String,
        reason: String,
    },
    /// System shutdown requested
    ShutdownRequested {
        timestamp: SystemTime,
        reason: String,
    },
}

impl SlingshotEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            SlingshotEvent::ClientConnected { connection_id, .. } => {
                format!("Client {} connected", connection_id)
            }
            SlingshotEvent::ClientDisconnected { connection_id, .. } => {
                format!("Client {} disconnected", connection_id)
            }
            SlingshotEvent::ShotDisplayed(shot) => {
                format!(
                    "Shot {} by {} with force {:.1}",
                    shot.id, shot.user_name, shot.force
                )
            }
            SlingshotEvent::MessageReceived(message) => {
                format!("Message {} by {}", message.id, message.user_name)
            }
            SlingshotEvent::StorageFallback { from, to, reason } => {
                format!("Storage fell back from {} to {}: {}", from, to, reason)
            }
            SlingshotEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            SlingshotEvent::ClientConnected { .. } => "client_connected",
            SlingshotEvent::ClientDisconnected { .. } => "client_disconnected",
            SlingshotEvent::ShotDisplayed(_) => "shot_displayed",
            SlingshotEvent::MessageReceived(_) => "message_received",
            SlingshotEvent::StorageFallback { .. } => "storage_fallback",
            SlingshotEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }

    /// Events forwarded verbatim to every websocket client
    pub fn is_broadcast(&self) -> bool {
        matches!(
            self,
            SlingshotEvent::ShotDisplayed(_) | SlingshotEvent::MessageReceived(_)
        )
    }
}

/// Async event bus for component coordination using broadcast channels
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SlingshotEvent>,
    debug_logging: bool,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            debug_logging: false,
        }
    }

    /// Create a new event bus with debug logging enabled
    pub fn with_debug_logging(capacity: usize) -> Self {
        Self {
            debug_logging: true,
            ..Self::new(capacity)
        }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<SlingshotEvent> {
        self.sender.subscribe()
    }

    /// Subscribe with a filter applied on receive
    pub fn subscribe_filtered(&self, filter: EventFilter, name: impl Into<String>) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe(), filter, name.into())
    }

    /// Publish an event to all subscribers, returning how many received it
    pub fn publish(&self, event: SlingshotEvent) -> Result<usize, EventBusError> {
        if self.debug_logging {
            debug!("Publishing event: {}", event.description());
        }

        match &event {
            SlingshotEvent::ShotDisplayed(shot) => {
                info!(
                    "Broadcasting shot {} from {} (force {:.1})",
                    shot.id, shot.user_name, shot.force
                );
            }
            SlingshotEvent::StorageFallback { from, to, reason } => {
                warn!("Storage fallback {} -> {}: {}", from, to, reason);
            }
            SlingshotEvent::ShutdownRequested { reason, .. } => {
                info!("Shutdown requested: {}", reason);
            }
            _ => {}
        }

        self.sender
            .send(event)
            .map_err(|_| EventBusError::NoSubscribers)
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only events that go out to websocket clients
    Broadcasts,
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &SlingshotEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Broadcasts => event.is_broadcast(),
        }
    }
}

/// Filtered receiver that skips over missed events instead of failing
pub struct EventReceiver {
    receiver: broadcast::Receiver<SlingshotEvent>,
    filter: EventFilter,
    name: String,
    skipped: u64,
}

impl EventReceiver {
    pub fn new(
        receiver: broadcast::Receiver<SlingshotEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
            skipped: 0,
        }
    }

    /// Receive the next matching event
    pub async fn recv(&mut self) -> Result<SlingshotEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!(
                            "Receiver '{}' received event: {}",
                            self.name,
                            event.description()
                        );
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(
                        "Receiver '{}' lagged behind, skipping {} events",
                        self.name, n
                    );
                    self.skipped += n;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Events dropped because this receiver fell behind
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}
