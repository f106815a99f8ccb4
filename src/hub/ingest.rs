use super::stats::{HubStats, HubStatsSnapshot};
use crate::error::{EventBusError, IngestError};
use crate::events::{EventBus, SlingshotEvent};
use crate::gesture::clamp_force;
use crate::persistence::{MessageRecord, MessageStore, NewMessage};
use crate::protocol::{DisplayShot, MessageSubmission, MessageView, ShotSubmission};
use crate::storage::{ImagePayload, StorageChain};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Force used when a submission carries none
pub const DEFAULT_FORCE: f64 = 5.0;

/// Number of records returned for `get-messages`
pub const RECENT_MESSAGES_LIMIT: usize = 50;

/// Acknowledgment sent to the originating connection
#[derive(Debug, Clone, PartialEq)]
pub struct Ack {
    pub message_id: String,
}

/// Validates, stores, persists and broadcasts submissions
pub struct IngestionHub {
    storage: Arc<StorageChain>,
    store: Arc<dyn MessageStore>,
    event_bus: EventBus,
    stats: Arc<HubStats>,
}

/// Required text field: present and non-empty after trimming
fn required(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn missing_fields(fields: &[(&str, Option<&str>)]) -> Result<(), IngestError> {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| value.is_none())
        .map(|(name, _)| *name)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(IngestError::validation(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )))
    }
}

impl IngestionHub {
    pub fn new(
        storage: Arc<StorageChain>,
        store: Arc<dyn MessageStore>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            storage,
            store,
            event_bus,
            stats: Arc::new(HubStats::default()),
        }
    }

    /// Ingest a `shotFired` submission
    pub async fn handle_shot(&self, submission: ShotSubmission) -> Result<Ack, IngestError> {
        let result = self.ingest_shot(submission).await;
        self.track(&result, |stats| stats.record_shot());
        result
    }

    async fn ingest_shot(&self, submission: ShotSubmission) -> Result<Ack, IngestError> {
        let name = required(&submission.name);
        let message = required(&submission.message);
        let selfie = required(&submission.selfie);
        missing_fields(&[("name", name), ("message", message), ("selfie", selfie)])?;

        let (Some(name), Some(message), Some(selfie)) = (name, message, selfie) else {
            return Err(IngestError::validation("Missing required fields"));
        };

        let record = self.commit(name, message, selfie).await?;

        let force = clamp_force(submission.force.unwrap_or(DEFAULT_FORCE));
        let timestamp = submission
            .timestamp
            .unwrap_or_else(|| Utc::now().timestamp_millis().max(0) as u64);

        info!(
            "Shot {} from {} committed (force {:.1})",
            record.id, record.user_name, force
        );

        self.broadcast(SlingshotEvent::ShotDisplayed(DisplayShot {
            id: record.id.clone(),
            user_name: record.user_name.clone(),
            message: record.message.clone(),
            image_url: record.image_url.clone(),
            force,
            timestamp,
            created_at: record.created_at,
        }));

        Ok(Ack {
            message_id: record.id,
        })
    }

    /// Ingest a legacy `send-message` submission
    pub async fn handle_message(&self, submission: MessageSubmission) -> Result<Ack, IngestError> {
        let result = self.ingest_message(submission).await;
        self.track(&result, |stats| stats.record_message());
        result
    }

    async fn ingest_message(&self, submission: MessageSubmission) -> Result<Ack, IngestError> {
        let image = required(&submission.image);
        let user_name = required(&submission.user_name);
        let message = required(&submission.message);
        missing_fields(&[("image", image), ("userName", user_name), ("message", message)])?;

        let (Some(image), Some(user_name), Some(message)) = (image, user_name, message) else {
            return Err(IngestError::validation("Missing required fields"));
        };

        let record = self.commit(user_name, message, image).await?;
        info!("Message {} from {} committed", record.id, record.user_name);

        self.broadcast(SlingshotEvent::MessageReceived(record.view()));

        Ok(Ack {
            message_id: record.id,
        })
    }

    /// Most recent records, newest first
    pub async fn recent_messages(&self, limit: usize) -> Result<Vec<MessageView>, IngestError> {
        let records = self
            .store
            .list(Some(limit))
            .await
            .map_err(IngestError::Persistence)?;
        Ok(records.iter().map(MessageRecord::view).collect())
    }

    pub fn stats(&self) -> HubStatsSnapshot {
        self.stats.snapshot(self.storage.fallback_count())
    }

    pub(crate) fn stats_handle(&self) -> Arc<HubStats> {
        Arc::clone(&self.stats)
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    /// Store the image then persist the record; the image is discarded when
    /// the record cannot be written.
    async fn commit(
        &self,
        user_name: &str,
        message: &str,
        image: &str,
    ) -> Result<MessageRecord, IngestError> {
        let payload = ImagePayload::decode(image)
            .map_err(|e| IngestError::validation(format!("Invalid image: {}", e)))?;

        let stored = self
            .storage
            .upload(&payload, user_name)
            .await
            .map_err(IngestError::Storage)?;

        let new = NewMessage {
            user_name: user_name.to_string(),
            message: message.to_string(),
            image_url: stored.url.clone(),
            image_key: stored.key.clone(),
        };

        match self.store.insert(new).await {
            Ok(record) => Ok(record),
            Err(e) => {
                warn!("Persisting message from {} failed: {}", user_name, e);
                self.storage.discard(&stored).await;
                Err(IngestError::Persistence(e))
            }
        }
    }

    fn broadcast(&self, event: SlingshotEvent) {
        match self.event_bus.publish(event) {
            Ok(receivers) => debug!("Broadcast delivered to {} subscribers", receivers),
            Err(EventBusError::NoSubscribers) => debug!("No connected clients for broadcast"),
            Err(e) => warn!("Broadcast failed: {}", e),
        }
    }

    fn track(&self, result: &Result<Ack, IngestError>, on_success: impl FnOnce(&HubStats)) {
        match result {
            Ok(_) => on_success(&self.stats),
            Err(e) => {
                self.stats.record_rejection();
                match e {
                    IngestError::Validation { reason } => debug!("Submission rejected: {}", reason),
                    other => warn!("Submission failed: {}", other),
                }
            }
        }
    }
}
