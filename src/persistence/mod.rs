//! Create-once message records.

mod file;
mod memory;

pub use file::FileMessageStore;
pub use memory::MemoryMessageStore;

use crate::config::PersistenceConfig;
use crate::error::PersistenceError;
use crate::protocol::MessageView;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// A committed submission. Never mutated after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: String,
    pub user_name: String,
    pub message: String,
    pub image_url: String,
    pub image_key: String,
    pub created_at: DateTime<Utc>,
}

impl MessageRecord {
    fn from_new(new: NewMessage) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            user_name: new.user_name,
            message: new.message,
            image_url: new.image_url,
            image_key: new.image_key,
            created_at: Utc::now(),
        }
    }

    pub fn view(&self) -> MessageView {
        MessageView {
            id: self.id.clone(),
            user_name: self.user_name.clone(),
            message: self.message.clone(),
            image_url: self.image_url.clone(),
            created_at: self.created_at,
        }
    }
}

/// Fields supplied by the hub; id and timestamp are assigned on insert
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub user_name: String,
    pub message: String,
    pub image_url: String,
    pub image_key: String,
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert(&self, new: NewMessage) -> Result<MessageRecord, PersistenceError>;

    async fn get(&self, id: &str) -> Result<MessageRecord, PersistenceError>;

    /// Newest first, optionally truncated
    async fn list(&self, limit: Option<usize>) -> Result<Vec<MessageRecord>, PersistenceError>;

    async fn delete(&self, id: &str) -> Result<MessageRecord, PersistenceError>;

    async fn count(&self) -> Result<usize, PersistenceError>;
}

/// Open the store selected by configuration
pub async fn open_store(
    config: &PersistenceConfig,
) -> Result<Arc<dyn MessageStore>, PersistenceError> {
    if config.ephemeral {
        info!("Using in-memory message store");
        return Ok(Arc::new(MemoryMessageStore::new()));
    }

    let store = FileMessageStore::open(&config.path).await?;
    Ok(Arc::new(store))
}

/// Newest-first slice of records kept oldest first
fn newest_first(records: &[MessageRecord], limit: Option<usize>) -> Vec<MessageRecord> {
    let take = limit.unwrap_or(records.len());
    records.iter().rev().take(take).cloned().collect()
}

/// Same key a reopened file store sorts by, so order survives a restart
fn order_key(record: &MessageRecord) -> (DateTime<Utc>, &str) {
    (record.created_at, record.id.as_str())
}

fn insert_ordered(records: &mut Vec<MessageRecord>, record: MessageRecord) {
    let at = records.partition_point(|r| order_key(r) <= order_key(&record));
    records.insert(at, record);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(id: &str, millis: i64) -> MessageRecord {
        MessageRecord {
            id: id.to_string(),
            user_name: "Ana".to_string(),
            message: "hi".to_string(),
            image_url: "/uploads/a.png".to_string(),
            image_key: "a.png".to_string(),
            created_at: Utc.timestamp_millis_opt(millis).unwrap(),
        }
    }

    #[test]
    fn test_insert_ordered_follows_creation_time() {
        let mut records = Vec::new();
        insert_ordered(&mut records, record("b", 20));
        insert_ordered(&mut records, record("a", 10));
        insert_ordered(&mut records, record("d", 20));
        insert_ordered(&mut records, record("c", 20));

        let ids: Vec<_> = newest_first(&records, None)
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, ["d", "c", "b", "a"]);
    }
}
