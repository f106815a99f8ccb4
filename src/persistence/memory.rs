use super::{insert_ordered, newest_first, MessageRecord, MessageStore, NewMessage};
use crate::error::PersistenceError;
use async_trait::async_trait;
use parking_lot::RwLock;

/// Volatile store for tests and ephemeral runs
#[derive(Default)]
pub struct MemoryMessageStore {
    records: RwLock<Vec<MessageRecord>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn insert(&self, new: NewMessage) -> Result<MessageRecord, PersistenceError> {
        let record = MessageRecord::from_new(new);
        insert_ordered(&mut self.records.write(), record.clone());
        Ok(record)
    }

    async fn get(&self, id: &str) -> Result<MessageRecord, PersistenceError> {
        self.records
            .read()
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound { id: id.to_string() })
    }

    async fn list(&self, limit: Option<usize>) -> Result<Vec<MessageRecord>, PersistenceError> {
        Ok(newest_first(&self.records.read(), limit))
    }

    async fn delete(&self, id: &str) -> Result<MessageRecord, PersistenceError> {
        let mut records = self.records.write();
        let position = records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| PersistenceError::NotFound { id: id.to_string() })?;
        Ok(records.remove(position))
    }

    async fn count(&self) -> Result<usize, PersistenceError> {
        Ok(self.records.read().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_message(name: &str) -> NewMessage {
        NewMessage {
            user_name: name.to_string(),
            message: "hello".to_string(),
            image_url: "/uploads/a.png".to_string(),
            image_key: "a.png".to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_list_delete() {
        let store = MemoryMessageStore::new();
        let first = store.insert(new_message("first")).await.unwrap();
        let second = store.insert(new_message("second")).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(first.id.len(), 32);

        let listed = store.list(None).await.unwrap();
        assert_eq!(listed[0].user_name, "second");
        assert_eq!(listed[1].user_name, "first");
        assert_eq!(store.list(Some(1)).await.unwrap().len(), 1);

        assert_eq!(store.get(&first.id).await.unwrap(), first);
        store.delete(&first.id).await.unwrap();
        assert!(matches!(
            store.get(&first.id).await,
            Err(PersistenceError::NotFound { .. })
        ));
        assert_eq!(store.count().await.unwrap(), 1);
    }
}
