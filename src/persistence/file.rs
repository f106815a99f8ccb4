use super::{insert_ordered, newest_first, order_key, MessageRecord, MessageStore, NewMessage};
use crate::error::PersistenceError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// One JSON document per record under a directory, indexed in memory
pub struct FileMessageStore {
    root: PathBuf,
    index: RwLock<Vec<MessageRecord>>,
    write_lock: Mutex<()>,
}

fn io_error(path: &Path, source: std::io::Error) -> PersistenceError {
    PersistenceError::Io {
        path: path.display().to_string(),
        source,
    }
}

impl FileMessageStore {
    /// Open (creating if needed) a store rooted at `root` and load existing records
    pub async fn open<P: AsRef<Path>>(root: P) -> Result<Self, PersistenceError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| io_error(&root, e))?;

        let mut records = Vec::new();
        let mut entries = fs::read_dir(&root).await.map_err(|e| io_error(&root, e))?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(&root, e))? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            match Self::read_record(&path).await {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping unreadable record {}: {}", path.display(), e),
            }
        }

        records.sort_by(|a, b| order_key(a).cmp(&order_key(b)));
        info!(
            "Opened message store at {} with {} records",
            root.display(),
            records.len()
        );

        Ok(Self {
            root,
            index: RwLock::new(records),
            write_lock: Mutex::new(()),
        })
    }

    async fn read_record(path: &Path) -> Result<MessageRecord, PersistenceError> {
        let bytes = fs::read(path).await.map_err(|e| io_error(path, e))?;
        serde_json::from_slice(&bytes).map_err(|e| PersistenceError::Serialization {
            details: e.to_string(),
        })
    }

    fn record_path(&self, id: &str) -> Result<PathBuf, PersistenceError> {
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(PersistenceError::NotFound { id: id.to_string() });
        }
        Ok(self.root.join(format!("{}.json", id)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl MessageStore for FileMessageStore {
    async fn insert(&self, new: NewMessage) -> Result<MessageRecord, PersistenceError> {
        // Stamped under the lock so creation time follows commit order
        let _guard = self.write_lock.lock().await;
        let record = MessageRecord::from_new(new);
        let path = self.record_path(&record.id)?;
        let temp_path = path.with_extension("json.tmp");

        let document =
            serde_json::to_vec_pretty(&record).map_err(|e| PersistenceError::Serialization {
                details: e.to_string(),
            })?;

        fs::write(&temp_path, &document)
            .await
            .map_err(|e| io_error(&temp_path, e))?;
        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(io_error(&path, e));
        }

        insert_ordered(&mut self.index.write(), record.clone());
        debug!("Persisted message record {}", record.id);
        Ok(record)
    }

    async fn get(&self, id: &str) -> Result<MessageRecord, PersistenceError> {
        self.index
            .read()
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound { id: id.to_string() })
    }

    async fn list(&self, limit: Option<usize>) -> Result<Vec<MessageRecord>, PersistenceError> {
        Ok(newest_first(&self.index.read(), limit))
    }

    async fn delete(&self, id: &str) -> Result<MessageRecord, PersistenceError> {
        let path = self.record_path(id)?;
        let _guard = self.write_lock.lock().await;

        let exists = self.index.read().iter().any(|r| r.id == id);
        if !exists {
            return Err(PersistenceError::NotFound { id: id.to_string() });
        }

        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_error(&path, e)),
        }

        let mut index = self.index.write();
        let position = index
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| PersistenceError::NotFound { id: id.to_string() })?;
        info!("Deleted message record {}", id);
        Ok(index.remove(position))
    }

    async fn count(&self) -> Result<usize, PersistenceError> {
        Ok(self.index.read().len())
    }
}
