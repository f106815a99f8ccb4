use super::payload::{build_key, ImagePayload};
use super::{ImageStore, StoredImage};
use crate::error::StorageError;
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Stores images under a directory that the hub serves at `/uploads`
pub struct LocalDiskStore {
    root: PathBuf,
    url_prefix: String,
}

impl LocalDiskStore {
    pub const NAME: &'static str = "local";

    pub fn new<P: Into<PathBuf>>(root: P, public_base_url: Option<&str>) -> Self {
        let url_prefix = match public_base_url {
            Some(base) => format!("{}/uploads", base.trim_end_matches('/')),
            None => "/uploads".to_string(),
        };
        Self {
            root: root.into(),
            url_prefix,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the storage directory if needed
    pub async fn ensure_root(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|source| StorageError::Io {
                path: self.root.display().to_string(),
                source,
            })
    }

    pub fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.url_prefix, key)
    }
}

#[async_trait]
impl ImageStore for LocalDiskStore {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn upload(&self, image: &ImagePayload, owner: &str) -> Result<StoredImage, StorageError> {
        self.ensure_root().await?;

        let key = build_key(owner, &image.extension, Utc::now().timestamp_millis());
        let path = self.root.join(&key);

        fs::write(&path, &image.bytes)
            .await
            .map_err(|source| StorageError::Io {
                path: path.display().to_string(),
                source,
            })?;

        info!("Stored image {} ({} bytes) on local disk", key, image.len());

        Ok(StoredImage {
            url: self.url_for(&key),
            key,
            backend: Self::NAME.to_string(),
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        if key.contains('/') || key.contains('\\') || key.starts_with('.') {
            return Err(StorageError::Io {
                path: key.to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "refusing to delete outside the storage directory",
                ),
            });
        }

        let path = self.root.join(key);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted local image {}", key);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }
}
