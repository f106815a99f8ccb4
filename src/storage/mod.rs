//! Image storage backends and the ordered fallback chain that fronts them.

mod chain;
mod local;
#[cfg(feature = "object_storage")]
mod object;
mod payload;


pub use chain::StorageChain;
pub use local::LocalDiskStore;
#[cfg(feature = "object_storage")]
pub use object::ObjectStore;
pub use payload::{build_key, ImagePayload};

use crate::error::StorageError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Where an uploaded image ended up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredImage {
    pub url: String,
    pub key: String,
    /// Name of the backend holding the image
    pub backend: String,
}

/// Uniform upload strategy implemented by every backend
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Stable backend name, recorded in [`StoredImage::backend`]
    fn name(&self) -> &str;

    /// Store an image on behalf of `owner`
    async fn upload(&self, image: &ImagePayload, owner: &str) -> Result<StoredImage, StorageError>;

    /// Remove a previously stored image
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}
