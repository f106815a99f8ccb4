use super::local::LocalDiskStore;
use super::payload::ImagePayload;
use super::{ImageStore, StoredImage};
use crate::config::{ServerConfig, StorageConfig};
use crate::error::StorageError;
use crate::events::{EventBus, SlingshotEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Ordered list of storage backends; each upload tries them in turn
pub struct StorageChain {
    stores: Vec<Arc<dyn ImageStore>>,
    fallbacks: AtomicU64,
    event_bus: Option<EventBus>,
}

impl StorageChain {
    pub fn new(stores: Vec<Arc<dyn ImageStore>>) -> Self {
        Self {
            stores,
            fallbacks: AtomicU64::new(0),
            event_bus: None,
        }
    }

    /// Build the chain from configuration: object storage first when it is
    /// fully configured, local disk always last.
    pub fn from_config(storage: &StorageConfig, server: &ServerConfig) -> Self {
        let mut stores: Vec<Arc<dyn ImageStore>> = Vec::new();

        match &storage.object {
            Some(object) if object.is_complete() => Self::push_object_store(&mut stores, object),
            Some(_) => {
                info!("Object storage settings are incomplete, using local disk only");
            }
            None => {}
        }

        stores.push(Arc::new(LocalDiskStore::new(
            &storage.local_path,
            server.public_base_url.as_deref(),
        )));

        let chain = Self::new(stores);
        info!("Storage chain: {}", chain.backend_names().join(" -> "));
        chain
    }

    #[cfg(feature = "object_storage")]
    fn push_object_store(
        stores: &mut Vec<Arc<dyn ImageStore>>,
        object: &crate::config::ObjectStorageConfig,
    ) {
        match super::ObjectStore::new(object.clone()) {
            Ok(store) => stores.push(Arc::new(store)),
            Err(e) => warn!("Object storage disabled: {}", e),
        }
    }

    #[cfg(not(feature = "object_storage"))]
    fn push_object_store(
        _stores: &mut Vec<Arc<dyn ImageStore>>,
        _object: &crate::config::ObjectStorageConfig,
    ) {
        warn!("Object storage is configured but this build lacks the object_storage feature");
    }

    /// Report fallbacks on the event bus
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Upload through the chain. A failing backend hands over to the next one;
    /// only the failure of the last backend is returned.
    pub async fn upload(
        &self,
        image: &ImagePayload,
        owner: &str,
    ) -> Result<StoredImage, StorageError> {
        let mut last_error = None;

        for (index, store) in self.stores.iter().enumerate() {
            match store.upload(image, owner).await {
                Ok(stored) => return Ok(stored),
                Err(e) => {
                    if let Some(next) = self.stores.get(index + 1) {
                        warn!(
                            "Upload to {} failed, falling back to {}: {}",
                            store.name(),
                            next.name(),
                            e
                        );
                        self.fallbacks.fetch_add(1, Ordering::Relaxed);
                        self.report_fallback(store.name(), next.name(), &e);
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(e) => StorageError::AllBackendsFailed {
                last: e.to_string(),
            },
            None => StorageError::NotConfigured {
                backend: "any".to_string(),
            },
        })
    }

    /// Best-effort removal of an image whose record never committed
    pub async fn discard(&self, image: &StoredImage) {
        let Some(store) = self.stores.iter().find(|s| s.name() == image.backend) else {
            warn!("No backend named {} to discard {}", image.backend, image.key);
            return;
        };

        match store.delete(&image.key).await {
            Ok(()) => info!("Discarded orphaned image {}", image.key),
            Err(e) => warn!("Failed to discard orphaned image {}: {}", image.key, e),
        }
    }

    /// Number of uploads that fell through to a later backend
    pub fn fallback_count(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }

    pub fn backend_names(&self) -> Vec<String> {
        self.stores.iter().map(|s| s.name().to_string()).collect()
    }

    fn report_fallback(&self, from: &str, to: &str, error: &StorageError) {
        if let Some(event_bus) = &self.event_bus {
            // Nobody listening is fine
            let _ = event_bus.publish(SlingshotEvent::StorageFallback {
                from: from.to_string(),
                to: to.to_string(),
                reason: error.to_string(),
            });
        }
    }
}
