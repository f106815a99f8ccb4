use super::types::{ComponentState, ShutdownReason};
use crate::config::SlingshotConfig;
use crate::error::Result;
use crate::events::EventBus;
use crate::hub::{HubServer, HubServerBuilder, IngestionHub};
use crate::persistence::open_store;
use crate::storage::StorageChain;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub(super) const STORAGE: &str = "storage";
pub(super) const PERSISTENCE: &str = "persistence";
pub(super) const SERVER: &str = "server";

/// Wires configuration into the hub components and owns their lifecycle
pub struct HubOrchestrator {
    pub(super) config: SlingshotConfig,
    pub(super) event_bus: EventBus,
    pub(super) hub: Arc<IngestionHub>,

    // Taken by `start`
    pub(super) server: Option<HubServer>,
    pub(super) server_handle: Option<JoinHandle<Result<()>>>,
    pub(super) local_addr: Option<SocketAddr>,

    // Lifecycle management
    pub(super) component_states: Arc<RwLock<HashMap<String, ComponentState>>>,
    pub(super) shutdown_sender: Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl HubOrchestrator {
    /// Build every component from configuration without binding anything
    pub async fn new(config: SlingshotConfig) -> Result<Self> {
        let capacity = config.system.event_bus_capacity;
        let event_bus = if tracing::enabled!(tracing::Level::DEBUG) {
            EventBus::with_debug_logging(capacity)
        } else {
            EventBus::new(capacity)
        };
        let cancellation_token = CancellationToken::new();
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        let storage = Arc::new(
            StorageChain::from_config(&config.storage, &config.server)
                .with_event_bus(event_bus.clone()),
        );
        let store = open_store(&config.persistence).await?;
        let hub = Arc::new(IngestionHub::new(storage, store, event_bus.clone()));

        let server = HubServerBuilder::new()
            .config(config.server.clone())
            .hub(Arc::clone(&hub))
            .upload_dir(&config.storage.local_path)
            .shutdown(cancellation_token.clone())
            .build()?;

        info!("Hub components created");

        Ok(Self {
            config,
            event_bus,
            hub,
            server: Some(server),
            server_handle: None,
            local_addr: None,
            component_states: Arc::new(RwLock::new(HashMap::new())),
            shutdown_sender: Arc::new(Mutex::new(Some(shutdown_sender))),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token,
        })
    }

    pub fn config(&self) -> &SlingshotConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn hub(&self) -> &Arc<IngestionHub> {
        &self.hub
    }

    /// Address the server is listening on once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Ask a running orchestrator to shut down; false if already requested
    pub fn request_shutdown(&self, reason: ShutdownReason) -> bool {
        match self.shutdown_sender.lock().take() {
            Some(sender) => sender.send(reason).is_ok(),
            None => false,
        }
    }
}
