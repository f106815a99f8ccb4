use super::orchestrator::{PERSISTENCE, SERVER, STORAGE};
use super::{ComponentState, HubOrchestrator};
use crate::error::{Result, SlingshotError};
use tracing::{error, info};

impl HubOrchestrator {
    /// Prepare directories and register components
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing hub components");

        for component in [STORAGE, PERSISTENCE, SERVER] {
            self.set_component_state(component, ComponentState::Stopped);
        }

        self.set_component_state(STORAGE, ComponentState::Starting);
        if let Err(e) = tokio::fs::create_dir_all(&self.config.storage.local_path).await {
            self.set_component_state(STORAGE, ComponentState::Failed);
            error!(
                "Cannot create upload directory {}: {}",
                self.config.storage.local_path, e
            );
            return Err(e.into());
        }
        self.set_component_state(STORAGE, ComponentState::Running);
        self.set_component_state(PERSISTENCE, ComponentState::Running);

        info!("All components initialized successfully");
        Ok(())
    }

    /// Bind the server and start serving in the background
    pub async fn start(&mut self) -> Result<()> {
        let server = self
            .server
            .take()
            .ok_or_else(|| SlingshotError::system("Hub server already started"))?;

        self.set_component_state(SERVER, ComponentState::Starting);
        let (addr, handle) = server.spawn().await.map_err(|e| {
            self.set_component_state(SERVER, ComponentState::Failed);
            error!("Failed to start hub server: {}", e);
            e
        })?;

        self.local_addr = Some(addr);
        self.server_handle = Some(handle);
        self.set_component_state(SERVER, ComponentState::Running);
        info!("Slingshot hub started on {}", addr);
        Ok(())
    }
}
