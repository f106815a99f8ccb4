use super::orchestrator::{PERSISTENCE, SERVER, STORAGE};
use super::{ComponentState, HubOrchestrator, ShutdownReason};
use crate::error::Result;
use crate::events::SlingshotEvent;
use std::time::{Duration, SystemTime};
use tokio::time::timeout;
use tracing::{error, info};

const SERVER_STOP_TIMEOUT: Duration = Duration::from_secs(10);

impl HubOrchestrator {
    /// Stop the server and close every websocket; returns the exit code
    pub async fn shutdown(&mut self, reason: ShutdownReason) -> Result<i32> {
        info!("Beginning graceful shutdown");

        let _ = self.event_bus.publish(SlingshotEvent::ShutdownRequested {
            timestamp: SystemTime::now(),
            reason: reason.to_string(),
        });
        self.cancellation_token.cancel();

        let mut exit_code = match reason {
            ShutdownReason::Error(_) => 1,
            _ => 0,
        };

        if let Some(handle) = self.server_handle.take() {
            self.set_component_state(SERVER, ComponentState::Stopping);
            match timeout(SERVER_STOP_TIMEOUT, handle).await {
                Ok(Ok(Ok(()))) => {
                    self.set_component_state(SERVER, ComponentState::Stopped);
                    info!("Hub server stopped");
                }
                Ok(Ok(Err(e))) => {
                    self.set_component_state(SERVER, ComponentState::Failed);
                    error!("Hub server ended with error: {}", e);
                    exit_code = 1;
                }
                Ok(Err(e)) => {
                    self.set_component_state(SERVER, ComponentState::Failed);
                    error!("Hub server task panicked: {}", e);
                    exit_code = 1;
                }
                Err(_) => {
                    self.set_component_state(SERVER, ComponentState::Failed);
                    error!("Hub server stop timeout");
                    exit_code = 1;
                }
            }
        } else {
            self.set_component_state(SERVER, ComponentState::Stopped);
        }

        // Records are written synchronously per request; nothing to flush
        for component in [PERSISTENCE, STORAGE] {
            self.set_component_state(component, ComponentState::Stopped);
        }

        let stats = self.hub.stats();
        info!(
            "Graceful shutdown completed with exit code {} ({} shots, {} messages, {} rejected)",
            exit_code, stats.shots_ingested, stats.messages_ingested, stats.submissions_rejected
        );
        Ok(exit_code)
    }
}
