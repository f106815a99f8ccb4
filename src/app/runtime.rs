use super::{HubOrchestrator, ShutdownReason};
use crate::error::{Result, SlingshotError};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{info, warn};

impl HubOrchestrator {
    /// Run until a signal or request arrives, then shut down gracefully
    pub async fn run(&mut self) -> Result<i32> {
        info!("Slingshot hub is running");

        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| SlingshotError::system("Shutdown receiver already taken"))?;

        setup_signal_handlers(Arc::clone(&self.shutdown_sender));

        let reason = shutdown_receiver
            .await
            .map_err(|_| SlingshotError::system("Shutdown channel closed unexpectedly"))?;

        info!("Shutdown initiated: {}", reason);
        let exit_code = self.shutdown(reason).await?;

        info!("Slingshot hub shutdown complete");
        Ok(exit_code)
    }
}

fn deliver(sender: &Mutex<Option<oneshot::Sender<ShutdownReason>>>, signal: &str) {
    if let Some(sender) = sender.lock().take() {
        let _ = sender.send(ShutdownReason::Signal(signal.to_string()));
    }
}

fn setup_signal_handlers(sender: Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>) {
    // SIGTERM (systemd stop)
    #[cfg(unix)]
    {
        let sender = Arc::clone(&sender);
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    if sigterm.recv().await.is_some() {
                        info!("Received SIGTERM signal");
                        deliver(&sender, "SIGTERM");
                    }
                }
                Err(e) => warn!("Failed to register SIGTERM handler: {}", e),
            }
        });
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received SIGINT signal (Ctrl+C)");
            deliver(&sender, "SIGINT");
        }
    });
}
