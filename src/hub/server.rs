use super::handlers::{
    delete_message_handler, get_message_handler, health_handler, list_messages_handler,
    ws_handler,
};
use super::ingest::IngestionHub;
use crate::config::ServerConfig;
use crate::error::{Result, ServerError, SlingshotError};
use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::info;

/// Shared state for the Axum server
#[derive(Clone)]
pub struct HubState {
    pub(crate) hub: Arc<IngestionHub>,
    pub(crate) max_message_bytes: usize,
    pub(crate) shutdown: CancellationToken,
}

/// HTTP server hosting the event websocket, the REST surface and uploads
pub struct HubServer {
    pub(crate) config: ServerConfig,
    pub(crate) hub: Arc<IngestionHub>,
    pub(crate) upload_dir: PathBuf,
    pub(crate) shutdown: CancellationToken,
}

impl HubServer {
    pub fn new(
        config: ServerConfig,
        hub: Arc<IngestionHub>,
        upload_dir: PathBuf,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            hub,
            upload_dir,
            shutdown,
        }
    }

    /// Build the application router
    pub fn router(&self) -> Router {
        let state = HubState {
            hub: Arc::clone(&self.hub),
            max_message_bytes: self.config.max_message_bytes,
            shutdown: self.shutdown.clone(),
        };

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/api/messages", get(list_messages_handler))
            .route(
                "/api/messages/:id",
                get(get_message_handler).delete(delete_message_handler),
            )
            .route("/health", get(health_handler))
            .nest_service("/uploads", ServeDir::new(&self.upload_dir))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind the configured address; port 0 picks a free port
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = format!("{}:{}", self.config.ip, self.config.port);

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::BindFailed {
                address: addr.clone(),
                source: e,
            })?;

        if let Ok(local) = listener.local_addr() {
            info!("Hub listening on {}", local);
        }
        Ok(listener)
    }

    /// Serve on an already bound listener until the shutdown token fires
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let app = self.router();
        let shutdown = self.shutdown.clone();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| ServerError::StartupFailed {
                details: format!("Server error: {}", e),
            })?;

        info!("Hub server stopped");
        Ok(())
    }

    /// Bind and serve
    pub async fn start(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Bind, then serve in a background task; returns the bound address
    pub async fn spawn(self) -> Result<(SocketAddr, tokio::task::JoinHandle<Result<()>>)> {
        let listener = self.bind().await?;
        let addr = listener.local_addr().map_err(|e| ServerError::StartupFailed {
            details: format!("No local address: {}", e),
        })?;
        let handle = tokio::spawn(async move { self.serve(listener).await });
        Ok((addr, handle))
    }
}

/// Hub server builder for configuration
#[derive(Default)]
pub struct HubServerBuilder {
    config: Option<ServerConfig>,
    hub: Option<Arc<IngestionHub>>,
    upload_dir: Option<PathBuf>,
    shutdown: Option<CancellationToken>,
}

impl HubServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server configuration
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the ingestion hub
    pub fn hub(mut self, hub: Arc<IngestionHub>) -> Self {
        self.hub = Some(hub);
        self
    }

    /// Directory served under /uploads
    pub fn upload_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.upload_dir = Some(dir.into());
        self
    }

    /// Token that stops the server and closes every websocket
    pub fn shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    /// Build the hub server
    pub fn build(self) -> Result<HubServer> {
        let config = self.config.ok_or_else(|| {
            SlingshotError::Server(ServerError::StartupFailed {
                details: "Server configuration is required".to_string(),
            })
        })?;

        let hub = self.hub.ok_or_else(|| {
            SlingshotError::Server(ServerError::StartupFailed {
                details: "Ingestion hub is required".to_string(),
            })
        })?;

        let upload_dir = self.upload_dir.ok_or_else(|| {
            SlingshotError::Server(ServerError::StartupFailed {
                details: "Upload directory is required".to_string(),
            })
        })?;

        Ok(HubServer::new(
            config,
            hub,
            upload_dir,
            self.shutdown.unwrap_or_default(),
        ))
    }
}
