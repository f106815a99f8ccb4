use thiserror::Error;

#[derive(Error, Debug)]
pub enum SlingshotError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Gesture error: {0}")]
    Gesture(#[from] GestureError),

    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    #[error("System error: {message}")]
    System { message: String },
}

impl SlingshotError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }
}

/// Conditions raised by the gesture classifier
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GestureError {
    #[error("Motion sensor is not available on this device")]
    SensorUnavailable,

    #[error("Motion source failed: {details}")]
    Source { details: String },
}

/// Per-request failures of the ingestion hub
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Invalid submission: {reason}")]
    Validation { reason: String },

    #[error("Image storage failed: {0}")]
    Storage(#[source] StorageError),

    #[error("Message persistence failed: {0}")]
    Persistence(#[source] PersistenceError),
}

impl IngestError {
    pub fn validation<S: Into<String>>(reason: S) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Reason sent back to the originating client in an `error` event
    pub fn user_message(&self) -> String {
        match self {
            IngestError::Validation { reason } => reason.clone(),
            IngestError::Storage(_) => "Failed to store image".to_string(),
            IngestError::Persistence(_) => "Failed to save message".to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Image payload could not be decoded: {details}")]
    Decode { details: String },

    #[error("Failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Upload to {backend} failed: {details}")]
    Upload { backend: String, details: String },

    #[error("Storage backend {backend} is not configured")]
    NotConfigured { backend: String },

    #[error("All storage backends failed, last error: {last}")]
    AllBackendsFailed { last: String },
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Record store IO failed at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Record serialization failed: {details}")]
    Serialization { details: String },

    #[error("Record {id} not found")]
    NotFound { id: String },

    #[error("Record store unavailable: {details}")]
    Unavailable { details: String },
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to connect to {url}: {details}")]
    Connect { url: String, details: String },

    #[error("Transport is not connected")]
    NotConnected,

    #[error("Transport session closed")]
    Closed,

    #[error("Gave up reconnecting after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("Frame codec error: {details}")]
    Codec { details: String },
}

#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("No subscribers for event")]
    NoSubscribers,

    #[error("Event bus channel closed")]
    ChannelClosed,
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server startup failed: {details}")]
    StartupFailed { details: String },
}

pub type Result<T> = std::result::Result<T, SlingshotError>;
