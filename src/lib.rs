pub mod app;
pub mod config;
pub mod error;
pub mod events;
pub mod gesture;
pub mod hub;
pub mod layout;
pub mod logging;
pub mod persistence;
pub mod protocol;
pub mod storage;
pub mod transport;

pub use app::{ComponentState, HubOrchestrator, ShutdownReason};
pub use config::SlingshotConfig;
pub use error::{Result, SlingshotError};
pub use events::{EventBus, EventFilter, EventReceiver, SlingshotEvent};
pub use gesture::{GestureClassifier, GestureState, MotionSample, ShotContent, ShotEvent};
pub use hub::{HubServer, HubServerBuilder, IngestionHub};
pub use layout::{DisplaySlot, LayoutAllocator, Placement};
pub use persistence::{MessageRecord, MessageStore};
pub use protocol::{ClientMessage, ServerMessage};
pub use storage::{ImageStore, StorageChain};
pub use transport::{ReconnectPolicy, TransportSession, TransportState};
