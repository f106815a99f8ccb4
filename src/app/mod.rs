mod orchestrator;
mod runtime;
mod shutdown;
mod startup;
mod state;
mod types;


pub use orchestrator::HubOrchestrator;
pub use types::{ComponentState, ShutdownReason};
