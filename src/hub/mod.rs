mod connection;
mod handlers;
mod ingest;
mod server;
mod stats;
#[cfg(test)]
mod tests;

pub use handlers::ApiResponse;
pub use ingest::{Ack, IngestionHub, DEFAULT_FORCE, RECENT_MESSAGES_LIMIT};
pub use server::{HubServer, HubServerBuilder, HubState};
pub use stats::{HubStats, HubStatsSnapshot};
