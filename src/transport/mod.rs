//! Client side of the hub websocket, shared by senders and displays.

mod reconnect;
mod session;

pub use reconnect::ReconnectPolicy;
pub use session::{TransportSession, TransportState};
