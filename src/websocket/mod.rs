//! Connection multiplexer: binds each WebSocket to its room and relays
//! document and awareness updates between the room's connections.

pub mod handler;
pub mod msg_awareness_handler;
pub mod msg_update_handler;
pub mod relay;

pub use handler::websocket_handler;
pub use relay::{CollabRelay, RelayStats};
