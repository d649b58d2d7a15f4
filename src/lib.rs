//! Real-time collaboration relay.
//!
//! Clients connect to `/collab/:doc_id` and exchange Yjs document updates
//! and awareness (presence) updates. Each document id maps to one room
//! holding the merged document, the presence table and the connections
//! attached to it; rooms are created on first connect and dropped when the
//! last connection leaves.

pub mod config;
pub mod docs;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod websocket;
pub mod ws;

use std::sync::Arc;

use config::Config;
use websocket::CollabRelay;

pub use routes::create_app;

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub relay: CollabRelay,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            relay: CollabRelay::new(),
            config: Arc::new(config),
        }
    }
}
