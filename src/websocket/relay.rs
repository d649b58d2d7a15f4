use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::models::{ReceivedMessage, SendMessage};
use crate::websocket::msg_awareness_handler::handle_awareness_message;
use crate::websocket::msg_update_handler::handle_update_message;
use crate::ws::{ConnCtx, RelayError, RoomRegistry};
#[cfg(test)]
use crate::ws::Room;

/// Aggregate counts across all rooms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub rooms: usize,
    pub connections: usize,
    pub awareness_states: usize,
}

/// Binds connections to rooms and relays their messages.
///
/// Every transport event takes the registry lock once and runs to
/// completion without awaiting, so room creation, CRDT application and
/// fan-out for one event are never interleaved with another event.
#[derive(Clone, Default)]
pub struct CollabRelay {
    registry: Arc<Mutex<RoomRegistry>>,
}

impl CollabRelay {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, RoomRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach `conn` to the room for its document and queue the initial
    /// sync (document snapshot, then presence snapshot if any).
    pub fn connect(&self, conn: &ConnCtx) {
        let mut registry = self.registry();
        let room = registry.get_or_create_room(&conn.doc_id);
        room.add_connection(conn.clone());

        conn.send(SendMessage::sync(room.document_snapshot()));
        match room.awareness_snapshot() {
            Ok(Some(snapshot)) => conn.send(SendMessage::awareness(snapshot)),
            Ok(None) => {}
            Err(e) => warn!("Failed to encode awareness snapshot for {}: {}", conn.doc_id, e),
        }

        info!(
            "Connection {} joined document {} ({} connected)",
            conn.id,
            conn.doc_id,
            room.connection_count()
        );
    }

    /// Handle one text frame from `conn`.
    pub fn handle_text(&self, conn: &ConnCtx, text: &str) {
        let mut registry = self.registry();
        let room = match registry.get_room_mut(&conn.doc_id) {
            Some(room) if room.has_connection(conn.id) => room,
            _ => {
                debug!(
                    "Ignoring message from detached connection {} for document {}",
                    conn.id, conn.doc_id
                );
                return;
            }
        };

        let result = ReceivedMessage::parse(text).and_then(|msg| match msg {
            ReceivedMessage::Update(update_msg) => handle_update_message(update_msg, room, conn),
            ReceivedMessage::Awareness(awareness_msg) => {
                handle_awareness_message(awareness_msg, room, conn)
            }
        });

        if let Err(e) = result {
            Self::reject(conn, e);
        }
    }

    /// Report a rejected message to its sender only.
    pub fn reject(conn: &ConnCtx, err: RelayError) {
        warn!(
            "Rejected message from {} for document {}: {}",
            conn.id, conn.doc_id, err
        );
        conn.send(SendMessage::error(err.to_string()));
    }

    /// Detach `conn`: drop the presence entries it owns (telling the
    /// remaining connections), remove it from its room and release the room
    /// if it is now empty. Safe to call for a connection already gone.
    pub fn disconnect(&self, conn: &ConnCtx) {
        let mut registry = self.registry();
        let Some(room) = registry.get_room_mut(&conn.doc_id) else {
            debug!(
                "Disconnect for {} after document {} was released",
                conn.id, conn.doc_id
            );
            return;
        };

        if let Some(removal) = room.release_awareness(conn.id, "disconnect") {
            room.broadcast(conn.id, &SendMessage::awareness(removal));
        }
        if room.remove_connection(conn.id) {
            info!(
                "Connection {} left document {} ({} connected)",
                conn.id,
                conn.doc_id,
                room.connection_count()
            );
        }

        registry.release_if_empty(&conn.doc_id);
    }

    pub fn room_count(&self) -> usize {
        self.registry().room_count()
    }

    pub fn connection_count(&self) -> usize {
        self.registry().connection_count()
    }

    pub fn stats(&self) -> RelayStats {
        let registry = self.registry();
        RelayStats {
            rooms: registry.room_count(),
            connections: registry.connection_count(),
            awareness_states: registry.awareness_count(),
        }
    }

    /// Run `f` against the room for `doc_id`, if it exists.
    #[cfg(test)]
    pub fn with_room<R>(&self, doc_id: &str, f: impl FnOnce(&Room) -> R) -> Option<R> {
        self.registry().get_room(doc_id).map(f)
    }
}
