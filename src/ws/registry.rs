use std::collections::HashMap;
use tracing::info;

use super::room::Room;

/// Rooms by document id. Starts empty; a room is created on first access and
/// dropped once its last connection has gone.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: HashMap<String, Room>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing room for `id`, or a fresh one with an empty document and
    /// presence table. Lookup and insertion happen in one step, so two
    /// callers for the same id always get the same room.
    pub fn get_or_create_room(&mut self, id: &str) -> &mut Room {
        self.rooms.entry(id.to_string()).or_insert_with(|| {
            info!("Creating room for document {}", id);
            Room::new(id)
        })
    }

    #[cfg(test)]
    pub fn get_room(&self, id: &str) -> Option<&Room> {
        self.rooms.get(id)
    }

    pub fn get_room_mut(&mut self, id: &str) -> Option<&mut Room> {
        self.rooms.get_mut(id)
    }

    /// Drop the room for `id` if it has no connections left. Returns whether
    /// a room was released.
    pub fn release_if_empty(&mut self, id: &str) -> bool {
        match self.rooms.get(id) {
            Some(room) if room.is_empty() => {
                self.rooms.remove(id);
                info!("Released room for document {}", id);
                true
            }
            _ => false,
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn connection_count(&self) -> usize {
        self.rooms.values().map(Room::connection_count).sum()
    }

    pub fn awareness_count(&self) -> usize {
        self.rooms.values().map(|room| room.awareness_clients().len()).sum()
    }
}
