use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};
use yrs::sync::awareness::{Awareness, AwarenessUpdateSummary};
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Doc, ReadTxn, StateVector, Transact, Update};

use super::awareness::{decode_update, present_clients, AwarenessError, ClientId};
use super::connctx::{ConnCtx, ConnectionId};
use super::error::RelayError;
use crate::models::SendMessage;

/// Session state for one document id.
///
/// The presence table owns the room's document. Connections are handles
/// only; their sockets live with the connection task.
pub struct Room {
    id: String,
    awareness: Awareness,
    connections: HashMap<ConnectionId, ConnCtx>,
    /// Presence entries each connection introduced, for cleanup on disconnect.
    owned_awareness: HashMap<ConnectionId, BTreeSet<ClientId>>,
}

impl Room {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            awareness: Awareness::new(Doc::new()),
            connections: HashMap::new(),
            owned_awareness: HashMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn add_connection(&mut self, conn: ConnCtx) {
        self.connections.insert(conn.id, conn);
    }

    pub fn remove_connection(&mut self, conn_id: ConnectionId) -> bool {
        self.owned_awareness.remove(&conn_id);
        self.connections.remove(&conn_id).is_some()
    }

    pub fn has_connection(&self, conn_id: ConnectionId) -> bool {
        self.connections.contains_key(&conn_id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Full document state as a v1 update.
    pub fn document_snapshot(&self) -> Vec<u8> {
        self.awareness
            .doc()
            .transact()
            .encode_state_as_update_v1(&StateVector::default())
    }

    /// Decode and merge a v1 document update. Nothing is applied when the
    /// payload does not decode.
    pub fn apply_document_update(
        &mut self,
        conn_id: ConnectionId,
        update: &[u8],
    ) -> Result<(), RelayError> {
        let update =
            Update::decode_v1(update).map_err(|e| RelayError::DocumentUpdate(e.to_string()))?;
        let mut txn = self.awareness.doc().transact_mut_with(conn_id.origin());
        txn.apply_update(update)
            .map_err(|e| RelayError::DocumentUpdate(e.to_string()))
    }

    /// Clients with a presence state, in ascending order.
    pub fn awareness_clients(&self) -> Vec<ClientId> {
        present_clients(&self.awareness)
    }

    /// Encoded update carrying every present client, or `None` when nobody
    /// has published a state.
    pub fn awareness_snapshot(&self) -> Result<Option<Vec<u8>>, RelayError> {
        let ids = self.awareness_clients();
        if ids.is_empty() {
            return Ok(None);
        }
        let update = self
            .awareness
            .update_with_clients(ids)
            .map_err(AwarenessError::from)?;
        Ok(Some(update.encode_v1()))
    }

    /// Merge an awareness update sent by `conn_id` and fold the resulting
    /// summary into that connection's owned set. `None` means the update
    /// changed nothing.
    pub fn apply_awareness_update(
        &mut self,
        conn_id: ConnectionId,
        update: &[u8],
    ) -> Result<Option<AwarenessUpdateSummary>, RelayError> {
        let update = decode_update(update)?;
        let summary = self
            .awareness
            .apply_update_summary_with(update, conn_id.origin())
            .map_err(AwarenessError::from)?;
        if let Some(summary) = &summary {
            self.track_awareness(conn_id, summary);
        }
        Ok(summary)
    }

    fn track_awareness(&mut self, conn_id: ConnectionId, summary: &AwarenessUpdateSummary) {
        // Added and updated entries always carry a state
        let owned = self.owned_awareness.entry(conn_id).or_default();
        owned.extend(summary.added.iter().chain(&summary.updated).copied());
        self.forget_clients(&summary.removed);
    }

    /// Drop `ids` from every connection's owned set.
    fn forget_clients(&mut self, ids: &[ClientId]) {
        if !ids.is_empty() {
            for owned in self.owned_awareness.values_mut() {
                owned.retain(|id| !ids.contains(id));
            }
        }
        self.owned_awareness.retain(|_, owned| !owned.is_empty());
    }

    #[cfg(test)]
    pub fn owned_clients(&self, conn_id: ConnectionId) -> Vec<ClientId> {
        self.owned_awareness
            .get(&conn_id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Forget everything `conn_id` owns and clear those entries from the
    /// presence table. Returns the encoded removal update, or `None` when the
    /// connection owned nothing.
    pub fn release_awareness(&mut self, conn_id: ConnectionId, reason: &str) -> Option<Vec<u8>> {
        let owned = self.owned_awareness.remove(&conn_id)?;
        let ids: Vec<ClientId> = owned.into_iter().collect();
        for id in &ids {
            self.awareness.remove_state(*id);
        }
        // Other connections that refreshed the same clients no longer own them
        self.forget_clients(&ids);

        debug!(
            "Released awareness clients {:?} of connection {} in room {} ({})",
            ids, conn_id, self.id, reason
        );
        match self.awareness.update_with_clients(ids) {
            Ok(update) => Some(update.encode_v1()),
            Err(e) => {
                warn!("Failed to encode awareness removal in room {}: {}", self.id, e);
                None
            }
        }
    }

    /// Send `msg` to every connection except `source`.
    pub fn broadcast(&self, source: ConnectionId, msg: &SendMessage) {
        for (id, conn) in &self.connections {
            if *id == source {
                continue;
            }
            conn.send(msg.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::awareness::encode_entries;
    use serde_json::json;
    use yrs::{GetString, Text};

    fn text_update(client_id: u64, content: &str) -> Vec<u8> {
        let doc = Doc::with_client_id(client_id);
        let text = doc.get_or_insert_text("content");
        let mut txn = doc.transact_mut();
        text.insert(&mut txn, 0, content);
        txn.encode_update_v1()
    }

    fn text_of(update: &[u8]) -> String {
        let doc = Doc::new();
        let text = doc.get_or_insert_text("content");
        {
            let mut txn = doc.transact_mut();
            txn.apply_update(Update::decode_v1(update).unwrap()).unwrap();
        }
        let txn = doc.transact();
        text.get_string(&txn)
    }

    #[test]
    fn test_new_room_is_empty() {
        let room = Room::new("doc-1");
        assert_eq!(room.id(), "doc-1");
        assert!(room.is_empty());
        assert!(room.awareness_clients().is_empty());
        assert!(room.awareness_snapshot().unwrap().is_none());
        assert_eq!(text_of(&room.document_snapshot()), "");
    }

    #[test]
    fn test_document_update_shows_in_snapshot() {
        let mut room = Room::new("doc-1");
        room.apply_document_update(ConnectionId::new(), &text_update(1, "hello"))
            .unwrap();
        assert_eq!(text_of(&room.document_snapshot()), "hello");
    }

    #[test]
    fn test_undecodable_document_update_is_rejected() {
        let mut room = Room::new("doc-1");
        let before = room.document_snapshot();
        let result = room.apply_document_update(ConnectionId::new(), &[0x01]);
        assert!(matches!(result, Err(RelayError::DocumentUpdate(_))));
        assert_eq!(room.document_snapshot(), before);
    }

    #[test]
    fn test_awareness_summary_reports_added_then_updated() {
        let mut room = Room::new("doc-1");
        let conn = ConnectionId::new();

        let summary = room
            .apply_awareness_update(conn, &encode_entries(&[(1, 1, Some(json!("a")))]))
            .unwrap()
            .unwrap();
        assert_eq!(summary.added, vec![1]);

        let summary = room
            .apply_awareness_update(conn, &encode_entries(&[(1, 2, Some(json!("b")))]))
            .unwrap()
            .unwrap();
        assert_eq!(summary.updated, vec![1]);

        // Older clock: ignored
        let stale = room
            .apply_awareness_update(conn, &encode_entries(&[(1, 1, Some(json!("c")))]))
            .unwrap();
        assert!(stale.is_none());
    }

    #[test]
    fn test_awareness_ownership_follows_changes() {
        let mut room = Room::new("doc-1");
        let (conn, _rx) = ConnCtx::new("doc-1");
        room.add_connection(conn.clone());

        room.apply_awareness_update(
            conn.id,
            &encode_entries(&[(1, 1, Some(json!({"n": 1}))), (2, 1, Some(json!({"n": 2})))]),
        )
        .unwrap();
        assert_eq!(room.owned_clients(conn.id), vec![1, 2]);

        room.apply_awareness_update(conn.id, &encode_entries(&[(2, 1, None)]))
            .unwrap();
        assert_eq!(room.owned_clients(conn.id), vec![1]);

        room.apply_awareness_update(conn.id, &encode_entries(&[(1, 1, None)]))
            .unwrap();
        assert!(room.owned_clients(conn.id).is_empty());
        assert!(room.release_awareness(conn.id, "disconnect").is_none());
    }

    #[test]
    fn test_invalid_awareness_update_changes_nothing() {
        let mut room = Room::new("doc-1");
        let conn = ConnectionId::new();
        let mut bytes = encode_entries(&[(1, 1, Some(json!("ok")))]);
        bytes[0] = 0x02;

        assert!(room.apply_awareness_update(conn, &bytes).is_err());
        assert!(room.awareness_clients().is_empty());
        assert!(room.owned_clients(conn).is_empty());
    }

    #[test]
    fn test_release_awareness_removes_only_owned_clients() {
        let mut room = Room::new("doc-1");
        let (a, _rx_a) = ConnCtx::new("doc-1");
        let (b, _rx_b) = ConnCtx::new("doc-1");
        room.add_connection(a.clone());
        room.add_connection(b.clone());

        room.apply_awareness_update(a.id, &encode_entries(&[(10, 1, Some(json!("a")))]))
            .unwrap();
        room.apply_awareness_update(b.id, &encode_entries(&[(20, 1, Some(json!("b")))]))
            .unwrap();

        let removal = decode_update(&room.release_awareness(a.id, "disconnect").unwrap()).unwrap();
        assert_eq!(removal.clients.len(), 1);
        assert_eq!(removal.clients[&10].json.as_ref(), "null");
        assert_eq!(room.awareness_clients(), vec![20]);
        assert_eq!(room.owned_clients(b.id), vec![20]);
    }

    #[test]
    fn test_removal_update_clears_state_on_peers() {
        let mut room = Room::new("doc-1");
        let conn = ConnectionId::new();
        let presence = encode_entries(&[(10, 4, Some(json!("a")))]);
        room.apply_awareness_update(conn, &presence).unwrap();

        // A peer that saw the same presence applies our removal
        let peer = Awareness::new(Doc::new());
        peer.apply_update(decode_update(&presence).unwrap()).unwrap();
        let removal = room.release_awareness(conn, "disconnect").unwrap();
        peer.apply_update(decode_update(&removal).unwrap()).unwrap();
        assert!(present_clients(&peer).is_empty());
    }

    #[test]
    fn test_released_clients_leave_other_owners() {
        let mut room = Room::new("doc-1");
        let a = ConnectionId::new();
        let b = ConnectionId::new();

        room.apply_awareness_update(a, &encode_entries(&[(5, 1, Some(json!(1)))]))
            .unwrap();
        room.apply_awareness_update(b, &encode_entries(&[(5, 2, Some(json!(2)))]))
            .unwrap();
        assert_eq!(room.owned_clients(b), vec![5]);

        room.release_awareness(a, "disconnect").unwrap();
        assert!(room.awareness_clients().is_empty());
        assert!(room.owned_clients(b).is_empty());
    }

    #[test]
    fn test_broadcast_skips_source() {
        let mut room = Room::new("doc-1");
        let (a, mut rx_a) = ConnCtx::new("doc-1");
        let (b, mut rx_b) = ConnCtx::new("doc-1");
        room.add_connection(a.clone());
        room.add_connection(b.clone());

        room.broadcast(a.id, &SendMessage::update(vec![1, 2, 3]));
        assert!(rx_a.try_recv().is_err());
        assert!(matches!(rx_b.try_recv(), Ok(SendMessage::Update(_))));
    }
}
