use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};
use tokio::sync::Notify;
use tracing::{debug, warn};
use uuid::Uuid;
use yrs::Origin;

use crate::models::SendMessage;

/// Outbound messages a connection may have queued before it counts as
/// stalled.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 1024;

/// Stable identifier of one transport connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Origin tag attached to CRDT transactions made on behalf of this
    /// connection.
    pub fn origin(&self) -> Origin {
        Origin::from(self.0.as_bytes().as_slice())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to a live connection: its id, the document it is bound to and
/// the bounded queue feeding its socket writer.
#[derive(Clone, Debug)]
pub struct ConnCtx {
    pub id: ConnectionId,
    pub doc_id: String,
    outbox: Sender<SendMessage>,
    overflow: Arc<Notify>,
}

impl ConnCtx {
    pub fn new(doc_id: impl Into<String>) -> (Self, Receiver<SendMessage>) {
        Self::with_capacity(doc_id, DEFAULT_OUTBOX_CAPACITY)
    }

    pub fn with_capacity(
        doc_id: impl Into<String>,
        capacity: usize,
    ) -> (Self, Receiver<SendMessage>) {
        let (outbox, rx) = mpsc::channel(capacity.max(1));
        let ctx = Self {
            id: ConnectionId::new(),
            doc_id: doc_id.into(),
            outbox,
            overflow: Arc::new(Notify::new()),
        };
        (ctx, rx)
    }

    /// Queue a message for this connection. Never blocks: a closed writer
    /// drops the message, and a full queue drops it and flags the
    /// connection as stalled.
    pub fn send(&self, msg: SendMessage) {
        match self.outbox.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Outbound queue full for connection {}", self.id);
                self.overflow.notify_one();
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Dropping message for closed connection {}", self.id);
            }
        }
    }

    /// Resolves once a send has found the queue full. The connection can no
    /// longer be trusted to hold a consistent view and should be closed.
    pub async fn stalled(&self) {
        self.overflow.notified().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_full_queue_marks_connection_stalled() {
        let (conn, mut rx) = ConnCtx::with_capacity("doc-1", 2);
        conn.send(SendMessage::error("one"));
        conn.send(SendMessage::error("two"));
        assert!(timeout(Duration::from_millis(50), conn.stalled())
            .await
            .is_err());

        conn.send(SendMessage::error("three"));
        timeout(Duration::from_millis(50), conn.stalled())
            .await
            .expect("connection should be flagged as stalled");

        // Queued messages are kept, the overflowing one is dropped
        assert_eq!(rx.try_recv().unwrap(), SendMessage::error("one"));
        assert_eq!(rx.try_recv().unwrap(), SendMessage::error("two"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_to_closed_connection_is_ignored() {
        let (conn, rx) = ConnCtx::new("doc-1");
        drop(rx);
        conn.send(SendMessage::error("gone"));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let (conn, mut rx) = ConnCtx::with_capacity("doc-1", 0);
        conn.send(SendMessage::error("one"));
        assert!(rx.try_recv().is_ok());
    }
}
