use tracing::debug;

use crate::models::{AwarenessMessage, SendMessage};
use crate::ws::{ConnCtx, RelayError, Room};

/// Handle AwarenessMessage: merge into the room presence table, record which
/// clients the sender now owns, then forward the payload to the others.
pub fn handle_awareness_message(
    awareness_msg: AwarenessMessage,
    room: &mut Room,
    conn: &ConnCtx,
) -> Result<(), RelayError> {
    match room.apply_awareness_update(conn.id, &awareness_msg.update)? {
        Some(summary) => debug!(
            "Awareness from {} in document {}: added={:?} updated={:?} removed={:?}",
            conn.id,
            room.id(),
            summary.added,
            summary.updated,
            summary.removed
        ),
        None => debug!(
            "Awareness from {} in document {} changed nothing",
            conn.id,
            room.id()
        ),
    }
    room.broadcast(conn.id, &SendMessage::Awareness(awareness_msg));
    Ok(())
}
