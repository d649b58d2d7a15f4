use tracing::debug;

use crate::models::{SendMessage, UpdateMessage};
use crate::ws::{ConnCtx, RelayError, Room};

/// Handle UpdateMessage: merge into the room document, then forward the
/// same payload to every other connection.
pub fn handle_update_message(
    update_msg: UpdateMessage,
    room: &mut Room,
    conn: &ConnCtx,
) -> Result<(), RelayError> {
    room.apply_document_update(conn.id, &update_msg.update)?;

    debug!(
        "Update from {} applied to document {} ({} bytes)",
        conn.id,
        room.id(),
        update_msg.update.len()
    );
    room.broadcast(conn.id, &SendMessage::Update(update_msg));
    Ok(())
}
