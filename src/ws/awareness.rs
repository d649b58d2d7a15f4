//! Presence ("awareness") on top of `yrs::sync::Awareness`.
//!
//! Updates use the lib0 v1 awareness encoding spoken by Yjs clients. A
//! `null` JSON state removes the client; any other state must be valid JSON
//! or the whole update is rejected before it touches the table.

use serde_json::Value;
use thiserror::Error;
use yrs::encoding::read::{Cursor, Read};
use yrs::sync::awareness::{self, Awareness, AwarenessUpdate};
use yrs::updates::decoder::Decode;

pub type ClientId = yrs::block::ClientID;

/// Smallest possible encoded entry: client id, clock and an empty string
/// length, one byte each.
const MIN_ENTRY_BYTES: usize = 3;

#[derive(Debug, Error)]
pub enum AwarenessError {
    #[error("malformed awareness update: {0}")]
    Decode(#[from] yrs::encoding::read::Error),
    #[error("awareness update claims {0} entries")]
    EntryCount(usize),
    #[error("awareness state for client {client_id} is not valid JSON: {source}")]
    InvalidState {
        client_id: ClientId,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Table(#[from] awareness::Error),
}

/// Decode a v1 awareness update and check every state is JSON.
pub fn decode_update(bytes: &[u8]) -> Result<AwarenessUpdate, AwarenessError> {
    // The entry count sizes an allocation, so bound it by the payload first
    let count: usize = Cursor::new(bytes).read_var()?;
    if count > bytes.len() / MIN_ENTRY_BYTES {
        return Err(AwarenessError::EntryCount(count));
    }

    let update = AwarenessUpdate::decode_v1(bytes)?;
    for (client_id, entry) in &update.clients {
        serde_json::from_str::<Value>(&entry.json).map_err(|source| {
            AwarenessError::InvalidState {
                client_id: *client_id,
                source,
            }
        })?;
    }
    Ok(update)
}

/// Clients that currently hold a state, in ascending order.
pub fn present_clients(awareness: &Awareness) -> Vec<ClientId> {
    let mut ids: Vec<ClientId> = awareness
        .iter()
        .filter(|(_, state)| state.data.is_some())
        .map(|(id, _)| id)
        .collect();
    ids.sort_unstable();
    ids
}

/// Build an encoded update from `(client, clock, state)` triples.
#[cfg(test)]
pub(crate) fn encode_entries(entries: &[(ClientId, u32, Option<Value>)]) -> Vec<u8> {
    use yrs::sync::awareness::AwarenessUpdateEntry;
    use yrs::updates::encoder::Encode;

    let clients = entries
        .iter()
        .map(|(id, clock, state)| {
            let json = match state {
                Some(value) => value.to_string(),
                None => "null".to_string(),
            };
            (
                *id,
                AwarenessUpdateEntry {
                    clock: *clock,
                    json: json.into(),
                },
            )
        })
        .collect();
    AwarenessUpdate { clients }.encode_v1()
}
