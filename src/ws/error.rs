use thiserror::Error;

use super::awareness::AwarenessError;

/// Reasons an inbound message is rejected. Each one is reported to the
/// sending connection only; the room is left as it was.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Invalid message payload")]
    InvalidPayload,
    #[error("Invalid document update: {0}")]
    DocumentUpdate(String),
    #[error("Invalid awareness update: {0}")]
    Awareness(#[from] AwarenessError),
}
