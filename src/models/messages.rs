use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};

use crate::ws::error::RelayError;

#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncMessage {
    #[serde_as(as = "Base64")]
    pub update: Vec<u8>,
}

#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMessage {
    #[serde_as(as = "Base64")]
    pub update: Vec<u8>,
}

#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AwarenessMessage {
    #[serde_as(as = "Base64")]
    pub update: Vec<u8>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    pub message: String,
}

/// Messages a client may send.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ReceivedMessage {
    #[serde(rename = "update")]
    Update(UpdateMessage),
    #[serde(rename = "awareness")]
    Awareness(AwarenessMessage),
}

impl ReceivedMessage {
    /// Parse a text frame. Bad JSON, an unknown `type` or a payload that is
    /// not base64 all collapse into [`RelayError::InvalidPayload`].
    pub fn parse(text: &str) -> Result<Self, RelayError> {
        serde_json::from_str(text).map_err(|_| RelayError::InvalidPayload)
    }
}

/// Messages the server sends.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum SendMessage {
    #[serde(rename = "sync")]
    Sync(SyncMessage),
    #[serde(rename = "update")]
    Update(UpdateMessage),
    #[serde(rename = "awareness")]
    Awareness(AwarenessMessage),
    #[serde(rename = "error")]
    Error(ErrorMessage),
}

impl SendMessage {
    pub fn sync(update: Vec<u8>) -> Self {
        SendMessage::Sync(SyncMessage { update })
    }

    pub fn update(update: Vec<u8>) -> Self {
        SendMessage::Update(UpdateMessage { update })
    }

    pub fn awareness(update: Vec<u8>) -> Self {
        SendMessage::Awareness(AwarenessMessage { update })
    }

    pub fn error(message: impl Into<String>) -> Self {
        SendMessage::Error(ErrorMessage {
            message: message.into(),
        })
    }
}
