use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::ChatMessage;

/// Sent once by a client right after the socket opens.
///
/// The relay does not verify the claim; any connection may announce any name.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename = "auth")]
pub struct AuthFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl AuthFrame {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
        }
    }
}

/// What a relayed JSON value turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    Auth(AuthFrame),
    Chat(ChatMessage),
    Other,
}

impl ClientFrame {
    pub fn classify(value: &Value) -> Self {
        if value.get("type").and_then(Value::as_str) == Some("auth") {
            return match AuthFrame::deserialize(value) {
                Ok(auth) => ClientFrame::Auth(auth),
                Err(_) => ClientFrame::Other,
            };
        }
        match ChatMessage::from_value(value) {
            Some(msg) => ClientFrame::Chat(msg),
            None => ClientFrame::Other,
        }
    }
}
