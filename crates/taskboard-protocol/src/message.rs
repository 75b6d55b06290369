use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::time::parse_timestamp;

/// Payload a client publishes over the relay for an outgoing message.
///
/// The browser client only ever sent `sender`/`text`/`time`; `recipient` is
/// optional so those frames still decode. `time` is written in the same
/// format as the stored `timestap`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LiveMessage {
    pub sender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

/// A chat row as returned by the `getMessages` query.
///
/// `timestap` is the column name used by the CRUD schema.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PersistedMessage {
    #[serde(default, deserialize_with = "de_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub sender: String,
    pub recipient: String,
    pub content: String,
    pub timestap: String,
}

/// Variables for the `sendMessage` mutation.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct NewChatRecord {
    pub sender: String,
    pub recipient: String,
    pub content: String,
    pub timestap: String,
}

/// Either of the two chat shapes seen on the wire.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum WireMessage {
    Persisted(PersistedMessage),
    Live(LiveMessage),
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageOrigin {
    LiveRelayed,
    Persisted,
}

/// Canonical message used for filtering and rendering, whatever shape it
/// arrived in.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub sender: String,
    pub recipient: Option<String>,
    pub body: String,
    /// `None` when the payload carried no parseable date.
    pub timestamp: Option<DateTime<Utc>>,
    pub origin: MessageOrigin,
}

impl ChatMessage {
    /// Normalize an already-parsed JSON value. Returns `None` for values that
    /// are not chat payloads (auth frames, arbitrary JSON).
    pub fn from_value(value: &Value) -> Option<Self> {
        WireMessage::deserialize(value).ok().map(Self::from)
    }

    /// Parse and normalize a JSON text frame.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str::<WireMessage>(text).ok().map(Self::from)
    }

    /// True when the message travels between `a` and `b`, in either direction.
    pub fn is_between(&self, a: &str, b: &str) -> bool {
        let Some(recipient) = self.recipient.as_deref() else {
            return false;
        };
        (self.sender == a && recipient == b) || (self.sender == b && recipient == a)
    }
}

impl From<LiveMessage> for ChatMessage {
    fn from(msg: LiveMessage) -> Self {
        Self {
            sender: msg.sender,
            recipient: msg.recipient,
            body: msg.text,
            timestamp: msg.time.as_deref().and_then(parse_timestamp),
            origin: MessageOrigin::LiveRelayed,
        }
    }
}

impl From<PersistedMessage> for ChatMessage {
    fn from(msg: PersistedMessage) -> Self {
        Self {
            sender: msg.sender,
            recipient: Some(msg.recipient),
            body: msg.content,
            timestamp: parse_timestamp(&msg.timestap),
            origin: MessageOrigin::Persisted,
        }
    }
}

impl From<WireMessage> for ChatMessage {
    fn from(msg: WireMessage) -> Self {
        match msg {
            WireMessage::Persisted(m) => m.into(),
            WireMessage::Live(m) => m.into(),
        }
    }
}

/// GraphQL `ID`s come back as strings, but some resolvers hand out numbers.
fn de_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
