use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use taskboard_protocol::{ConversationPair, NewChatRecord, PersistedMessage};
use tracing::debug;

use crate::error::{ChatError, Result};

const GET_MESSAGES: &str = "query GetMessages($sender: String!, $recipient: String!) {
  getMessages(sender: $sender, recipient: $recipient) { id sender recipient content timestap }
}";

const SEND_MESSAGE: &str = "mutation SendMessage($sender: String!, $recipient: String!, $content: String!, $timestap: String!) {
  sendMessage(sender: $sender, recipient: $recipient, content: $content, timestap: $timestap) { id sender recipient content timestap }
}";

/// Where past messages of a conversation live.
#[async_trait]
pub trait ChatHistory: Send + Sync {
    /// Every stored message between `self_name` and `peer`, oldest first.
    async fn load(&self, self_name: &str, peer: &str) -> Result<Vec<PersistedMessage>>;

    async fn append(&self, record: &NewChatRecord) -> Result<PersistedMessage>;
}

#[async_trait]
impl<T: ChatHistory + ?Sized> ChatHistory for Arc<T> {
    async fn load(&self, self_name: &str, peer: &str) -> Result<Vec<PersistedMessage>> {
        (**self).load(self_name, peer).await
    }

    async fn append(&self, record: &NewChatRecord) -> Result<PersistedMessage> {
        (**self).append(record).await
    }
}

/// Who shows up in the contact list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactKind {
    Students,
    Admins,
}

impl ContactKind {
    fn field(self) -> &'static str {
        match self {
            Self::Students => "students",
            Self::Admins => "admins",
        }
    }

    /// Students talk to admins and everyone else talks to students.
    pub fn for_role(role: &str) -> Self {
        if role == "student" {
            Self::Admins
        } else {
            Self::Students
        }
    }
}

#[derive(Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlErrorEntry>,
}

#[derive(Deserialize)]
struct GraphqlErrorEntry {
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetMessagesData {
    get_messages: Vec<PersistedMessage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageData {
    send_message: PersistedMessage,
}

#[derive(Deserialize)]
struct Contact {
    username: String,
}

/// History backed by the CRUD API's GraphQL endpoint.
#[derive(Debug, Clone)]
pub struct GraphqlHistory {
    client: reqwest::Client,
    endpoint: String,
}

impl GraphqlHistory {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("taskboard-chat/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// Usernames offered as conversation partners.
    pub async fn contacts(&self, kind: ContactKind) -> Result<Vec<String>> {
        let query = format!("query {{ {} {{ username }} }}", kind.field());
        let mut data: BTreeMap<String, Option<Vec<Contact>>> = self.request(&query, json!({})).await?;
        Ok(data
            .remove(kind.field())
            .flatten()
            .unwrap_or_default()
            .into_iter()
            .map(|c| c.username)
            .collect())
    }

    async fn request<T: DeserializeOwned>(&self, query: &str, variables: Value) -> Result<T> {
        debug!(endpoint = %self.endpoint, "graphql request");
        let response: GraphqlResponse<T> = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        unpack(response)
    }
}

fn unpack<T>(response: GraphqlResponse<T>) -> Result<T> {
    if !response.errors.is_empty() {
        let messages: Vec<_> = response.errors.into_iter().map(|e| e.message).collect();
        return Err(ChatError::Graphql(messages.join("; ")));
    }
    response
        .data
        .ok_or_else(|| ChatError::Graphql("response carried no data".into()))
}

#[async_trait]
impl ChatHistory for GraphqlHistory {
    async fn load(&self, self_name: &str, peer: &str) -> Result<Vec<PersistedMessage>> {
        let data: GetMessagesData = self
            .request(GET_MESSAGES, json!({ "sender": self_name, "recipient": peer }))
            .await?;
        Ok(data.get_messages)
    }

    async fn append(&self, record: &NewChatRecord) -> Result<PersistedMessage> {
        let data: SendMessageData = self
            .request(SEND_MESSAGE, serde_json::to_value(record)?)
            .await?;
        Ok(data.send_message)
    }
}

/// Process-local history, for running without the CRUD API.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    rows: Mutex<Vec<PersistedMessage>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ChatHistory for MemoryHistory {
    async fn load(&self, self_name: &str, peer: &str) -> Result<Vec<PersistedMessage>> {
        let wanted = ConversationPair::new(self_name, peer);
        let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        Ok(rows
            .iter()
            .filter(|m| ConversationPair::new(m.sender.as_str(), m.recipient.as_str()) == wanted)
            .cloned()
            .collect())
    }

    async fn append(&self, record: &NewChatRecord) -> Result<PersistedMessage> {
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        let row = PersistedMessage {
            id: Some((rows.len() + 1).to_string()),
            sender: record.sender.clone(),
            recipient: record.recipient.clone(),
            content: record.content.clone(),
            timestap: record.timestap.clone(),
        };
        rows.push(row.clone());
        Ok(row)
    }
}
