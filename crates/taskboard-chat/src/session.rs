use async_trait::async_trait;
use chrono::{DateTime, Utc};
use taskboard_protocol::time::store_timestamp;
use taskboard_protocol::{ChatMessage, LiveMessage, NewChatRecord};
use tracing::{debug, warn};

use crate::error::{ChatError, Result};
use crate::filter::DeliveryFilter;
use crate::history::ChatHistory;
use crate::relay_client::RelayClient;

/// Anything a live payload can be published to.
#[async_trait]
pub trait RelaySink: Send {
    async fn publish(&mut self, msg: &LiveMessage) -> Result<()>;
}

#[async_trait]
impl RelaySink for RelayClient {
    async fn publish(&mut self, msg: &LiveMessage) -> Result<()> {
        self.send_json(msg).await
    }
}

/// What one send produces: the relayed payload and the row to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub live: LiveMessage,
    pub record: NewChatRecord,
}

/// One user's chat view: who they are talking to and what is on screen.
pub struct ChatSession<H> {
    filter: DeliveryFilter,
    history: H,
    transcript: Vec<ChatMessage>,
}

impl<H: ChatHistory> ChatSession<H> {
    pub fn new(self_name: impl Into<String>, history: H) -> Self {
        Self {
            filter: DeliveryFilter::new(self_name),
            history,
            transcript: Vec::new(),
        }
    }

    pub fn self_name(&self) -> &str {
        self.filter.self_name()
    }

    pub fn peer(&self) -> Option<&str> {
        self.filter.peer_name()
    }

    pub fn history(&self) -> &H {
        &self.history
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    /// Switch to `peer`, replacing the transcript with stored history.
    ///
    /// If the load fails the peer stays selected with an empty transcript.
    pub async fn select_peer(&mut self, peer: impl Into<String>) -> Result<usize> {
        let peer = peer.into();
        self.transcript.clear();
        self.filter.set_peer(Some(peer.clone()));

        let rows = self.history.load(self.filter.self_name(), &peer).await?;
        self.transcript = rows.into_iter().map(ChatMessage::from).collect();
        debug!(peer, loaded = self.transcript.len(), "conversation opened");
        Ok(self.transcript.len())
    }

    pub fn clear_peer(&mut self) {
        self.filter.set_peer(None);
        self.transcript.clear();
    }

    /// Feed one frame from the relay. Returns whether it joined the transcript.
    pub fn receive_relayed(&mut self, text: &str) -> bool {
        match self.filter.accept_text(text) {
            Some(msg) => {
                self.transcript.push(msg);
                true
            }
            None => false,
        }
    }

    /// Build the payloads for `content` without sending anything. Both carry
    /// `now` in the store format, so the live echo and the reloaded row
    /// normalize to the same timestamp.
    pub fn compose(&self, content: &str, now: DateTime<Utc>) -> Result<Outgoing> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let peer = self.filter.peer_name().ok_or(ChatError::NoPeer)?;
        let sender = self.filter.self_name();
        let at = store_timestamp(now);

        Ok(Outgoing {
            live: LiveMessage {
                sender: sender.to_owned(),
                recipient: Some(peer.to_owned()),
                text: content.to_owned(),
                time: Some(at.clone()),
            },
            record: NewChatRecord {
                sender: sender.to_owned(),
                recipient: peer.to_owned(),
                content: content.to_owned(),
                timestap: at,
            },
        })
    }

    /// Publish over the relay, then persist.
    ///
    /// The relay echoes the message back to its sender, so nothing is appended
    /// locally here. A failed persist is logged and leaves the relay send in
    /// place.
    pub async fn send<R: RelaySink>(&mut self, relay: &mut R, content: &str) -> Result<Outgoing> {
        let outgoing = self.compose(content, Utc::now())?;
        relay.publish(&outgoing.live).await?;
        if let Err(e) = self.history.append(&outgoing.record).await {
            warn!(error = %e, recipient = %outgoing.record.recipient, "failed to persist message");
        }
        Ok(outgoing)
    }
}
