use taskboard_protocol::ChatMessage;

/// Decides which relayed messages belong to the open conversation.
///
/// The relay fans every frame out to every client, so this is the only thing
/// keeping a third party's thread off the screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFilter {
    self_name: String,
    peer_name: Option<String>,
}

impl DeliveryFilter {
    pub fn new(self_name: impl Into<String>) -> Self {
        Self {
            self_name: self_name.into(),
            peer_name: None,
        }
    }

    pub fn self_name(&self) -> &str {
        &self.self_name
    }

    pub fn peer_name(&self) -> Option<&str> {
        self.peer_name.as_deref()
    }

    pub fn set_peer(&mut self, peer: Option<String>) {
        self.peer_name = peer;
    }

    /// No peer, or no recipient on the message, rejects.
    pub fn accepts(&self, msg: &ChatMessage) -> bool {
        match self.peer_name.as_deref() {
            Some(peer) => msg.is_between(&self.self_name, peer),
            None => false,
        }
    }

    /// Parse a relayed text frame and keep it only if it passes.
    pub fn accept_text(&self, text: &str) -> Option<ChatMessage> {
        ChatMessage::parse(text).filter(|msg| self.accepts(msg))
    }
}
