use std::sync::Arc;

use serde_json::Value;
use taskboard_protocol::{ClientFrame, ConversationPair};
use tracing::{debug, info, warn};

use crate::config::DeliveryPolicy;
use crate::error::RelayError;
use crate::registry::{Connection, Outbound, Registry, SendOutcome};

/// Outcome of delivering one frame to its recipients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

enum Route {
    All,
    /// Only connections whose announced username is in the pair. The pair
    /// comes from the payload's `sender` and `recipient`, not from the name
    /// the sending connection announced. A connection that never announced a
    /// name gets no pair-routed payloads, its own echo included.
    Pair(ConversationPair),
}

/// Parses inbound frames and fans them out over the registry.
pub struct Relay {
    registry: Arc<Registry>,
    policy: DeliveryPolicy,
    max_frame_bytes: usize,
}

impl Relay {
    pub fn new(registry: Arc<Registry>, policy: DeliveryPolicy, max_frame_bytes: usize) -> Self {
        Self {
            registry,
            policy,
            max_frame_bytes,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Handle one text frame from `from`.
    ///
    /// Invalid JSON is an error for the caller to log; nothing is sent and the
    /// connection stays usable.
    pub fn handle_text(&self, from: &Connection, text: &str) -> Result<BroadcastReport, RelayError> {
        if text.len() > self.max_frame_bytes {
            return Err(RelayError::FrameTooLarge {
                conn_id: from.id(),
                len: text.len(),
                max: self.max_frame_bytes,
            });
        }

        let value: Value = serde_json::from_str(text).map_err(|source| RelayError::MalformedFrame {
            conn_id: from.id(),
            source,
        })?;
        let encoded = serde_json::to_string(&value).map_err(RelayError::Encode)?;

        let report = match ClientFrame::classify(&value) {
            ClientFrame::Auth(auth) => {
                info!(conn_id = from.id(), username = ?auth.username, "client identified");
                self.registry.identify(from.id(), auth.username);
                self.deliver(&encoded, &Route::All)
            }
            ClientFrame::Chat(msg) if self.policy == DeliveryPolicy::Pair => match msg.recipient {
                Some(recipient) => {
                    self.deliver(&encoded, &Route::Pair(ConversationPair::new(msg.sender, recipient)))
                }
                None => self.deliver(&encoded, &Route::All),
            },
            _ => self.deliver(&encoded, &Route::All),
        };

        debug!(
            conn_id = from.id(),
            delivered = report.delivered,
            failed = report.failed,
            "relayed frame"
        );
        Ok(report)
    }

    /// Binary frames are accepted when they carry UTF-8 JSON.
    pub fn handle_binary(&self, from: &Connection, data: &[u8]) -> Result<BroadcastReport, RelayError> {
        let text = std::str::from_utf8(data).map_err(|_| RelayError::NotText { conn_id: from.id() })?;
        self.handle_text(from, text)
    }

    fn deliver(&self, text: &str, route: &Route) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        for conn in self.registry.snapshot() {
            if !conn.is_open() {
                continue;
            }
            if let Route::Pair(pair) = route
                && !conn.username().is_some_and(|name| pair.contains(&name))
            {
                debug!(conn_id = conn.id(), %pair, "not addressed");
                continue;
            }

            match conn.send(Outbound::Text(text.to_owned())) {
                SendOutcome::Queued => report.delivered += 1,
                SendOutcome::Full => {
                    warn!(conn_id = conn.id(), "outbound queue full, terminating connection");
                    conn.terminate();
                    report.failed += 1;
                }
                SendOutcome::Closed => {
                    debug!(conn_id = conn.id(), "skipping closed connection");
                    report.failed += 1;
                }
            }
        }

        report
    }
}
