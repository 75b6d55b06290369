pub mod frame;
pub mod message;
pub mod pair;
pub mod time;

pub use frame::{AuthFrame, ClientFrame};
pub use message::{ChatMessage, LiveMessage, MessageOrigin, NewChatRecord, PersistedMessage, WireMessage};
pub use pair::ConversationPair;

/// Port the relay listens on when nothing else is configured.
pub const DEFAULT_RELAY_PORT: u16 = 4000;

/// Liveness sweep period in milliseconds.
pub const DEFAULT_PING_INTERVAL_MS: u64 = 30_000;

/// GraphQL endpoint of the CRUD API that stores chat history.
pub const DEFAULT_GRAPHQL_ENDPOINT: &str = "http://localhost:3000/graphql";

/// Default relay URL for clients.
pub fn default_relay_url() -> String {
    format!("ws://localhost:{DEFAULT_RELAY_PORT}")
}
