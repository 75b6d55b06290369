//! Client side of taskboard direct messages: decides which relayed frames
//! belong to the open conversation and keeps its transcript in step with the
//! stored history.

pub mod error;
pub mod filter;
pub mod history;
pub mod relay_client;
pub mod session;

pub use error::ChatError;
pub use filter::DeliveryFilter;
pub use history::{ChatHistory, ContactKind, GraphqlHistory, MemoryHistory};
pub use relay_client::RelayClient;
pub use session::{ChatSession, Outgoing, RelaySink};
