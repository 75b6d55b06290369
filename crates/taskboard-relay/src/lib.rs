//! WebSocket relay for taskboard direct messages.
//!
//! Every valid JSON frame a client sends is re-broadcast to every open
//! connection; clients decide what belongs to their conversation. A liveness
//! monitor pings connections on a fixed period and reaps the ones that stop
//! answering.

pub mod config;
pub mod error;
pub mod liveness;
pub mod registry;
pub mod relay;
pub mod service;

pub use config::{DeliveryPolicy, RelayConfig};
pub use error::{ConfigError, RelayError};
pub use registry::{Connection, ConnectionId, Registry};
pub use relay::{BroadcastReport, Relay};
pub use service::{RelayHandle, serve, spawn_relay};
