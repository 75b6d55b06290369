use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use taskboard_protocol::{DEFAULT_PING_INTERVAL_MS, DEFAULT_RELAY_PORT};

use crate::error::ConfigError;

/// How an inbound chat payload picks its recipients.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPolicy {
    /// Every open connection gets every frame; clients filter.
    #[default]
    Broadcast,
    /// Chat payloads naming both sender and recipient only go to connections
    /// that announced one of those names. Anything else is broadcast.
    ///
    /// The names are read from the payload, not checked against the name the
    /// sending connection announced. A connection that announced no name
    /// receives no pair-routed payloads, its own echo included.
    Pair,
}

impl FromStr for DeliveryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "broadcast" => Ok(Self::Broadcast),
            "pair" => Ok(Self::Pair),
            other => Err(format!("unknown delivery policy: {other} (expected broadcast|pair)")),
        }
    }
}

impl fmt::Display for DeliveryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Broadcast => "broadcast",
            Self::Pair => "pair",
        })
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct RelayConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
    /// Outbound frames buffered per connection before it counts as stalled.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default)]
    pub delivery: DeliveryPolicy,
    #[serde(default = "default_allow_origins")]
    pub allow_origins: Vec<String>,
}

impl RelayConfig {
    /// Load from a TOML file when given, otherwise defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ping_interval_ms == 0 {
            return Err(ConfigError::Invalid("ping_interval_ms must be > 0".into()));
        }
        if self.max_connections == 0 || self.queue_capacity == 0 || self.max_frame_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_connections, queue_capacity and max_frame_bytes must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            ping_interval_ms: default_ping_interval_ms(),
            max_connections: default_max_connections(),
            max_frame_bytes: default_max_frame_bytes(),
            queue_capacity: default_queue_capacity(),
            delivery: DeliveryPolicy::default(),
            allow_origins: default_allow_origins(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_RELAY_PORT))
}

fn default_ping_interval_ms() -> u64 {
    DEFAULT_PING_INTERVAL_MS
}

fn default_max_connections() -> usize {
    1000
}

fn default_max_frame_bytes() -> usize {
    1024 * 1024
}

fn default_queue_capacity() -> usize {
    256
}

fn default_allow_origins() -> Vec<String> {
    vec!["http://localhost:5173".to_string()]
}
