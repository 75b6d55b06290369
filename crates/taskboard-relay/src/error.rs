use std::path::PathBuf;

use thiserror::Error;

use crate::registry::ConnectionId;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("malformed frame from connection {conn_id}: {source}")]
    MalformedFrame {
        conn_id: ConnectionId,
        #[source]
        source: serde_json::Error,
    },

    #[error("frame from connection {conn_id} is not utf-8 text")]
    NotText { conn_id: ConnectionId },

    #[error("frame from connection {conn_id} too large: {len} > {max}")]
    FrameTooLarge {
        conn_id: ConnectionId,
        len: usize,
        max: usize,
    },

    #[error("failed to encode broadcast: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}
