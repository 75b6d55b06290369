use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("history request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("graphql error: {0}")]
    Graphql(String),

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("relay connection failed: {0}")]
    Relay(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("no conversation partner selected")]
    NoPeer,

    #[error("message is empty")]
    EmptyMessage,

    #[error("relay connection closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, ChatError>;
