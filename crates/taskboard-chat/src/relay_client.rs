use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use taskboard_protocol::AuthFrame;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info};

use crate::error::{ChatError, Result};

/// One WebSocket connection to the relay.
///
/// Pings from the relay are answered while `next_text` is being polled, so a
/// client that stops reading will be reaped.
pub struct RelayClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl RelayClient {
    /// Connect and announce `username`.
    pub async fn connect(url: &str, username: &str) -> Result<Self> {
        let (stream, _) = connect_async(url).await?;
        info!(url, username, "connected to relay");
        let mut client = Self { stream };
        client.send_json(&AuthFrame::new(username)).await?;
        Ok(client)
    }

    pub async fn send_json<T: Serialize>(&mut self, payload: &T) -> Result<()> {
        let text = serde_json::to_string(payload)?;
        self.stream.send(Message::text(text)).await?;
        Ok(())
    }

    /// Next text frame from the relay. `Ok(None)` once the relay closes.
    pub async fn next_text(&mut self) -> Result<Option<String>> {
        while let Some(msg) = self.stream.next().await {
            match msg? {
                Message::Text(text) => return Ok(Some(text.to_string())),
                Message::Binary(data) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => return Ok(Some(text)),
                    Err(_) => debug!("ignoring non-utf8 binary frame"),
                },
                Message::Close(_) => return Ok(None),
                _ => {}
            }
        }
        Ok(None)
    }

    /// Like `next_text`, but a closed relay is an error.
    pub async fn recv_text(&mut self) -> Result<String> {
        self.next_text().await?.ok_or(ChatError::Closed)
    }

    pub async fn close(mut self) -> Result<()> {
        self.stream.close(None).await?;
        Ok(())
    }
}
