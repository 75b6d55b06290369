#![allow(dead_code)]

use std::time::Duration;

use anyhow::{Context, Result, bail};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use taskboard_relay::{RelayConfig, RelayHandle, serve};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Start a relay on a random loopback port.
pub async fn spawn_test_relay(ping_interval: Duration) -> Result<RelayHandle> {
    spawn_relay_with(RelayConfig {
        ping_interval_ms: ping_interval.as_millis() as u64,
        ..RelayConfig::default()
    })
    .await
}

/// Start a relay with `config`, listening on a random loopback port instead
/// of `config.listen`.
pub async fn spawn_relay_with(mut config: RelayConfig) -> Result<RelayHandle> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    config.listen = listener.local_addr()?;
    serve(listener, config).await
}

pub fn ws_url(relay: &RelayHandle) -> String {
    format!("ws://{}", relay.local_addr())
}

/// A WebSocket client whose reader task keeps polling the socket, so
/// transport pings are answered, and forwards text frames.
pub struct TestPeer {
    sink: SplitSink<WsStream, Message>,
    frames: mpsc::UnboundedReceiver<String>,
    reader: JoinHandle<()>,
}

impl TestPeer {
    pub async fn connect(url: &str) -> Result<Self> {
        let (stream, _) = connect_async(url)
            .await
            .with_context(|| format!("failed to connect to {url}"))?;
        let (sink, mut stream) = stream.split();
        let (tx, frames) = mpsc::unbounded_channel();
        let reader = tokio::spawn(async move {
            while let Some(Ok(msg)) = stream.next().await {
                if let Message::Text(text) = msg
                    && tx.send(text.to_string()).is_err()
                {
                    break;
                }
            }
        });
        Ok(Self {
            sink,
            frames,
            reader,
        })
    }

    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        self.sink.send(Message::text(text.to_owned())).await?;
        Ok(())
    }

    /// Next text frame, or an error after `timeout`.
    pub async fn recv(&mut self, timeout: Duration) -> Result<String> {
        match tokio::time::timeout(timeout, self.frames.recv()).await {
            Ok(Some(text)) => Ok(text),
            Ok(None) => bail!("connection closed"),
            Err(_) => bail!("no frame within {timeout:?}"),
        }
    }

    /// Assert-friendly check that nothing arrives for `quiet`.
    pub async fn expect_silence(&mut self, quiet: Duration) -> Option<String> {
        tokio::time::timeout(quiet, self.frames.recv())
            .await
            .ok()
            .flatten()
    }

    pub async fn close(mut self) -> Result<()> {
        self.sink.send(Message::Close(None)).await?;
        let _ = tokio::time::timeout(Duration::from_secs(2), self.reader).await;
        Ok(())
    }
}

/// A client that completes the handshake and then never reads, so it never
/// answers a ping.
pub struct SilentPeer {
    stream: WsStream,
}

impl SilentPeer {
    pub async fn connect(url: &str) -> Result<Self> {
        let (stream, _) = connect_async(url).await?;
        Ok(Self { stream })
    }

    /// Start reading now; returns every text frame seen until the socket ends.
    pub async fn drain_text(mut self, timeout: Duration) -> Vec<String> {
        let mut texts = Vec::new();
        let _ = tokio::time::timeout(timeout, async {
            while let Some(Ok(msg)) = self.stream.next().await {
                if let Message::Text(text) = msg {
                    texts.push(text.to_string());
                }
            }
        })
        .await;
        texts
    }
}

/// Poll `cond` until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Initialize tracing for tests (only once per process).
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("taskboard_relay=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}
