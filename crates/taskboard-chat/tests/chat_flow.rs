use std::sync::Arc;
use std::time::Duration;

use taskboard_chat::{ChatHistory, ChatSession, MemoryHistory, RelayClient};
use taskboard_protocol::{ChatMessage, MessageOrigin};
use taskboard_relay::{DeliveryPolicy, RelayConfig, RelayHandle, serve};
use tokio::net::TcpListener;

const RECV: Duration = Duration::from_secs(3);

async fn spawn_relay(delivery: DeliveryPolicy) -> RelayHandle {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = RelayConfig {
        listen: listener.local_addr().unwrap(),
        delivery,
        ..RelayConfig::default()
    };
    serve(listener, config).await.unwrap()
}

async fn wait_for_connections(relay: &RelayHandle, count: usize) {
    let deadline = tokio::time::Instant::now() + RECV;
    while relay.connection_count() < count {
        assert!(tokio::time::Instant::now() < deadline, "clients never registered");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Read relayed frames until one joins the session's transcript.
async fn next_accepted<H: ChatHistory>(
    session: &mut ChatSession<H>,
    client: &mut RelayClient,
) -> Option<ChatMessage> {
    tokio::time::timeout(RECV, async {
        loop {
            let text = client.recv_text().await.ok()?;
            if session.receive_relayed(&text) {
                return session.transcript().last().cloned();
            }
        }
    })
    .await
    .ok()
    .flatten()
}

/// Read frames for `quiet` and report whether any joined the transcript.
async fn accepts_nothing<H: ChatHistory>(
    session: &mut ChatSession<H>,
    client: &mut RelayClient,
    quiet: Duration,
) -> bool {
    let before = session.transcript().len();
    let _ = tokio::time::timeout(quiet, async {
        while let Ok(text) = client.recv_text().await {
            session.receive_relayed(&text);
        }
    })
    .await;
    session.transcript().len() == before
}

#[tokio::test]
async fn two_users_chat_and_a_third_sees_nothing() {
    let relay = spawn_relay(DeliveryPolicy::Broadcast).await;
    let url = format!("ws://{}", relay.local_addr());
    let history = Arc::new(MemoryHistory::new());

    let mut alice_ws = RelayClient::connect(&url, "alice").await.unwrap();
    let mut bob_ws = RelayClient::connect(&url, "bob").await.unwrap();
    let mut carol_ws = RelayClient::connect(&url, "carol").await.unwrap();
    wait_for_connections(&relay, 3).await;

    let mut alice = ChatSession::new("alice", history.clone());
    let mut bob = ChatSession::new("bob", history.clone());
    let mut carol = ChatSession::new("carol", history.clone());
    alice.select_peer("bob").await.unwrap();
    bob.select_peer("alice").await.unwrap();
    carol.select_peer("alice").await.unwrap();

    alice.send(&mut alice_ws, "hello bob").await.unwrap();

    let echoed = next_accepted(&mut alice, &mut alice_ws).await.unwrap();
    assert_eq!(echoed.body, "hello bob");
    assert_eq!(echoed.origin, MessageOrigin::LiveRelayed);

    let received = next_accepted(&mut bob, &mut bob_ws).await.unwrap();
    assert_eq!(received.sender, "alice");
    assert_eq!(received.recipient.as_deref(), Some("bob"));

    assert!(accepts_nothing(&mut carol, &mut carol_ws, Duration::from_millis(300)).await);

    bob.send(&mut bob_ws, "hi alice").await.unwrap();
    let reply = next_accepted(&mut alice, &mut alice_ws).await.unwrap();
    assert_eq!(reply.body, "hi alice");
    assert_eq!(alice.transcript().len(), 2);

    assert_eq!(history.len(), 2);

    relay.shutdown().await.unwrap();
}

#[tokio::test]
async fn reopening_a_conversation_loads_persisted_history() {
    let relay = spawn_relay(DeliveryPolicy::Broadcast).await;
    let url = format!("ws://{}", relay.local_addr());
    let history = Arc::new(MemoryHistory::new());

    let mut alice_ws = RelayClient::connect(&url, "alice").await.unwrap();
    wait_for_connections(&relay, 1).await;
    let mut alice = ChatSession::new("alice", history.clone());
    alice.select_peer("bob").await.unwrap();
    alice.send(&mut alice_ws, "are you there?").await.unwrap();
    next_accepted(&mut alice, &mut alice_ws).await.unwrap();

    let mut bob = ChatSession::new("bob", history.clone());
    assert_eq!(bob.select_peer("alice").await.unwrap(), 1);
    let stored = &bob.transcript()[0];
    assert_eq!(stored.body, "are you there?");
    assert_eq!(stored.origin, MessageOrigin::Persisted);

    relay.shutdown().await.unwrap();
}

#[tokio::test]
async fn pair_policy_keeps_messages_off_other_sockets() {
    let relay = spawn_relay(DeliveryPolicy::Pair).await;
    let url = format!("ws://{}", relay.local_addr());
    let history = Arc::new(MemoryHistory::new());

    let mut alice_ws = RelayClient::connect(&url, "alice").await.unwrap();
    let mut bob_ws = RelayClient::connect(&url, "bob").await.unwrap();
    let mut carol_ws = RelayClient::connect(&url, "carol").await.unwrap();
    wait_for_connections(&relay, 3).await;

    let mut alice = ChatSession::new("alice", history.clone());
    let mut bob = ChatSession::new("bob", history.clone());
    alice.select_peer("bob").await.unwrap();
    bob.select_peer("alice").await.unwrap();

    // Usernames are recorded from the auth frames before routing applies.
    let deadline = tokio::time::Instant::now() + RECV;
    while relay
        .registry()
        .snapshot()
        .iter()
        .any(|conn| conn.username().is_none())
    {
        assert!(tokio::time::Instant::now() < deadline, "auth frames never arrived");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    alice.send(&mut alice_ws, "just us").await.unwrap();
    assert_eq!(next_accepted(&mut bob, &mut bob_ws).await.unwrap().body, "just us");

    // Carol only ever sees auth frames, never the chat payload.
    let mut seen = Vec::new();
    let _ = tokio::time::timeout(Duration::from_millis(300), async {
        while let Ok(text) = carol_ws.recv_text().await {
            seen.push(text);
        }
    })
    .await;
    assert!(seen.iter().all(|text| !text.contains("just us")), "{seen:?}");

    relay.shutdown().await.unwrap();
}
