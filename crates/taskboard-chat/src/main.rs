use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use taskboard_chat::{ChatError, ChatHistory, ChatSession, ContactKind, GraphqlHistory, MemoryHistory, RelayClient};
use taskboard_protocol::time::display_time;
use taskboard_protocol::{ChatMessage, DEFAULT_GRAPHQL_ENDPOINT, default_relay_url};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "taskboard-chat", about = "Terminal direct messages over the taskboard relay")]
struct Cli {
    /// Username announced to the relay.
    #[arg(long)]
    user: String,
    /// Open this conversation right away.
    #[arg(long)]
    peer: Option<String>,
    /// Your role; decides whose names `/contacts` lists.
    #[arg(long, default_value = "admin")]
    role: String,
    #[arg(long, default_value_t = default_relay_url())]
    relay: String,
    #[arg(long, default_value = DEFAULT_GRAPHQL_ENDPOINT)]
    graphql: String,
    /// Keep history in memory instead of the CRUD API.
    #[arg(long)]
    offline: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskboard_chat=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let relay = RelayClient::connect(&cli.relay, &cli.user)
        .await
        .with_context(|| format!("failed to connect to relay at {}", cli.relay))?;

    if cli.offline {
        let session = ChatSession::new(cli.user.clone(), MemoryHistory::new());
        run(cli, session, relay, None).await
    } else {
        let graphql = GraphqlHistory::new(cli.graphql.clone())?;
        let session = ChatSession::new(cli.user.clone(), graphql.clone());
        run(cli, session, relay, Some(graphql)).await
    }
}

async fn run<H: ChatHistory>(
    cli: Cli,
    mut session: ChatSession<H>,
    mut relay: RelayClient,
    directory: Option<GraphqlHistory>,
) -> Result<()> {
    if let Some(peer) = cli.peer.clone() {
        open(&mut session, peer).await;
    }
    println!("Commands: /peer NAME, /leave, /contacts, /quit. Anything else is sent.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            frame = relay.next_text() => {
                let Some(text) = frame? else {
                    println!("Relay closed the connection.");
                    return Ok(());
                };
                if session.receive_relayed(&text)
                    && let Some(msg) = session.transcript().last()
                {
                    print_message(msg);
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let line = line.trim();
                if line == "/quit" {
                    break;
                } else if line == "/leave" {
                    session.clear_peer();
                    println!("Conversation closed.");
                } else if let Some(peer) = line.strip_prefix("/peer ") {
                    open(&mut session, peer.trim().to_string()).await;
                } else if line == "/contacts" {
                    list_contacts(directory.as_ref(), &cli.role).await;
                } else {
                    match session.send(&mut relay, line).await {
                        Ok(_) => {}
                        Err(ChatError::EmptyMessage) => {}
                        Err(ChatError::NoPeer) => println!("Pick someone first: /peer NAME"),
                        Err(e) => return Err(e).context("failed to send message"),
                    }
                }
            }
        }
    }

    relay.close().await?;
    Ok(())
}

async fn open<H: ChatHistory>(session: &mut ChatSession<H>, peer: String) {
    println!("Chat with {peer}");
    match session.select_peer(peer).await {
        Ok(_) => session.transcript().iter().for_each(print_message),
        Err(e) => println!("Could not load history: {e}"),
    }
}

async fn list_contacts(directory: Option<&GraphqlHistory>, role: &str) {
    let Some(directory) = directory else {
        println!("No contact list in offline mode.");
        return;
    };
    match directory.contacts(ContactKind::for_role(role)).await {
        Ok(names) if names.is_empty() => println!("No contacts."),
        Ok(names) => names.iter().for_each(|name| println!("  {name}")),
        Err(e) => println!("Could not load contacts: {e}"),
    }
}

fn print_message(msg: &ChatMessage) {
    let when = msg
        .timestamp
        .map(|at| display_time(at.with_timezone(&Local)))
        .unwrap_or_default();
    println!("[{when}] {}: {}", msg.sender, msg.body);
}
