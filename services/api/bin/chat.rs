//! Terminal client for the realtime agent protocol.
//!
//! Every stdin line is sent as one `{content}` frame. Incoming envelopes are folded
//! into a [`Dashboard`]: transcript lines are printed as they arrive, and the side
//! panel card is printed whenever a tool result replaces it.

use anyhow::Context;
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use pluto_core::{
    cards::DisplayCard,
    dashboard::{Dashboard, DashboardUpdate, Speaker},
    envelope::{Envelope, InboundFrame},
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};
use tracing::{debug, warn};

#[derive(Parser)]
#[command(name = "chat")]
#[command(about = "Chat with the Pluto agent over its realtime endpoint")]
struct Args {
    /// Realtime server URL
    #[arg(short, long, default_value = "ws://127.0.0.1:8080")]
    url: String,

    /// Print raw tool payloads in addition to the card they produce
    #[arg(long)]
    raw: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn print_card(card: &DisplayCard) {
    match card {
        DisplayCard::AgentDetails(details) => {
            println!("┌ {}", details.agent_name);
            for line in details.summary().lines().skip(1) {
                println!("│ {}", line);
            }
        }
        DisplayCard::AgentsList { items } => {
            println!("┌ Agents ({})", items.len());
            for item in items {
                println!(
                    "│ {:<24} mindshare {:>8}  Δ {:>8}",
                    item.name, item.mindshare, item.market_cap
                );
            }
        }
        DisplayCard::Error { message } => println!("┌ Card error: {}", message),
        other => match serde_json::to_string_pretty(other) {
            Ok(json) => println!("┌ Card\n{}", json),
            Err(e) => warn!(error = %e, "Failed to render card"),
        },
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("chat={},pluto_core={}", log_level, log_level))
        .with_writer(std::io::stderr)
        .init();

    let (ws_stream, _) = connect_async(args.url.as_str())
        .await
        .with_context(|| format!("Failed to connect to {}", args.url))?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let mut dashboard = Dashboard::new();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = stdin.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    debug!("stdin closed");
                    break;
                };
                dashboard.push_user(line.as_str());
                let frame = serde_json::to_string(&InboundFrame::new(line))?;
                ws_tx.send(WsMessage::Text(frame.into())).await?;
            }
            msg = ws_rx.next() => {
                let text = match msg {
                    Some(Ok(WsMessage::Text(text))) => text,
                    Some(Ok(WsMessage::Close(_))) | None => {
                        println!("[connection closed]");
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(e).context("Realtime connection failed"),
                };

                let envelope: Envelope = match serde_json::from_str(text.as_str()) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        warn!(error = %e, "Ignoring unparsable frame");
                        continue;
                    }
                };
                if args.raw && envelope.kind == pluto_core::envelope::EnvelopeKind::Tools {
                    println!("[tools] {}", envelope.content);
                }

                match dashboard.apply(&envelope) {
                    DashboardUpdate::Transcript(entry) => {
                        let who = match entry.speaker {
                            Speaker::Agent => "agent",
                            Speaker::User => "you",
                        };
                        println!("{}> {}", who, entry.text);
                    }
                    DashboardUpdate::Card(card) => print_card(card),
                    DashboardUpdate::Unchanged => {}
                }
            }
        }
    }

    let _ = ws_tx.send(WsMessage::Close(None)).await;
    debug!(lines = dashboard.transcript().len(), "Session finished");
    Ok(())
}
