//! flare-peer binary: a terminal endpoint.
//!
//! Reads commands from stdin:
//!
//! ```text
//! a <CODE>     send an answer signal (A, B, C, D, ...)
//! s <CODE>     send a status signal (Help, Repeat, Wait, OK, ...)
//! connect      start a negotiation
//! status       print the current state
//! quit         exit
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use flare_common::{Category, FlareError, FLASH_DURATION_MS};
use flare_config::{load_config, validation};
use flare_peer::{PeerClient, PeerEvent, SendOutcome, WebRtcFactory};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flare-peer", about = "Negotiate a direct channel through a flare relay")]
struct Args {
    /// Path to a TOML config file (defaults to the platform config dir).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Relay WebSocket URL (overrides config and FLARE_RELAY_URL).
    #[arg(short, long)]
    relay: Option<String>,

    /// Wait for a `connect` command instead of offering on relay connect.
    #[arg(long)]
    no_auto: bool,

    /// Log filter directive, e.g. "flare_peer=debug".
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let directive = args.log_level.as_deref().unwrap_or("flare_peer=info");
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(args).await {
        tracing::error!(error = %e, "flare-peer exited with error");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), FlareError> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(relay) = args.relay {
        config.peer.relay_url = relay;
    }
    if args.no_auto {
        config.peer.auto_negotiate = false;
    }
    validation::validate(&config)?;

    let factory = Arc::new(WebRtcFactory::from_config(&config.peer));
    let (client, mut events) = PeerClient::connect(config.peer, factory);
    println!("endpoint {}", client.endpoint());

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            "quit" | "exit" => break,
            "connect" => client.negotiate().await,
            "status" => {
                let snap = client.snapshot().await;
                println!("state={} status={}", snap.state, snap.status);
                if let Some(last) = snap.last_sent {
                    println!("last sent: {} ({})", last.message, last.category);
                }
            }
            _ => match parse_send(line) {
                Some((category, code)) => match client.send_signal(code, category).await {
                    SendOutcome::Sent(signal) => {
                        println!("sent {} ({})", signal.message, signal.category)
                    }
                    SendOutcome::Rejected(reason) => println!("rejected: {reason:?}"),
                },
                None => println!("usage: a <CODE> | s <CODE> | connect | status | quit"),
            },
        }
    }

    client.shutdown().await;
    Ok(())
}

fn parse_send(line: &str) -> Option<(Category, &str)> {
    let (category, code) = line.split_once(char::is_whitespace)?;
    let category = category.parse::<Category>().ok()?;
    let code = code.trim();
    (!code.is_empty()).then_some((category, code))
}

fn print_event(event: &PeerEvent) {
    match event {
        PeerEvent::StatusChanged(status) => println!("status: {status}"),
        PeerEvent::StateChanged { from, to } => tracing::debug!(%from, %to, "state"),
        PeerEvent::SignalReceived { signal, feedback } => println!(
            "received {} ({}) flash {} for {}ms, vibrate {:?}",
            feedback.text, signal.category, feedback.color, FLASH_DURATION_MS, feedback.vibration
        ),
        PeerEvent::Cue(cue) => tracing::debug!(?cue, pattern = ?cue.vibration(), "cue"),
        PeerEvent::Error(message) => println!("error: {message}"),
    }
}
