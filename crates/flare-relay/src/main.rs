//! flare-relay binary.

use std::path::PathBuf;

use clap::Parser;
use flare_common::FlareError;
use flare_config::env::parse_origin_list;
use flare_config::{load_config, validation};
use flare_relay::RelayServer;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flare-relay", about = "Broadcast WebSocket relay for peer negotiation")]
struct Args {
    /// Path to a TOML config file (defaults to the platform config dir).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config and PORT).
    #[arg(short, long)]
    port: Option<u16>,

    /// Interface to bind.
    #[arg(long)]
    bind: Option<String>,

    /// Comma-separated origins allowed to connect, or "*".
    #[arg(long)]
    allowed_origins: Option<String>,

    /// Log filter directive, e.g. "flare_relay=debug".
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let directive = args.log_level.as_deref().unwrap_or("flare_relay=info");
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive)),
        )
        .init();

    if let Err(e) = run(args).await {
        tracing::error!(error = %e, "flare-relay exited with error");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), FlareError> {
    let mut config = load_config(args.config.as_deref())?;

    if let Some(port) = args.port {
        config.relay.port = port;
    }
    if let Some(bind) = args.bind {
        config.relay.bind_address = bind;
    }
    if let Some(origins) = args.allowed_origins {
        config.relay.allowed_origins = parse_origin_list(&origins);
    }
    validation::validate(&config)?;

    let origins = config.relay.allowed_origins.join(", ");
    let bound = RelayServer::new(config.relay).bind().await?;
    let addr = bound.local_addr();

    tracing::info!("flare-relay listening on {addr}");
    tracing::info!("WebSocket endpoint: ws://{addr}");
    tracing::info!("Health check: http://{addr}/health");
    tracing::info!("Allowed origins: {origins}");

    bound
        .serve_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await
}
