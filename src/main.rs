//! chatline - real-time text broadcast over WebSocket.
//!
//! ## Modes
//!
//! **Default** (no subcommand): interactive terminal client. Connects to the
//! server, shows the shared history, and sends every line typed into the
//! input box. Type `:q` to exit.
//!
//! **Server mode** (`chatline server`): accepts WebSocket connections,
//! replays history to each new peer, and broadcasts every message to all
//! connected peers.

use chatline::{
    client,
    config::{ClientConfig, ConfigError, ServerConfig, Settings},
    server,
};
use clap::{Parser as ClapParser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// chatline - real-time text broadcast over WebSocket
#[derive(ClapParser, Debug)]
#[command(name = "chatline", version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Name shown next to your messages
    username: Option<String>,

    /// WebSocket URL of the server
    #[arg(long)]
    server: Option<String>,

    /// Path to a TOML settings file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write client logs to this file (the terminal is used for the UI)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the broadcast server
    Server {
        /// Address to bind the WebSocket server
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Path to a TOML settings file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Error, Debug)]
pub enum ChatlineError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("server error: {0}")]
    Server(#[from] server::ServerError),

    #[error("client error: {0}")]
    Client(#[from] client::ClientError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), ChatlineError> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Server { bind, config }) => {
            init_tracing();
            run_server(bind, config).await
        }
        None => {
            if let Some(path) = &cli.log_file {
                init_tracing_file(path)?;
            }
            run_client(cli).await
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "chatline=info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initialize tracing with file output.
///
/// The client draws over the whole terminal, so its logs must never go to
/// stdout or stderr.
fn init_tracing_file(path: &Path) -> Result<(), ChatlineError> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "chatline=debug".into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file)),
        )
        .init();
    Ok(())
}

// ── Server mode ────────────────────────────────────────────────────

async fn run_server(bind: Option<SocketAddr>, config: Option<PathBuf>) -> Result<(), ChatlineError> {
    let settings = Settings::load_optional(config.as_deref())?;
    let config = ServerConfig::resolve(bind, &settings.server)?;

    tracing::info!("chatline server starting");
    let listener = server::bind(config.bind).await?;
    tracing::info!(addr = %config.bind, "WebSocket server listening");

    let state = server::AppState::new();
    let hub = state.hub.clone();

    server::serve(listener, state, async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("received Ctrl+C"),
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        }
    })
    .await?;

    tracing::info!(history = hub.history_len(), "chatline server exiting");
    Ok(())
}

// ── Client mode ────────────────────────────────────────────────────

async fn run_client(cli: Cli) -> Result<(), ChatlineError> {
    let settings = Settings::load_optional(cli.config.as_deref())?;
    let config = ClientConfig::resolve(cli.username, cli.server, &settings.client);
    client::run_client(config).await?;
    Ok(())
}
