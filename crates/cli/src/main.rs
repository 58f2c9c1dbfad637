//! Administrative CLI for go-link route stores.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod commands;
mod select;

use std::time::Duration;

use clap::Parser;
use golink_store::{Guarded, RouteStore, StoreError};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::commands::Command;
use crate::select::StoreArgs;

/// CLI-specific error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid or missing configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Reading a dump or writing output failed
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A dump file is not a JSON object of routes
    #[error("invalid dump: {0}")]
    Json(#[from] serde_json::Error),

    /// Route store error
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone, Debug, Parser)]
#[command(name = "golink", version, about, long_about = None)]
struct Args {
    #[command(flatten)]
    store: StoreArgs,

    /// Per-operation deadline in milliseconds
    #[arg(long, env = "GOLINK_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // Route output goes to stdout, so logs stay on stderr
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();
    init_tracing(args.store.debug);

    let shutdown_token = CancellationToken::new();

    let signal_shutdown_token = shutdown_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received interrupt signal");
            signal_shutdown_token.cancel();
        }
    });

    let store = select::open_store(&args.store).await?;
    let mut guarded = Guarded::new(store, shutdown_token);
    if let Some(ms) = args.timeout_ms {
        guarded = guarded.with_timeout(Duration::from_millis(ms));
    }

    let mut stdout = std::io::stdout();
    let result = commands::run(&guarded, args.command, &mut stdout).await;

    if let Err(e) = guarded.close().await {
        warn!("failed to close route store: {e}");
    }
    result
}
