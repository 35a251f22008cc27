//! GDAI MCP Relay
//!
//! Starts the MCP server (by default the `gdai-mcp-server` binary installed
//! next to this one) and relays stdio to it until it exits. Any command-line
//! arguments replace the default command.

use anyhow::{Context, Result};
use gdai_relay::relay::{self, FAILURE_EXIT_CODE};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const SERVER_BINARY: &str = "gdai-mcp-server";

/// The child's stderr is relayed on the same stream, so only problems are logged by default.
const DEFAULT_LOG_FILTER: &str = "warn";

fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn default_command() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("locating relay executable")?;
    let dir = exe
        .parent()
        .context("relay executable has no parent directory")?;
    Ok(dir.join(format!("{}{}", SERVER_BINARY, std::env::consts::EXE_SUFFIX)))
}

async fn relay_to(command: String, args: Vec<String>) -> i32 {
    let child = match relay::start(&command, &args) {
        Ok(child) => child,
        Err(e) => {
            error!("{}", e);
            return FAILURE_EXIT_CODE;
        }
    };

    match relay::run(child).await {
        Ok(code) => code,
        Err(e) => {
            error!("Relay failed: {}", e);
            FAILURE_EXIT_CODE
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the relayed protocol stream.
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(log_filter())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut args = std::env::args().skip(1);
    let (command, args) = match args.next() {
        Some(command) => (command, args.collect()),
        None => (default_command()?.to_string_lossy().into_owned(), Vec::new()),
    };

    info!("GDAI MCP relay starting: {} {:?}", command, args);
    let code = relay_to(command, args).await;
    std::process::exit(code);
}
