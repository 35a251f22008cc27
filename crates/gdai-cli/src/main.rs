//! GDAI MCP Server
//!
//! Speaks MCP over stdio and forwards tool and prompt requests to the GDAI
//! plugin running inside the Godot editor (http://localhost:3571 unless
//! `GDAI_MCP_SERVER_PORT` says otherwise).

use anyhow::Result;
use gdai_core::BackendConfig;
use gdai_server::GdaiServer;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = BackendConfig::from_env();
    info!("GDAI MCP server starting, backend at {}", config.base_url());

    let server = GdaiServer::http(config)?;
    server.run_stdio().await?;

    info!("Client disconnected, shutting down");
    Ok(())
}
