//! # gdai-server
//!
//! MCP server that fronts the GDAI editor plugin's HTTP backend.
//!
//! This crate provides:
//! - `Backend` trait with an HTTP implementation for the plugin's endpoints
//! - MCP JSON-RPC message types and the session state machine
//! - Tool and prompt handlers, including progress reporting for slow tool calls
//! - stdio transport

pub mod backend;
pub mod mcp;
pub mod prompts;
pub mod session;
pub mod tools;
pub mod transport;

#[cfg(test)]
mod testing;

pub use backend::{Backend, HttpBackend};

use gdai_core::{BackendConfig, Result};
use std::sync::Arc;

/// GDAI MCP server
pub struct GdaiServer {
    /// Where tool and prompt requests are forwarded
    backend: Arc<dyn Backend>,
    /// Timeouts and progress cadence
    config: BackendConfig,
}

impl GdaiServer {
    /// Create a new server over the given backend
    pub fn new(backend: impl Backend, config: BackendConfig) -> Self {
        Self {
            backend: Arc::new(backend),
            config,
        }
    }

    /// Create a server talking HTTP to the backend described by `config`
    pub fn http(config: BackendConfig) -> Result<Self> {
        let backend = HttpBackend::new(config.clone())?;
        Ok(Self::new(backend, config))
    }

    /// Run the server on stdio transport
    pub async fn run_stdio(self) -> Result<()> {
        transport::stdio::run(self).await
    }

    /// Get the backend configuration
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }
}
