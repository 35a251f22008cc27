//! Backend addressing and tool timeout configuration

use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

/// Port the editor plugin's HTTP server listens on by default
pub const DEFAULT_BACKEND_PORT: u16 = 3571;

/// Environment variable overriding the backend port
pub const PORT_ENV_VAR: &str = "GDAI_MCP_SERVER_PORT";

/// Where the editor backend lives and how long calls against it may take
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Backend host name
    pub host: String,
    /// Backend TCP port
    pub port: u16,
    /// Timeout for list/prompt requests and the initialized notification
    pub request_timeout: Duration,
    /// Interval between progress notifications during a tool call
    pub progress_interval: Duration,
    /// Timeout classes for tool calls
    pub tool_timeouts: ToolTimeouts,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_BACKEND_PORT,
            request_timeout: Duration::from_secs(5),
            progress_interval: Duration::from_secs(2),
            tool_timeouts: ToolTimeouts::default(),
        }
    }
}

impl BackendConfig {
    /// Create config for a specific port
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// Read the port from `GDAI_MCP_SERVER_PORT`, falling back to the default
    pub fn from_env() -> Self {
        Self::from_port_var(std::env::var(PORT_ENV_VAR).ok().as_deref())
    }

    fn from_port_var(value: Option<&str>) -> Self {
        match value {
            None => Self::default(),
            Some(raw) => match raw.trim().parse::<u16>() {
                Ok(port) => Self::with_port(port),
                Err(_) => {
                    warn!(
                        "Ignoring invalid {}={:?}, using port {}",
                        PORT_ENV_VAR, raw, DEFAULT_BACKEND_PORT
                    );
                    Self::default()
                }
            },
        }
    }

    /// Base URL every endpoint is derived from
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Full URL of a backend endpoint
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }
}

// TODO: source the timeout from a field on the backend's tool descriptor once the plugin serves one.
/// Per-tool timeout classes
///
/// Tools not listed in `overrides` use `default`.
#[derive(Debug, Clone)]
pub struct ToolTimeouts {
    pub default: Duration,
    pub overrides: HashMap<String, Duration>,
}

impl Default for ToolTimeouts {
    fn default() -> Self {
        let overrides = HashMap::from([
            (
                "get_running_scene_screenshot".to_string(),
                Duration::from_secs(30),
            ),
            ("simulate_input".to_string(), Duration::from_secs(65)),
        ]);

        Self {
            default: Duration::from_secs(5),
            overrides,
        }
    }
}

impl ToolTimeouts {
    /// Timeout for the named tool
    pub fn for_tool(&self, name: &str) -> Duration {
        self.overrides.get(name).copied().unwrap_or(self.default)
    }
}
