//! Error types for the GDAI bridge

use thiserror::Error;

/// Result type for GDAI operations
pub type Result<T> = std::result::Result<T, GdaiError>;

/// GDAI error types
#[derive(Debug, Error)]
pub enum GdaiError {
    /// Child process could not be started
    #[error("Failed to launch {command}: {reason}")]
    Launch { command: String, reason: String },

    /// One endpoint of a relayed stream closed
    #[error("Stream closed: {0}")]
    StreamClosed(String),

    /// Backend could not be reached
    #[error("Backend unreachable: {0}")]
    BackendUnreachable(String),

    /// Backend did not answer within the call's timeout
    #[error("Request to {url} timed out after {seconds} seconds")]
    BackendTimeout { url: String, seconds: f64 },

    /// Backend answered with a non-2xx status
    #[error("Backend returned HTTP {status}: {message}")]
    BackendHttp { status: u16, message: String },

    /// Backend response is missing an expected field or is malformed
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Tool call exceeded its timeout class
    #[error("Timeout calling tool {tool}. Took longer than {seconds} seconds.")]
    ToolCallTimeout { tool: String, seconds: f64 },

    /// Backend flagged the tool call as failed
    #[error("Error calling tool {tool}: {message}")]
    ToolCallFailed { tool: String, message: String },

    /// Prompt name not served by this adapter
    #[error("Unknown prompt: {0}")]
    UnknownPrompt(String),

    /// Backend flagged the prompt request as failed
    #[error("{0}")]
    PromptFailed(String),

    /// Malformed request parameters
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// stdio failure
    #[error("IO error: {0}")]
    Io(String),
}

impl GdaiError {
    /// JSON-RPC error code reported to the client for this error
    pub fn code(&self) -> i32 {
        match self {
            GdaiError::BackendUnreachable(_) | GdaiError::BackendTimeout { .. } => {
                error_codes::BACKEND_UNREACHABLE
            }
            GdaiError::BackendHttp { .. } => error_codes::BACKEND_HTTP,
            GdaiError::Protocol(_) => error_codes::BACKEND_PROTOCOL,
            GdaiError::ToolCallTimeout { .. } => error_codes::TOOL_CALL_TIMEOUT,
            GdaiError::ToolCallFailed { .. } => error_codes::TOOL_CALL_FAILED,
            GdaiError::PromptFailed(_) => error_codes::PROMPT_FAILED,
            GdaiError::UnknownPrompt(_) | GdaiError::InvalidParams(_) => {
                error_codes::INVALID_PARAMS
            }
            GdaiError::Launch { .. }
            | GdaiError::StreamClosed(_)
            | GdaiError::Serialization(_)
            | GdaiError::Io(_) => error_codes::INTERNAL_ERROR,
        }
    }
}

impl From<serde_json::Error> for GdaiError {
    fn from(err: serde_json::Error) -> Self {
        GdaiError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for GdaiError {
    fn from(err: std::io::Error) -> Self {
        GdaiError::Io(err.to_string())
    }
}

/// JSON-RPC error codes
pub mod error_codes {
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    pub const BACKEND_UNREACHABLE: i32 = -32010;
    pub const BACKEND_HTTP: i32 = -32011;
    pub const BACKEND_PROTOCOL: i32 = -32012;
    pub const TOOL_CALL_TIMEOUT: i32 = -32013;
    pub const TOOL_CALL_FAILED: i32 = -32014;
    pub const PROMPT_FAILED: i32 = -32015;
}
