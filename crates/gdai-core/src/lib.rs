//! # gdai-core
//!
//! Core types shared by the GDAI MCP relay and adapter.
//!
//! This crate provides:
//! - The error taxonomy and JSON-RPC error codes
//! - Backend addressing and per-tool timeout configuration
//! - Tool and prompt descriptors as served by the editor backend
//! - Tool call results

pub mod config;
pub mod descriptor;
pub mod error;
pub mod result;

pub use config::{BackendConfig, DEFAULT_BACKEND_PORT, PORT_ENV_VAR, ToolTimeouts};
pub use descriptor::{PromptArgument, PromptDescriptor, ToolDescriptor};
pub use error::{GdaiError, Result, error_codes};
pub use result::ToolCallResult;
