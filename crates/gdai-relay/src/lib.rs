//! # gdai-relay
//!
//! Launches the GDAI MCP server as a child process and relays the host's
//! stdio to it. Output from the child has CRLF line endings rewritten to LF
//! so clients that split on `\n` see clean JSON-RPC lines.

pub mod normalize;
pub mod relay;

pub use normalize::{CrlfNormalizer, normalize_line_endings};
pub use relay::{ChildHandle, FallbackWriter, run, start};
