//! Tool call results

use serde::{Deserialize, Serialize};

/// MIME type assumed when the backend returns an image without one
pub const DEFAULT_IMAGE_MIME_TYPE: &str = "image/jpg";

/// Successful outcome of a tool call
///
/// Serializes as a single MCP content block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolCallResult {
    Text {
        text: String,
    },
    Image {
        /// Base64 payload exactly as the backend sent it
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

impl ToolCallResult {
    pub fn text(text: impl Into<String>) -> Self {
        ToolCallResult::Text { text: text.into() }
    }

    pub fn image(data: impl Into<String>, mime_type: Option<String>) -> Self {
        ToolCallResult::Image {
            data: data.into(),
            mime_type: mime_type.unwrap_or_else(|| DEFAULT_IMAGE_MIME_TYPE.to_string()),
        }
    }
}
