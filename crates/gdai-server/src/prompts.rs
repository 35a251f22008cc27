//! MCP prompt handlers

use gdai_core::{GdaiError, PromptDescriptor, Result, ToolCallResult};
use serde::Deserialize;
use std::collections::HashMap;

use crate::backend::{Backend, PromptRequest};
use crate::mcp::{GetPromptResult, ListPromptsResult, PromptMessage};

/// The only prompt the editor plugin serves
pub const DEFAULT_PROMPT_NAME: &str = "gdai-mcp-default-prompt";

/// Fetch the backend's prompt list
pub async fn list_prompts(backend: &dyn Backend) -> Result<ListPromptsResult> {
    let mut json = backend.prompts().await?;
    let prompts = json
        .get_mut("mcp_prompts")
        .map(serde_json::Value::take)
        .ok_or_else(|| {
            GdaiError::Protocol(
                "Error listing prompts. Could not find 'mcp_prompts' in response.".into(),
            )
        })?;

    let prompts: Vec<PromptDescriptor> = serde_json::from_value(prompts)
        .map_err(|e| GdaiError::Protocol(format!("Invalid prompt descriptor: {}", e)))?;

    Ok(ListPromptsResult { prompts })
}

#[derive(Debug, Deserialize)]
struct PromptResponse {
    #[serde(default)]
    is_error: bool,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    messages: Option<Vec<BackendMessage>>,
}

#[derive(Debug, Deserialize)]
struct BackendMessage {
    role: String,
    content: BackendContent,
}

#[derive(Debug, Deserialize)]
struct BackendContent {
    text: String,
}

/// Render a prompt through the backend
///
/// Unknown names are rejected without contacting the backend.
pub async fn get_prompt(
    backend: &dyn Backend,
    name: &str,
    arguments: Option<HashMap<String, String>>,
) -> Result<GetPromptResult> {
    if name != DEFAULT_PROMPT_NAME {
        return Err(GdaiError::UnknownPrompt(name.to_string()));
    }

    let request = PromptRequest {
        prompt_name: name.to_string(),
        prompt_args: arguments,
    };
    let json = backend.prompt(&request).await?;
    let response: PromptResponse = serde_json::from_value(json)
        .map_err(|e| GdaiError::Protocol(format!("Invalid prompt response: {}", e)))?;

    if response.is_error {
        let message = match response.result {
            Some(serde_json::Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => format!("Backend failed to render prompt {}", name),
        };
        return Err(GdaiError::PromptFailed(message));
    }

    let messages = response
        .messages
        .ok_or_else(|| GdaiError::Protocol("Prompt response has no 'messages'".into()))?
        .into_iter()
        .map(|m| PromptMessage {
            role: m.role,
            content: ToolCallResult::text(m.content.text),
        })
        .collect();

    Ok(GetPromptResult { messages })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBackend;

    #[tokio::test]
    async fn test_unknown_prompt_never_reaches_backend() {
        let backend = FakeBackend::new().with_prompt(serde_json::json!({ "messages": [] }));
        let requests = backend.recorded_prompts();

        let err = get_prompt(&backend, "other-prompt", None).await.unwrap_err();
        assert!(matches!(err, GdaiError::UnknownPrompt(ref n) if n == "other-prompt"));
        assert!(requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_default_prompt_forwards_arguments() {
        let backend = FakeBackend::new().with_prompt(serde_json::json!({
            "messages": [
                { "role": "user", "content": { "type": "text", "text": "You are editing a Godot project." } }
            ]
        }));
        let requests = backend.recorded_prompts();

        let args = HashMap::from([("focus".to_string(), "scenes".to_string())]);
        let result = get_prompt(&backend, DEFAULT_PROMPT_NAME, Some(args))
            .await
            .unwrap();

        assert_eq!(result.messages.len(), 1);
        assert_eq!(result.messages[0].role, "user");
        assert_eq!(
            result.messages[0].content,
            ToolCallResult::text("You are editing a Godot project.")
        );

        let requests = requests.lock().unwrap();
        assert_eq!(requests[0].prompt_name, DEFAULT_PROMPT_NAME);
        assert_eq!(
            requests[0].prompt_args.as_ref().unwrap()["focus"],
            "scenes"
        );
    }

    #[tokio::test]
    async fn test_backend_error_flag() {
        let backend = FakeBackend::new().with_prompt(serde_json::json!({
            "is_error": true,
            "result": "No project open"
        }));

        let err = get_prompt(&backend, DEFAULT_PROMPT_NAME, None)
            .await
            .unwrap_err();
        assert!(matches!(err, GdaiError::PromptFailed(ref m) if m == "No project open"));
    }

    #[tokio::test]
    async fn test_list_prompts() {
        let backend = FakeBackend::new().with_prompts(serde_json::json!({
            "mcp_prompts": [{ "name": DEFAULT_PROMPT_NAME, "description": "Godot context" }]
        }));
        let result = list_prompts(&backend).await.unwrap();
        assert_eq!(result.prompts[0].name, DEFAULT_PROMPT_NAME);

        let backend = FakeBackend::new().with_prompts(serde_json::json!({}));
        assert!(matches!(
            list_prompts(&backend).await.unwrap_err(),
            GdaiError::Protocol(_)
        ));
    }
}
