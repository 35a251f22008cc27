//! In-process backend double for handler tests

use async_trait::async_trait;
use gdai_core::{GdaiError, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::backend::{Backend, ClientInitialized, PromptRequest, ToolCallRequest};

type Recorded<T> = Arc<Mutex<Vec<T>>>;

/// Serves canned JSON; endpoints without a canned reply are unreachable
#[derive(Default)]
pub struct FakeBackend {
    tools: Option<serde_json::Value>,
    prompts: Option<serde_json::Value>,
    prompt: Option<serde_json::Value>,
    call_tool: Option<(Duration, serde_json::Value)>,
    calls: Recorded<(String, serde_json::Value, Duration)>,
    prompt_requests: Recorded<PromptRequest>,
    initialized: Recorded<ClientInitialized>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tools(mut self, json: serde_json::Value) -> Self {
        self.tools = Some(json);
        self
    }

    pub fn with_prompts(mut self, json: serde_json::Value) -> Self {
        self.prompts = Some(json);
        self
    }

    pub fn with_prompt(mut self, json: serde_json::Value) -> Self {
        self.prompt = Some(json);
        self
    }

    /// Answer `/call-tool` with `json` after `delay`
    pub fn with_call_tool(mut self, delay: Duration, json: serde_json::Value) -> Self {
        self.call_tool = Some((delay, json));
        self
    }

    pub fn recorded_calls(&self) -> Recorded<(String, serde_json::Value, Duration)> {
        self.calls.clone()
    }

    pub fn recorded_prompts(&self) -> Recorded<PromptRequest> {
        self.prompt_requests.clone()
    }

    pub fn recorded_initialized(&self) -> Recorded<ClientInitialized> {
        self.initialized.clone()
    }
}

fn canned(json: &Option<serde_json::Value>, endpoint: &str) -> Result<serde_json::Value> {
    json.clone()
        .ok_or_else(|| GdaiError::BackendUnreachable(format!("{}: connection refused", endpoint)))
}

#[async_trait]
impl Backend for FakeBackend {
    async fn tools(&self) -> Result<serde_json::Value> {
        canned(&self.tools, "/tools")
    }

    async fn prompts(&self) -> Result<serde_json::Value> {
        canned(&self.prompts, "/prompts")
    }

    async fn prompt(&self, request: &PromptRequest) -> Result<serde_json::Value> {
        self.prompt_requests.lock().unwrap().push(request.clone());
        canned(&self.prompt, "/prompt")
    }

    async fn call_tool(
        &self,
        request: &ToolCallRequest,
        timeout: Duration,
    ) -> Result<serde_json::Value> {
        self.calls.lock().unwrap().push((
            request.tool_name.clone(),
            request.tool_args.clone(),
            timeout,
        ));
        match &self.call_tool {
            Some((delay, json)) => {
                tokio::time::sleep(*delay).await;
                Ok(json.clone())
            }
            None => canned(&None, "/call-tool"),
        }
    }

    async fn client_initialized(&self, notice: &ClientInitialized) -> Result<()> {
        self.initialized.lock().unwrap().push(notice.clone());
        Ok(())
    }
}
