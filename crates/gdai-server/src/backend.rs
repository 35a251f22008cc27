//! Editor backend trait and its HTTP implementation

use async_trait::async_trait;
use gdai_core::{BackendConfig, GdaiError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Body of `POST /call-tool`
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallRequest {
    pub tool_name: String,
    pub tool_args: serde_json::Value,
}

/// Body of `GET /prompt`
#[derive(Debug, Clone, Serialize)]
pub struct PromptRequest {
    pub prompt_name: String,
    pub prompt_args: Option<HashMap<String, String>>,
}

/// Body of `POST /client_initialized`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInitialized {
    pub protocol_version: String,
    pub client_name: String,
    pub client_version: String,
}

/// The service behind the adapter
///
/// Every method is one round trip and returns the decoded JSON body.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// `GET /tools`
    async fn tools(&self) -> Result<serde_json::Value>;

    /// `GET /prompts`
    async fn prompts(&self) -> Result<serde_json::Value>;

    /// `GET /prompt`
    async fn prompt(&self, request: &PromptRequest) -> Result<serde_json::Value>;

    /// `POST /call-tool`, bounded by `timeout`
    async fn call_tool(
        &self,
        request: &ToolCallRequest,
        timeout: Duration,
    ) -> Result<serde_json::Value>;

    /// `POST /client_initialized`
    async fn client_initialized(&self, notice: &ClientInitialized) -> Result<()>;
}

/// One HTTP round trip, built per call and dropped afterwards
#[derive(Debug, Clone)]
pub struct BackendCall {
    pub method: reqwest::Method,
    pub url: String,
    pub body: Option<serde_json::Value>,
    pub timeout: Duration,
}

impl BackendCall {
    pub fn get(url: String, timeout: Duration) -> Self {
        Self {
            method: reqwest::Method::GET,
            url,
            body: None,
            timeout,
        }
    }

    pub fn post(url: String, body: serde_json::Value, timeout: Duration) -> Self {
        Self {
            method: reqwest::Method::POST,
            url,
            body: Some(body),
            timeout,
        }
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Backend reached over HTTP on localhost
#[derive(Clone)]
pub struct HttpBackend {
    http: reqwest::Client,
    config: BackendConfig,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> Result<Self> {
        // Idle connections are not kept; every call opens its own.
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| GdaiError::BackendUnreachable(e.to_string()))?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Perform a call and decode the JSON body
    pub async fn execute(&self, call: BackendCall) -> Result<serde_json::Value> {
        debug!("{} {} (timeout {:?})", call.method, call.url, call.timeout);

        let mut builder = self
            .http
            .request(call.method.clone(), &call.url)
            .timeout(call.timeout);
        if let Some(body) = &call.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| classify(&call, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GdaiError::BackendHttp {
                status: status.as_u16(),
                message: body,
            });
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| classify(&call, e))
    }
}

fn classify(call: &BackendCall, err: reqwest::Error) -> GdaiError {
    if err.is_timeout() {
        GdaiError::BackendTimeout {
            url: call.url.clone(),
            seconds: call.timeout.as_secs_f64(),
        }
    } else if err.is_decode() {
        GdaiError::Protocol(format!("Invalid JSON from {}: {}", call.url, err))
    } else {
        GdaiError::BackendUnreachable(format!("{}: {}", call.url, err))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn tools(&self) -> Result<serde_json::Value> {
        let call = BackendCall::get(self.config.endpoint("/tools"), self.config.request_timeout);
        self.execute(call).await
    }

    async fn prompts(&self) -> Result<serde_json::Value> {
        let call = BackendCall::get(
            self.config.endpoint("/prompts"),
            self.config.request_timeout,
        );
        self.execute(call).await
    }

    async fn prompt(&self, request: &PromptRequest) -> Result<serde_json::Value> {
        let call = BackendCall::get(self.config.endpoint("/prompt"), self.config.request_timeout)
            .with_body(serde_json::to_value(request)?);
        self.execute(call).await
    }

    async fn call_tool(
        &self,
        request: &ToolCallRequest,
        timeout: Duration,
    ) -> Result<serde_json::Value> {
        let call = BackendCall::post(
            self.config.endpoint("/call-tool"),
            serde_json::to_value(request)?,
            timeout,
        );
        match self.execute(call).await {
            Err(GdaiError::BackendTimeout { seconds, .. }) => Err(GdaiError::ToolCallTimeout {
                tool: request.tool_name.clone(),
                seconds,
            }),
            other => other,
        }
    }

    async fn client_initialized(&self, notice: &ClientInitialized) -> Result<()> {
        let call = BackendCall::post(
            self.config.endpoint("/client_initialized"),
            serde_json::to_value(notice)?,
            self.config.request_timeout,
        );
        self.execute(call).await.map(|_| ())
    }
}
