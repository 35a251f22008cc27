//! MCP tool handlers: listing and calling editor tools

use gdai_core::{GdaiError, Result, ToolCallResult, ToolDescriptor, ToolTimeouts};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backend::{Backend, ToolCallRequest};
use crate::mcp::{ListToolsResult, Notification, Outgoing, RequestId};

/// Message attached to every progress notification
pub const PROGRESS_MESSAGE: &str = "processing...";

/// Fetch the backend's tool list
pub async fn list_tools(backend: &dyn Backend) -> Result<ListToolsResult> {
    let mut json = backend.tools().await?;
    let tools = json
        .get_mut("mcp_tools")
        .map(serde_json::Value::take)
        .ok_or_else(|| {
            GdaiError::Protocol(
                "Error listing tools. Could not find 'mcp_tools' in response.".into(),
            )
        })?;

    let tools: Vec<ToolDescriptor> = serde_json::from_value(tools)
        .map_err(|e| GdaiError::Protocol(format!("Invalid tool descriptor: {}", e)))?;

    Ok(ListToolsResult { tools })
}

/// Decoded body of a `/call-tool` response
#[derive(Debug, Deserialize)]
struct CallToolResponse {
    is_error: bool,
    #[serde(default, deserialize_with = "present")]
    tool_call_result: Option<serde_json::Value>,
    #[serde(default, rename = "type")]
    result_type: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
}

/// Distinguishes an explicit `null` from a missing key
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<serde_json::Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

fn as_message(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

impl CallToolResponse {
    fn into_result(self, tool: &str) -> Result<ToolCallResult> {
        if self.is_error {
            return Err(GdaiError::ToolCallFailed {
                tool: tool.to_string(),
                message: self.tool_call_result.map(as_message).unwrap_or_default(),
            });
        }

        let payload = self.tool_call_result.map(as_message).ok_or_else(|| {
            GdaiError::Protocol(format!(
                "Error calling tool {}. Could not find 'tool_call_result' in response.",
                tool
            ))
        })?;
        Ok(match self.result_type.as_deref() {
            Some("image") => ToolCallResult::image(payload, self.mime_type),
            _ => ToolCallResult::text(payload),
        })
    }
}

/// Everything a tool call needs besides its arguments
#[derive(Clone)]
pub struct CallContext {
    pub backend: Arc<dyn Backend>,
    pub outbound: mpsc::UnboundedSender<Outgoing>,
    pub timeouts: ToolTimeouts,
    pub progress_interval: Duration,
}

/// Aborts the wrapped tasks if the call is dropped before it finishes
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

enum Settled<T> {
    Call(T),
    ProgressEnded,
}

/// Call a tool on the backend while reporting progress to the client
///
/// The progress loop runs until the backend call settles and is then
/// cancelled and awaited, so every notification for `id` is queued before
/// this returns.
pub async fn call_tool(
    ctx: &CallContext,
    id: RequestId,
    name: String,
    arguments: serde_json::Value,
) -> Result<ToolCallResult> {
    let timeout = ctx.timeouts.for_tool(&name);
    let cancel = CancellationToken::new();

    let mut progress: JoinHandle<()> = tokio::spawn(progress_loop(
        ctx.outbound.clone(),
        id.clone(),
        cancel.clone(),
        ctx.progress_interval,
    ));

    let backend = ctx.backend.clone();
    let request = ToolCallRequest {
        tool_name: name.clone(),
        tool_args: arguments,
    };
    let mut call = tokio::spawn(async move {
        tokio::time::timeout(timeout, backend.call_tool(&request, timeout)).await
    });

    let _guard = AbortOnDrop(vec![progress.abort_handle(), call.abort_handle()]);

    let settled = tokio::select! {
        res = &mut call => Settled::Call(res),
        _ = &mut progress => Settled::ProgressEnded,
    };

    let (joined, progress_running) = match settled {
        Settled::Call(res) => (res, true),
        // Only happens once the client is gone; the call still decides the outcome.
        Settled::ProgressEnded => (call.await, false),
    };

    cancel.cancel();
    if progress_running {
        if let Err(e) = progress.await {
            if !e.is_cancelled() {
                warn!("Progress loop for request {} failed: {}", id, e);
            }
        }
    }

    let reply = match joined {
        Ok(Ok(reply)) => reply?,
        Ok(Err(_elapsed)) => {
            return Err(GdaiError::ToolCallTimeout {
                tool: name,
                seconds: timeout.as_secs_f64(),
            });
        }
        Err(e) => {
            return Err(GdaiError::BackendUnreachable(format!(
                "Tool call task for {} ended: {}",
                name, e
            )));
        }
    };

    let response: CallToolResponse = serde_json::from_value(reply)
        .map_err(|e| GdaiError::Protocol(format!("Invalid call-tool response: {}", e)))?;
    response.into_result(&name)
}

/// Send a progress notification now and every `interval` until cancelled
async fn progress_loop(
    outbound: mpsc::UnboundedSender<Outgoing>,
    token: RequestId,
    cancel: CancellationToken,
    interval: Duration,
) {
    let mut progress: u64 = 0;
    loop {
        if cancel.is_cancelled() {
            return;
        }

        progress += 1;
        let note = Notification::progress(token.clone(), progress as f64, PROGRESS_MESSAGE);
        if outbound.send(Outgoing::Notification(note)).is_err() {
            debug!("Outbound channel closed, stopping progress for {}", token);
            return;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBackend;

    fn context(backend: FakeBackend) -> (CallContext, mpsc::UnboundedReceiver<Outgoing>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = CallContext {
            backend: Arc::new(backend),
            outbound: tx,
            timeouts: ToolTimeouts::default(),
            progress_interval: Duration::from_secs(2),
        };
        (ctx, rx)
    }

    fn drain_progress(rx: &mut mpsc::UnboundedReceiver<Outgoing>, id: &RequestId) -> Vec<f64> {
        let mut seen = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            match msg {
                Outgoing::Notification(note) => {
                    assert_eq!(note.method, "notifications/progress");
                    assert_eq!(note.params["progressToken"], serde_json::json!(id));
                    assert_eq!(note.params["message"], PROGRESS_MESSAGE);
                    seen.push(note.params["progress"].as_f64().unwrap());
                }
                Outgoing::Response(r) => panic!("unexpected response {:?}", r),
            }
        }
        seen
    }

    #[tokio::test]
    async fn test_list_tools_maps_descriptors() {
        let backend = FakeBackend::new().with_tools(serde_json::json!({
            "mcp_tools": [
                { "name": "get_scene_tree", "inputSchema": { "type": "object" } },
                { "name": "simulate_input", "description": "Send input events" }
            ]
        }));

        let result = list_tools(&backend).await.unwrap();
        let names: Vec<_> = result.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["get_scene_tree", "simulate_input"]);
    }

    #[tokio::test]
    async fn test_list_tools_missing_field() {
        let backend = FakeBackend::new().with_tools(serde_json::json!({ "tools": [] }));
        let err = list_tools(&backend).await.unwrap_err();
        assert!(matches!(err, GdaiError::Protocol(ref m) if m.contains("mcp_tools")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_reports_progress_then_result() {
        let backend = FakeBackend::new().with_call_tool(
            Duration::from_millis(4500),
            serde_json::json!({ "is_error": false, "tool_call_result": "scene saved" }),
        );
        let (ctx, mut rx) = context(backend);
        let id = RequestId::Number(42);

        let result = call_tool(&ctx, id.clone(), "save_scene".into(), serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(result, ToolCallResult::text("scene saved"));

        // Sent at 0s, 2s and 4s.
        assert_eq!(drain_progress(&mut rx, &id), vec![1.0, 2.0, 3.0]);

        // Nothing trails the result.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_call_times_out_for_default_class() {
        let backend = FakeBackend::new().with_call_tool(
            Duration::from_secs(3600),
            serde_json::json!({ "is_error": false, "tool_call_result": "never" }),
        );
        let (ctx, mut rx) = context(backend);
        let id = RequestId::String("req-1".into());

        let err = call_tool(&ctx, id.clone(), "get_scene_tree".into(), serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GdaiError::ToolCallTimeout { ref tool, seconds } if tool == "get_scene_tree" && seconds == 5.0
        ));

        let seen = drain_progress(&mut rx, &id);
        assert_eq!(seen, vec![1.0, 2.0, 3.0]);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_screenshot_class_allows_thirty_seconds() {
        let backend = FakeBackend::new().with_call_tool(
            Duration::from_secs(20),
            serde_json::json!({
                "is_error": false,
                "type": "image",
                "tool_call_result": "iVBORw0KGgo=",
                "mime_type": "image/png"
            }),
        );
        let (ctx, _rx) = context(backend);

        let result = call_tool(
            &ctx,
            RequestId::Number(1),
            "get_running_scene_screenshot".into(),
            serde_json::json!({}),
        )
        .await
        .unwrap();
        assert_eq!(
            result,
            ToolCallResult::Image {
                data: "iVBORw0KGgo=".into(),
                mime_type: "image/png".into()
            }
        );
    }

    #[tokio::test]
    async fn test_backend_error_flag() {
        let backend = FakeBackend::new().with_call_tool(
            Duration::ZERO,
            serde_json::json!({ "is_error": true, "tool_call_result": "disk full" }),
        );
        let (ctx, _rx) = context(backend);

        let err = call_tool(&ctx, RequestId::Number(3), "save_scene".into(), serde_json::json!({}))
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("disk full"));
        assert!(message.contains("save_scene"));
    }

    #[tokio::test]
    async fn test_success_without_result_is_a_protocol_error() {
        let backend = FakeBackend::new().with_call_tool(
            Duration::ZERO,
            serde_json::json!({ "is_error": false, "type": "text" }),
        );
        let (ctx, _rx) = context(backend);

        let err = call_tool(&ctx, RequestId::Number(7), "save_scene".into(), serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(
            matches!(err, GdaiError::Protocol(ref m) if m.contains("tool_call_result")),
            "got {:?}",
            err
        );
    }

    #[tokio::test]
    async fn test_image_without_mime_type() {
        let backend = FakeBackend::new().with_call_tool(
            Duration::ZERO,
            serde_json::json!({ "is_error": false, "type": "image", "tool_call_result": "abc" }),
        );
        let (ctx, _rx) = context(backend);

        let result = call_tool(&ctx, RequestId::Number(4), "grab".into(), serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(result, ToolCallResult::image("abc", None));
    }

    #[tokio::test]
    async fn test_arguments_forwarded() {
        let backend = FakeBackend::new().with_call_tool(
            Duration::ZERO,
            serde_json::json!({ "is_error": false, "tool_call_result": "ok" }),
        );
        let calls = backend.recorded_calls();
        let (ctx, _rx) = context(backend);

        call_tool(
            &ctx,
            RequestId::Number(5),
            "create_node".into(),
            serde_json::json!({ "type": "Sprite2D", "parent": "/root" }),
        )
        .await
        .unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "create_node");
        assert_eq!(calls[0].1["type"], "Sprite2D");
        assert_eq!(calls[0].2, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_request_scoped() {
        let backend = FakeBackend::new();
        let (ctx, _rx) = context(backend);

        let err = call_tool(&ctx, RequestId::Number(6), "x".into(), serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, GdaiError::BackendUnreachable(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_call_stops_progress() {
        let backend = FakeBackend::new().with_call_tool(
            Duration::from_secs(60),
            serde_json::json!({ "is_error": false, "tool_call_result": "late" }),
        );
        let (ctx, mut rx) = context(backend);

        let handle = {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                call_tool(&ctx, RequestId::Number(8), "simulate_input".into(), serde_json::json!({}))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_secs(3)).await;
        handle.abort();
        let _ = handle.await;

        let before = drain_progress(&mut rx, &RequestId::Number(8));
        assert_eq!(before, vec![1.0, 2.0]);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }
}
