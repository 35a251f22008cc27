//! stdio transport for MCP JSON-RPC

use crate::GdaiServer;
use crate::mcp::{
    CallToolResult, InitializeParams, InitializeResult, Message, Outgoing, RequestId, Response,
};
use crate::prompts::{get_prompt, list_prompts};
use crate::session::{Action, MessageKind, Session, SessionState};
use crate::tools::{CallContext, call_tool, list_tools};
use gdai_core::{GdaiError, Result, error_codes};
use serde::Deserialize;
use std::collections::HashMap;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinSet};
use tracing::{debug, error, info, warn};

/// Run the MCP server on stdio
pub async fn run(server: GdaiServer) -> Result<()> {
    serve(
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        server,
    )
    .await
}

/// Serve one session over a newline-delimited JSON stream
pub async fn serve<R, W>(mut reader: R, writer: W, server: GdaiServer) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let writer_task = tokio::spawn(write_loop(writer, rx));

    let ctx = CallContext {
        backend: server.backend.clone(),
        outbound: tx,
        timeouts: server.config.tool_timeouts.clone(),
        progress_interval: server.config.progress_interval,
    };

    let mut session = Session::new();
    let mut in_flight: JoinSet<()> = JoinSet::new();
    let mut requests: HashMap<RequestId, AbortHandle> = HashMap::new();
    let mut task_ids: HashMap<tokio::task::Id, RequestId> = HashMap::new();
    let mut line = String::new();

    info!("GDAI MCP server starting on stdio");

    loop {
        line.clear();
        let bytes_read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| GdaiError::Io(format!("Failed to read stdin: {}", e)))?;

        if bytes_read == 0 {
            // EOF - client disconnected
            info!("Client disconnected (EOF)");
            break;
        }

        while let Some(done) = in_flight.try_join_next_with_id() {
            let task_id = match done {
                Ok((task_id, ())) => task_id,
                Err(e) => e.id(),
            };
            forget_task(&mut requests, &mut task_ids, task_id);
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        debug!("Received: {}", trimmed);

        let message: Message = match serde_json::from_str(trimmed) {
            Ok(m) => m,
            Err(e) => {
                error!("Failed to parse message: {}", e);
                continue;
            }
        };

        let kind = MessageKind::classify(&message);

        // Bad initialize params leave the session untouched.
        let init_params = if kind == MessageKind::Initialize
            && session.state() == SessionState::Connected
        {
            match serde_json::from_value::<InitializeParams>(message.params.clone()) {
                Ok(p) => Some(p),
                Err(e) => {
                    if let Some(id) = message.id.clone() {
                        reply(
                            &ctx,
                            Response::error(
                                id,
                                error_codes::INVALID_PARAMS,
                                format!("Invalid initialize params: {}", e),
                            ),
                        );
                    }
                    continue;
                }
            }
        } else {
            None
        };

        match session.apply(kind) {
            Action::Initialize => {
                if let (Some(id), Some(params)) = (message.id.clone(), init_params) {
                    info!(
                        "Client {} {} connected (protocol {})",
                        params.client_info.name,
                        params.client_info.version,
                        params.protocol_version
                    );
                    let result = InitializeResult::for_client(&params);
                    session.set_client(params);
                    reply(&ctx, success(id, &result));
                }
            }
            Action::NotifyBackend => {
                if let Some(notice) = session.client_initialized() {
                    let backend = ctx.backend.clone();
                    tokio::spawn(async move {
                        match backend.client_initialized(&notice).await {
                            Ok(()) => debug!("Backend notified of client {}", notice.client_name),
                            Err(e) => warn!("Failed to notify backend of client: {}", e),
                        }
                    });
                }
            }
            Action::Pong => {
                if let Some(id) = message.id.clone() {
                    reply(&ctx, Response::success(id, serde_json::json!({})));
                }
            }
            Action::Dispatch => {
                let Some(id) = message.id.clone() else {
                    continue;
                };
                if requests.contains_key(&id) {
                    warn!("Rejecting {}: request id {} is already in flight", message.method, id);
                    reply(
                        &ctx,
                        Response::error(
                            id.clone(),
                            error_codes::INVALID_REQUEST,
                            format!("Request id {} is already in flight", id),
                        ),
                    );
                    continue;
                }
                let ctx = ctx.clone();
                let request_id = id.clone();
                let handle = in_flight.spawn(async move {
                    let response = handle_request(&ctx, request_id, message).await;
                    reply(&ctx, response);
                });
                task_ids.insert(handle.id(), id.clone());
                requests.insert(id, handle);
            }
            Action::Cancel => {
                if let Some(id) = cancelled_request(&message.params) {
                    if let Some(handle) = requests.remove(&id) {
                        info!("Cancelling request {}", id);
                        handle.abort();
                    }
                }
            }
            Action::Reject { code, message: reason } => {
                if let Some(id) = message.id.clone() {
                    warn!("Rejecting {}: {}", message.method, reason);
                    reply(&ctx, Response::error(id, code, reason));
                }
            }
            Action::Ignore => {
                debug!("Ignoring {}", message.method);
            }
        }
    }

    // Requests already dispatched still get their responses.
    if !in_flight.is_empty() {
        info!("Waiting for {} in-flight request(s)", in_flight.len());
    }
    while let Some(done) = in_flight.join_next().await {
        if let Err(e) = done {
            if e.is_panic() {
                error!("Request handler panicked: {}", e);
            }
        }
    }
    drop(ctx);

    match writer_task.await {
        Ok(result) => result,
        Err(e) => Err(GdaiError::Io(format!("Writer task failed: {}", e))),
    }
}

/// Drop the bookkeeping for a finished task, unless its id was since reused
fn forget_task(
    requests: &mut HashMap<RequestId, AbortHandle>,
    task_ids: &mut HashMap<tokio::task::Id, RequestId>,
    task_id: tokio::task::Id,
) {
    let Some(request_id) = task_ids.remove(&task_id) else {
        return;
    };
    if requests.get(&request_id).is_some_and(|h| h.id() == task_id) {
        requests.remove(&request_id);
    }
}

fn reply(ctx: &CallContext, response: Response) {
    if ctx.outbound.send(Outgoing::Response(response)).is_err() {
        warn!("Outbound channel closed, dropping response");
    }
}

fn success<T: serde::Serialize>(id: RequestId, result: &T) -> Response {
    match serde_json::to_value(result) {
        Ok(value) => Response::success(id, value),
        Err(e) => Response::from_error(id, &GdaiError::from(e)),
    }
}

fn cancelled_request(params: &serde_json::Value) -> Option<RequestId> {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct CancelledParams {
        request_id: RequestId,
    }

    serde_json::from_value::<CancelledParams>(params.clone())
        .ok()
        .map(|p| p.request_id)
}

/// Write outgoing messages one per line until every sender is gone
async fn write_loop<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<Outgoing>,
) -> Result<()> {
    while let Some(message) = rx.recv().await {
        let json = serde_json::to_string(&message)?;
        debug!("Sending: {}", json);

        writer
            .write_all(json.as_bytes())
            .await
            .map_err(|e| GdaiError::Io(format!("Failed to write stdout: {}", e)))?;
        writer
            .write_all(b"\n")
            .await
            .map_err(|e| GdaiError::Io(format!("Failed to write newline: {}", e)))?;
        writer
            .flush()
            .await
            .map_err(|e| GdaiError::Io(format!("Failed to flush stdout: {}", e)))?;
    }

    Ok(())
}

async fn handle_request(ctx: &CallContext, id: RequestId, message: Message) -> Response {
    match message.method.as_str() {
        "tools/list" => match list_tools(ctx.backend.as_ref()).await {
            Ok(result) => success(id, &result),
            Err(e) => {
                warn!("tools/list failed: {}", e);
                Response::from_error(id, &e)
            }
        },
        "tools/call" => handle_tools_call(ctx, id, message.params).await,
        "prompts/list" => match list_prompts(ctx.backend.as_ref()).await {
            Ok(result) => success(id, &result),
            Err(e) => {
                warn!("prompts/list failed: {}", e);
                Response::from_error(id, &e)
            }
        },
        "prompts/get" => handle_prompts_get(ctx, id, message.params).await,
        _ => Response::error(
            id,
            error_codes::METHOD_NOT_FOUND,
            format!("Method not found: {}", message.method),
        ),
    }
}

async fn handle_tools_call(ctx: &CallContext, id: RequestId, params: serde_json::Value) -> Response {
    #[derive(Deserialize)]
    struct ToolCallParams {
        name: String,
        #[serde(default = "empty_arguments")]
        arguments: serde_json::Value,
    }

    let params: ToolCallParams = match serde_json::from_value(params) {
        Ok(p) => p,
        Err(e) => {
            return Response::error(
                id,
                error_codes::INVALID_PARAMS,
                format!("Invalid tool call params: {}", e),
            );
        }
    };

    let arguments = if params.arguments.is_null() {
        empty_arguments()
    } else {
        params.arguments
    };

    debug!("Calling tool {} for request {}", params.name, id);
    let result = match call_tool(ctx, id.clone(), params.name, arguments).await {
        Ok(result) => CallToolResult::success(result),
        Err(e) => {
            warn!("Tool call {} failed: {}", id, e);
            CallToolResult::failure(&e)
        }
    };

    success(id, &result)
}

fn empty_arguments() -> serde_json::Value {
    serde_json::json!({})
}

async fn handle_prompts_get(ctx: &CallContext, id: RequestId, params: serde_json::Value) -> Response {
    #[derive(Deserialize)]
    struct GetPromptParams {
        name: String,
        #[serde(default)]
        arguments: Option<HashMap<String, String>>,
    }

    let params: GetPromptParams = match serde_json::from_value(params) {
        Ok(p) => p,
        Err(e) => {
            return Response::error(
                id,
                error_codes::INVALID_PARAMS,
                format!("Invalid prompt params: {}", e),
            );
        }
    };

    match get_prompt(ctx.backend.as_ref(), &params.name, params.arguments).await {
        Ok(result) => success(id, &result),
        Err(e) => Response::from_error(id, &e),
    }
}
