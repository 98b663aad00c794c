//! Tool invocation over MCP: request/response at `/mcp`, and the streaming
//! variant at `/sse` + `/message`. Every route here sits behind the
//! authentication middleware.

use crate::api::authn_middleware::AuthenticatedSubject;
use crate::openapi::MCP_TAG;
use crate::state::AppState;
use crate::tools::{ToolError, ToolRegistry};
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Extension, Json, Router,
};
use futures_util::stream::{self, Stream, StreamExt};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use utoipa::ToSchema;

const SERVER_NAME: &str = "creator-gate";
const PROTOCOL_VERSIONS: [&str; 3] = ["2025-06-18", "2025-03-26", "2024-11-05"];
const SSE_BUFFER: usize = 32;

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

/// A JSON-RPC 2.0 request; `id` is absent for notifications
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A JSON-RPC 2.0 response carrying exactly one of `result` or `error`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

impl JsonRpcResponse {
    fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Handle one JSON-RPC message for `subject_id`. Notifications get no response.
pub(crate) async fn dispatch(
    tools: &ToolRegistry,
    subject_id: &str,
    request: JsonRpcRequest,
) -> Option<JsonRpcResponse> {
    let Some(id) = request.id else {
        debug!("MCP notification '{}'", request.method);
        return None;
    };
    if request.jsonrpc != "2.0" {
        return Some(JsonRpcResponse::error(id, INVALID_REQUEST, "jsonrpc must be \"2.0\""));
    }

    let params = request.params.unwrap_or(Value::Null);
    let response = match request.method.as_str() {
        "initialize" => {
            let requested = params.get("protocolVersion").and_then(Value::as_str);
            let version = requested
                .filter(|v| PROTOCOL_VERSIONS.contains(v))
                .unwrap_or(PROTOCOL_VERSIONS[0]);
            JsonRpcResponse::result(
                id,
                json!({
                    "protocolVersion": version,
                    "capabilities": { "tools": { "listChanged": false } },
                    "serverInfo": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") },
                }),
            )
        }
        "ping" => JsonRpcResponse::result(id, json!({})),
        "tools/list" => JsonRpcResponse::result(id, json!({ "tools": tools.list() })),
        "tools/call" => call_tool(tools, subject_id, id, &params).await,
        method => {
            debug!("Unknown MCP method '{}'", method);
            JsonRpcResponse::error(id, METHOD_NOT_FOUND, format!("Method not found: {method}"))
        }
    };
    Some(response)
}

async fn call_tool(tools: &ToolRegistry, subject_id: &str, id: Value, params: &Value) -> JsonRpcResponse {
    let Some(name) = params.get("name").and_then(Value::as_str) else {
        return JsonRpcResponse::error(id, INVALID_PARAMS, "Missing tool name");
    };
    let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

    match tools.call(name, &arguments, subject_id).await {
        Ok(text) => {
            info!("Tool '{}' called by '{}'", name, subject_id);
            JsonRpcResponse::result(
                id,
                json!({ "content": [{ "type": "text", "text": text }], "isError": false }),
            )
        }
        Err(e @ ToolError::UnknownTool(_)) => JsonRpcResponse::error(id, INVALID_PARAMS, e.to_string()),
        Err(e @ ToolError::InvalidArguments(_)) => JsonRpcResponse::result(
            id,
            json!({ "content": [{ "type": "text", "text": e.to_string() }], "isError": true }),
        ),
    }
}

fn parse_error(rejection: JsonRejection) -> Response {
    debug!("Rejected MCP message: {}", rejection);
    (
        StatusCode::BAD_REQUEST,
        Json(JsonRpcResponse::error(Value::Null, PARSE_ERROR, "Parse error")),
    )
        .into_response()
}

/// Request/response MCP endpoint
#[utoipa::path(
    post,
    path = "/mcp",
    request_body = JsonRpcRequest,
    responses(
        (status = 200, description = "JSON-RPC response", body = JsonRpcResponse),
        (status = 202, description = "Notification accepted"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Token does not belong to the creator")
    ),
    tag = MCP_TAG
)]
pub(crate) async fn mcp_endpoint(
    State(state): State<AppState>,
    Extension(subject): Extension<AuthenticatedSubject>,
    request: Result<Json<JsonRpcRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match request {
        Ok(request) => request,
        Err(rejection) => return parse_error(rejection),
    };
    match dispatch(&state.tools, &subject.subject_id, request).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

struct SseSession {
    subject_id: String,
    sender: mpsc::Sender<JsonRpcResponse>,
}

/// Open SSE streams, keyed by the session id handed to the client in the
/// `endpoint` event
#[derive(Clone, Default)]
pub struct SseSessions {
    sessions: Arc<Mutex<HashMap<String, SseSession>>>,
}

impl SseSessions {
    fn open(&self, subject_id: &str) -> (String, mpsc::Receiver<JsonRpcResponse>) {
        let session_id = crate::oauth::random_token(16);
        let (sender, receiver) = mpsc::channel(SSE_BUFFER);
        match self.sessions.lock() {
            Ok(mut sessions) => {
                sessions.insert(
                    session_id.clone(),
                    SseSession {
                        subject_id: subject_id.to_string(),
                        sender,
                    },
                );
            }
            Err(e) => error!("SSE session map poisoned: {}", e),
        }
        (session_id, receiver)
    }

    fn sender_for(&self, session_id: &str, subject_id: &str) -> Result<mpsc::Sender<JsonRpcResponse>, StatusCode> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        let session = sessions.get(session_id).ok_or(StatusCode::NOT_FOUND)?;
        if session.subject_id != subject_id {
            return Err(StatusCode::FORBIDDEN);
        }
        Ok(session.sender.clone())
    }

    fn close(&self, session_id: &str) {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.remove(session_id);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.sessions.lock().map(|sessions| sessions.len()).unwrap_or_default()
    }
}

/// Removes the session when the client goes away and the stream is dropped
struct SessionGuard {
    sessions: SseSessions,
    session_id: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        debug!("SSE session closed");
        self.sessions.close(&self.session_id);
    }
}

/// Streaming MCP endpoint; the first event names the URL to post messages to
pub(crate) async fn sse_endpoint(
    State(state): State<AppState>,
    Extension(subject): Extension<AuthenticatedSubject>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (session_id, receiver) = state.sse.open(&subject.subject_id);
    info!("SSE connection established for '{}'", subject.subject_id);

    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("/message?session_id={session_id}"));
    let guard = SessionGuard {
        sessions: state.sse.clone(),
        session_id,
    };

    let messages = stream::unfold((receiver, guard), |(mut receiver, guard)| async move {
        let message = receiver.recv().await?;
        let event = Event::default()
            .event("message")
            .json_data(&message)
            .unwrap_or_else(|e| {
                error!("Failed to serialize MCP message: {}", e);
                Event::default().comment("dropped message")
            });
        Some((Ok::<_, Infallible>(event), (receiver, guard)))
    });

    Sse::new(stream::once(async move { Ok::<_, Infallible>(endpoint) }).chain(messages))
        .keep_alive(KeepAlive::default())
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageQuery {
    session_id: String,
}

/// Message endpoint of the streaming variant; the response goes out on the stream
pub(crate) async fn message_endpoint(
    State(state): State<AppState>,
    Extension(subject): Extension<AuthenticatedSubject>,
    Query(query): Query<MessageQuery>,
    request: Result<Json<JsonRpcRequest>, JsonRejection>,
) -> Response {
    let sender = match state.sse.sender_for(&query.session_id, &subject.subject_id) {
        Ok(sender) => sender,
        Err(status) if status == StatusCode::FORBIDDEN => {
            warn!("'{}' posted to an SSE session it does not own", subject.subject_id);
            return (
                StatusCode::FORBIDDEN,
                Json(json!({"error": "forbidden", "error_description": "Session belongs to another user"})),
            )
                .into_response();
        }
        Err(status) => {
            return (status, Json(json!({"error": "Unknown or closed session"}))).into_response()
        }
    };

    let Json(request) = match request {
        Ok(request) => request,
        Err(rejection) => return parse_error(rejection),
    };

    if let Some(response) = dispatch(&state.tools, &subject.subject_id, request).await {
        if sender.send(response).await.is_err() {
            state.sse.close(&query.session_id);
            return (StatusCode::GONE, Json(json!({"error": "Session closed"}))).into_response();
        }
    }
    StatusCode::ACCEPTED.into_response()
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/mcp", post(mcp_endpoint))
        .route("/sse", get(sse_endpoint))
        .route("/message", post(message_endpoint))
}
