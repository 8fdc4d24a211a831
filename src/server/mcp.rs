//! Model Context Protocol endpoint
//!
//! JSON-RPC 2.0 over streamable HTTP at `/mcp`. `initialize` opens a session
//! whose id is returned in the `Mcp-Session-Id` header; every later request
//! must carry it. The six tools map one-to-one onto [`ConnectionService`]
//! operations and answer with text content, so tool calls publish the same
//! events as the REST routes.
//!
//! `GET /mcp` with a known session subscribes to the event stream.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::connections::{ConnectionService, NewConnection};
use crate::error::Error;

use super::routes::AppState;
use super::sse;

/// Session header, on both requests and the `initialize` response
pub const SESSION_HEADER: &str = "mcp-session-id";
/// Protocol version header sent by clients
pub const PROTOCOL_HEADER: &str = "mcp-protocol-version";
/// Protocol version assumed when the client sends none
pub const DEFAULT_CLIENT_PROTOCOL: &str = "2025-03-26";
/// Protocol version this server speaks
pub const SERVER_PROTOCOL: &str = "2025-06-18";

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_SESSION: i64 = -32000;

/// Open MCP sessions
#[derive(Default)]
pub struct McpSessions {
    sessions: RwLock<HashMap<String, McpSession>>,
}

#[derive(Debug, Clone)]
struct McpSession {
    protocol_version: String,
    initialized: bool,
    created_at: DateTime<Utc>,
}

impl McpSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session and return its id
    pub async fn open(&self, protocol_version: &str) -> String {
        let id = format!("session_{}", Uuid::new_v4().simple());
        let session = McpSession {
            protocol_version: protocol_version.to_string(),
            initialized: false,
            created_at: Utc::now(),
        };

        self.sessions.write().await.insert(id.clone(), session);
        tracing::info!(session_id = %id, protocol_version, "MCP session opened");
        id
    }

    /// Whether `id` names an open session
    pub async fn contains(&self, id: &str) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    /// Whether the session has completed `initialize`
    pub async fn is_initialized(&self, id: &str) -> bool {
        self.sessions
            .read()
            .await
            .get(id)
            .map(|s| s.initialized)
            .unwrap_or(false)
    }

    async fn mark_initialized(&self, id: &str) {
        if let Some(session) = self.sessions.write().await.get_mut(id) {
            session.initialized = true;
            tracing::debug!(
                session_id = id,
                protocol_version = %session.protocol_version,
                age_ms = (Utc::now() - session.created_at).num_milliseconds(),
                "MCP session initialized"
            );
        }
    }

    /// End a session; returns whether it existed
    pub async fn close(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            tracing::info!(session_id = id, "MCP session closed");
        }
        removed
    }

    /// Number of open sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Incoming JSON-RPC message
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// JSON-RPC error object
#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

/// Outgoing JSON-RPC message
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Value,
}

impl RpcResponse {
    fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            result: Some(result),
            error: None,
            id,
        }
    }

    fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
            id,
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// `POST /mcp`: handle one JSON-RPC message
pub async fn post(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let message: Value = match serde_json::from_slice(&body) {
        Ok(message) => message,
        Err(e) => {
            let response = RpcResponse::error(Value::Null, PARSE_ERROR, e.to_string());
            return (StatusCode::BAD_REQUEST, Json(response)).into_response();
        }
    };

    let request: RpcRequest = match serde_json::from_value(message) {
        Ok(request) => request,
        Err(e) => {
            let response = RpcResponse::error(Value::Null, INVALID_REQUEST, e.to_string());
            return (StatusCode::BAD_REQUEST, Json(response)).into_response();
        }
    };

    let session_id = match header(&headers, SESSION_HEADER) {
        Some(id) => {
            if !state.mcp.contains(id).await {
                return invalid_session(request.id);
            }
            id.to_string()
        }
        None if request.method == "initialize" => {
            let version = header(&headers, PROTOCOL_HEADER).unwrap_or(DEFAULT_CLIENT_PROTOCOL);
            state.mcp.open(version).await
        }
        None => return invalid_session(request.id),
    };

    let response = handle(&state, &session_id, request).await;

    let mut response = Json(response).into_response();
    if let Ok(value) = HeaderValue::from_str(&session_id) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}

/// `GET /mcp`: event stream for a session
pub async fn get(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(id) = header(&headers, SESSION_HEADER) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Mcp-Session-Id header required" })),
        )
            .into_response();
    };

    if !state.mcp.contains(id).await {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "Invalid session" }))).into_response();
    }

    sse::events(State(state)).await
}

/// `DELETE /mcp`: end a session
pub async fn delete(State(state): State<AppState>, headers: HeaderMap) -> StatusCode {
    match header(&headers, SESSION_HEADER) {
        Some(id) => {
            if state.mcp.close(id).await {
                StatusCode::NO_CONTENT
            } else {
                StatusCode::NOT_FOUND
            }
        }
        None => StatusCode::BAD_REQUEST,
    }
}

fn invalid_session(id: Value) -> Response {
    Json(RpcResponse::error(id, INVALID_SESSION, "Invalid session")).into_response()
}

async fn handle(state: &AppState, session_id: &str, request: RpcRequest) -> RpcResponse {
    match request.method.as_str() {
        "initialize" => {
            state.mcp.mark_initialized(session_id).await;
            RpcResponse::result(
                request.id,
                json!({
                    "protocolVersion": SERVER_PROTOCOL,
                    "capabilities": { "tools": { "listChanged": true } },
                    "serverInfo": {
                        "name": "HTTP Connection Manager",
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                }),
            )
        }
        "notifications/initialized" => RpcResponse::result(request.id, json!({})),
        "tools/list" => RpcResponse::result(request.id, json!({ "tools": tool_definitions() })),
        "tools/call" => {
            let name = request.params.get("name").and_then(Value::as_str).unwrap_or_default();
            let arguments = request.params.get("arguments").cloned().unwrap_or_else(|| json!({}));
            let result = call_tool(&state.connections, name, arguments).await;
            RpcResponse::result(request.id, result)
        }
        other => RpcResponse::error(
            request.id,
            METHOD_NOT_FOUND,
            format!("Method '{}' not found", other),
        ),
    }
}

/// Run a tool and wrap its outcome as MCP text content
///
/// Tool failures are reported in the content with `isError`, never as a
/// JSON-RPC error.
pub async fn call_tool(service: &ConnectionService, name: &str, arguments: Value) -> Value {
    tracing::debug!(tool = name, "MCP tool call");

    match run_tool(service, name, arguments).await {
        Ok(text) => json!({ "content": [{ "type": "text", "text": text }] }),
        Err(e) => {
            let text = match &e {
                Error::NotFound(_) => e.to_string(),
                _ => format!("Error executing tool: {}", e),
            };
            json!({ "content": [{ "type": "text", "text": text }], "isError": true })
        }
    }
}

async fn run_tool(service: &ConnectionService, name: &str, arguments: Value) -> Result<String, Error> {
    let connection_id = || {
        arguments
            .get("connection_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::InvalidRequest("connection_id is required".to_string()))
    };

    match name {
        "create_connection" => {
            let new: NewConnection = serde_json::from_value(arguments.clone())
                .map_err(|e| Error::InvalidRequest(e.to_string()))?;
            let connection = service.create(new).await?;
            Ok(format!("Connection created with ID: {}", connection.id))
        }
        "list_connections" => {
            let connections = service.list().await?;
            if connections.is_empty() {
                return Ok("No connections found.".to_string());
            }

            let mut text = String::from("HTTP Connections:\n");
            for c in connections {
                text.push_str(&format!(
                    "- ID: {}, Name: {}, Source: {}, Dest: {}, Executions: {}\n",
                    c.id, c.name, c.source_url, c.dest_url, c.execution_count
                ));
            }
            Ok(text)
        }
        "execute_connection" => Ok(service.execute(&connection_id()?).await?.to_string()),
        "test_connection" => Ok(service.test(&connection_id()?).await?.to_string()),
        "delete_connection" => {
            let id = connection_id()?;
            service.delete(&id).await?;
            Ok(format!("Connection {} deleted successfully", id))
        }
        "get_connection_stats" => Ok(service.stats(&connection_id()?).await?.to_string()),
        other => Err(Error::InvalidRequest(format!("Unknown tool: {}", other))),
    }
}

fn id_tool(name: &str, description: &str, id_description: &str) -> Value {
    json!({
        "name": name,
        "description": description,
        "inputSchema": {
            "type": "object",
            "properties": {
                "connection_id": { "type": "string", "description": id_description },
            },
            "required": ["connection_id"],
        },
    })
}

/// Tool descriptors returned by `tools/list`
pub fn tool_definitions() -> Vec<Value> {
    vec![
        json!({
            "name": "create_connection",
            "description": "Create a new HTTP connection between endpoints",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Name of the connection" },
                    "source_url": { "type": "string", "description": "Source API endpoint URL" },
                    "source_method": { "type": "string", "default": "GET", "description": "HTTP method for source" },
                    "source_headers": { "type": "object", "description": "Headers for source request" },
                    "dest_url": { "type": "string", "description": "Destination API endpoint URL" },
                    "dest_method": { "type": "string", "default": "POST", "description": "HTTP method for destination" },
                    "dest_headers": { "type": "object", "description": "Headers for destination request" },
                    "mapping_rules": { "type": "array", "description": "Data mapping rules" },
                },
                "required": ["name", "source_url", "dest_url"],
            },
        }),
        json!({
            "name": "list_connections",
            "description": "List all HTTP connections",
            "inputSchema": { "type": "object", "properties": {} },
        }),
        id_tool(
            "execute_connection",
            "Execute an HTTP connection to transfer data between endpoints",
            "ID of the connection to execute",
        ),
        id_tool(
            "test_connection",
            "Test a connection by making requests to both endpoints",
            "ID of the connection to test",
        ),
        id_tool("delete_connection", "Delete an HTTP connection", "ID of the connection to delete"),
        id_tool(
            "get_connection_stats",
            "Get detailed statistics for a connection",
            "ID of the connection to get stats for",
        ),
    ]
}
