//! HTTP routes

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::connections::{Connection, ConnectionService, NewConnection};
use crate::error::Error;
use crate::events::EventHub;
use crate::stats::{ConnectionStats, StatusReport};

use super::mcp::{self, McpSessions};
use super::sse;

/// Shared state for axum handlers
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<EventHub>,
    pub connections: Arc<ConnectionService>,
    pub mcp: Arc<McpSessions>,
}

/// Build the axum router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/api/connections", get(list_connections).post(create_connection))
        .route("/api/connections/:id", delete(delete_connection))
        .route("/api/connections/:id/execute", post(execute_connection))
        .route("/api/connections/:id/test", get(test_connection))
        .route("/api/connections/:id/stats", get(connection_stats))
        .route("/status", get(status))
        .route("/events", get(sse::events))
        .route("/mcp", post(mcp::post).get(mcp::get).delete(mcp::delete))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": "HTTP Connection Relay API",
        "version": env!("CARGO_PKG_VERSION"),
        "transport": "streamable-http",
    }))
}

async fn list_connections(State(state): State<AppState>) -> Result<Json<Vec<Connection>>, ApiError> {
    Ok(Json(state.connections.list().await?))
}

async fn create_connection(
    State(state): State<AppState>,
    Json(new): Json<NewConnection>,
) -> Result<Json<Connection>, ApiError> {
    Ok(Json(state.connections.create(new).await?))
}

async fn execute_connection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let report = state.connections.execute(&id).await?;

    Ok(Json(ExecuteResponse {
        message: report.to_string(),
        source_status: report.source_status,
        dest_status: report.dest_status,
        success: report.is_success(),
    }))
}

async fn test_connection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TestResponse>, ApiError> {
    let report = state.connections.test(&id).await?;

    Ok(Json(TestResponse {
        message: report.to_string(),
        source: report.source.to_string(),
        destination: report.destination.to_string(),
        success: report.source.is_ok() && report.destination.is_ok(),
    }))
}

async fn connection_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ConnectionStats>, ApiError> {
    Ok(Json(state.connections.stats(&id).await?))
}

async fn delete_connection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.connections.delete(&id).await?;
    Ok(Json(json!({ "message": format!("Connection {} deleted successfully", id) })))
}

async fn status(State(state): State<AppState>) -> Json<StatusReport> {
    Json(StatusReport::collect(&state.hub).await)
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
struct ExecuteResponse {
    message: String,
    source_status: u16,
    dest_status: u16,
    success: bool,
}

#[derive(Serialize)]
struct TestResponse {
    message: String,
    source: String,
    destination: String,
    success: bool,
}

/// Crate error mapped onto an HTTP status
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::Relay(_) => StatusCode::BAD_GATEWAY,
            Error::Io(_) | Error::Config(_) | Error::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::connections::{HttpRelay, MemoryConnectionStore};
    use crate::events::BroadcastConfig;

    pub(crate) fn test_state(config: BroadcastConfig) -> AppState {
        let hub = EventHub::start(config);
        let relay = HttpRelay::new(Duration::from_secs(5), Duration::from_secs(2)).unwrap();
        let connections = ConnectionService::new(
            Arc::new(MemoryConnectionStore::new()),
            relay,
            Arc::clone(&hub),
        );

        AppState {
            hub,
            connections: Arc::new(connections),
            mcp: Arc::new(McpSessions::new()),
        }
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_root_banner() {
        let state = test_state(BroadcastConfig::default());
        let app = router(state.clone());

        let (status, body) = send(&app, get("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(body["transport"], "streamable-http");

        state.hub.shutdown().await;
    }

    #[tokio::test]
    async fn test_create_list_stats_delete() {
        let state = test_state(BroadcastConfig::default());
        let app = router(state.clone());

        let (status, created) = send(
            &app,
            post_json(
                "/api/connections",
                json!({
                    "name": "orders",
                    "source_url": "http://a.test/src",
                    "dest_url": "http://b.test/dst",
                    "dest_method": "put",
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["source_method"], "GET");
        assert_eq!(created["dest_method"], "PUT");
        let id = created["id"].as_str().unwrap().to_string();

        let (status, list) = send(&app, get("/api/connections")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);

        let (status, stats) = send(&app, get(&format!("/api/connections/{}/stats", id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["execution_count"], 0);
        assert_eq!(stats["success_rate"], 0.0);

        let request = Request::delete(format!("/api/connections/{}", id))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["message"].as_str().unwrap().contains(&id));

        let (status, body) = send(&app, get(&format!("/api/connections/{}/stats", id))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].is_string());

        state.hub.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_create_rejected() {
        let state = test_state(BroadcastConfig::default());
        let app = router(state.clone());

        let (status, body) = send(
            &app,
            post_json(
                "/api/connections",
                json!({"name": "x", "source_url": "not a url", "dest_url": "http://b.test/"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("source_url"));

        let (status, _) = send(&app, post_json("/api/connections", json!({"name": "x"}))).await;
        assert!(status.is_client_error());

        state.hub.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_connection_is_404() {
        let state = test_state(BroadcastConfig::default());
        let app = router(state.clone());

        let (status, _) = send(&app, Request::post("/api/connections/nope/execute").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, get("/api/connections/nope/test")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        state.hub.shutdown().await;
    }

    #[tokio::test]
    async fn test_status_reports_subscribers() {
        let state = test_state(BroadcastConfig::default().without_greeting());
        let app = router(state.clone());
        let _stream = state.hub.open_subscriber_stream(tokio::io::sink()).await;

        let (status, body) = send(&app, get("/status")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["active_sse_connections"], 1);
        assert_eq!(body["dispatcher_alive"], true);
        assert_eq!(body["connections"][0]["active"], true);
        assert!(body["timestamp"].is_string());

        state.hub.shutdown().await;

        let (_, body) = send(&app, get("/status")).await;
        assert_eq!(body["active_sse_connections"], 0);
        assert_eq!(body["dispatcher_alive"], false);
    }
}
