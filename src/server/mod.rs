//! HTTP server
//!
//! The axum router over connection operations and the event stream, the
//! MCP tool endpoint, and the listener that serves it.

pub mod config;
pub mod listener;
pub mod mcp;
pub mod routes;
pub mod sse;

pub use config::ServerConfig;
pub use listener::RelayServer;
pub use mcp::McpSessions;
pub use routes::{router, AppState};
