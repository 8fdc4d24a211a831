//! Relay server listener
//!
//! Binds the HTTP listener and serves the router until shutdown, then stops
//! the event hub so open subscriber responses finish.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;

use crate::connections::{ConnectionService, ConnectionStore, HttpRelay};
use crate::error::Result;
use crate::events::{BroadcastConfig, EventHub};
use crate::server::config::ServerConfig;
use crate::server::mcp::McpSessions;
use crate::server::routes::{self, AppState};

/// Relay HTTP server
pub struct RelayServer {
    config: ServerConfig,
    hub: Arc<EventHub>,
    connections: Arc<ConnectionService>,
    mcp: Arc<McpSessions>,
}

impl RelayServer {
    /// Create a server and start its event hub
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: ServerConfig,
        broadcast: BroadcastConfig,
        store: Arc<dyn ConnectionStore>,
    ) -> Result<Self> {
        let relay = HttpRelay::new(config.request_timeout, config.test_timeout)?;
        let hub = EventHub::start(broadcast);
        let connections = Arc::new(ConnectionService::new(store, relay, Arc::clone(&hub)));

        Ok(Self {
            config,
            hub,
            connections,
            mcp: Arc::new(McpSessions::new()),
        })
    }

    /// Get a reference to the event hub
    pub fn hub(&self) -> &Arc<EventHub> {
        &self.hub
    }

    /// Build the router over this server's state
    pub fn router(&self) -> Router {
        routes::router(AppState {
            hub: Arc::clone(&self.hub),
            connections: Arc::clone(&self.connections),
            mcp: Arc::clone(&self.mcp),
        })
    }

    /// Bind the configured address and serve until `shutdown` resolves
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    ///
    /// The hub is shut down as part of the graceful shutdown so that
    /// subscriber responses end and in-flight requests can drain.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "Relay server listening");

        let hub = Arc::clone(&self.hub);
        let signal = async move {
            shutdown.await;
            tracing::info!("Shutdown signal received");
            hub.shutdown().await;
        };

        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(signal)
            .await;

        // Also covers serve failing before the signal fired
        self.hub.shutdown().await;
        tracing::info!("Relay server stopped");

        result?;
        Ok(())
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}
