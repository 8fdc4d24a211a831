//! Connection operations
//!
//! Every state-changing operation publishes an event on the hub once it has
//! completed, so subscribers see creates, executions, tests and deletes as
//! they happen.

use std::sync::Arc;

use serde_json::json;

use crate::error::{Error, Result};
use crate::events::event::{
    CONNECTION_CREATED, CONNECTION_DELETED, CONNECTION_EXECUTED, CONNECTION_TESTED,
};
use crate::events::EventHub;
use crate::stats::ConnectionStats;

use super::model::{Connection, NewConnection};
use super::relay::{HttpRelay, RelayReport, TestReport};
use super::store::ConnectionStore;

/// CRUD and relay operations over a store, publishing to a hub
pub struct ConnectionService {
    store: Arc<dyn ConnectionStore>,
    relay: HttpRelay,
    hub: Arc<EventHub>,
}

impl ConnectionService {
    pub fn new(store: Arc<dyn ConnectionStore>, relay: HttpRelay, hub: Arc<EventHub>) -> Self {
        Self { store, relay, hub }
    }

    /// Validate and store a new connection
    pub async fn create(&self, new: NewConnection) -> Result<Connection> {
        new.validate().map_err(Error::InvalidRequest)?;

        let connection = self.store.create(new).await?;

        tracing::info!(connection_id = %connection.id, name = %connection.name, "Connection created");
        self.hub.publish_event(
            CONNECTION_CREATED,
            json!({
                "connection_id": connection.id,
                "name": connection.name,
                "source_url": connection.source_url,
                "dest_url": connection.dest_url,
            }),
        );

        Ok(connection)
    }

    /// All connections, newest first
    pub async fn list(&self) -> Result<Vec<Connection>> {
        Ok(self.store.list().await?)
    }

    /// Relay source → destination and count the execution
    ///
    /// A transport failure still counts as a failed execution before the
    /// error is returned.
    pub async fn execute(&self, id: &str) -> Result<RelayReport> {
        let connection = self.store.get(id).await?;

        let report = match self.relay.execute(&connection).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(connection_id = %connection.id, error = %e, "Relay failed");
                self.store.record_execution(id, false).await?;
                return Err(e.into());
            }
        };

        self.store.record_execution(id, report.is_success()).await?;

        tracing::info!(
            connection_id = %connection.id,
            source_status = report.source_status,
            dest_status = report.dest_status,
            "Connection executed"
        );
        self.hub.publish_event(
            CONNECTION_EXECUTED,
            json!({
                "connection_id": connection.id,
                "result": report.to_string(),
                "success": report.is_success(),
            }),
        );

        Ok(report)
    }

    /// Probe both endpoints of a connection
    pub async fn test(&self, id: &str) -> Result<TestReport> {
        let connection = self.store.get(id).await?;
        let report = self.relay.test(&connection).await;

        self.hub.publish_event(
            CONNECTION_TESTED,
            json!({
                "connection_id": connection.id,
                "result": report.to_string(),
            }),
        );

        Ok(report)
    }

    /// Delete a connection
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.store.delete(id).await?;

        tracing::info!(connection_id = %id, "Connection deleted");
        self.hub.publish_event(
            CONNECTION_DELETED,
            json!({
                "connection_id": id,
                "result": format!("Connection {} deleted successfully", id),
            }),
        );

        Ok(())
    }

    /// Execution statistics for one connection
    pub async fn stats(&self, id: &str) -> Result<ConnectionStats> {
        let connection = self.store.get(id).await?;
        Ok(ConnectionStats::from(&connection))
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::Value;

    use super::*;
    use crate::connections::store::MemoryConnectionStore;
    use crate::events::testing::read_events;
    use crate::events::BroadcastConfig;

    async fn upstream() -> SocketAddr {
        let app = Router::new()
            .route("/source", get(|| async { Json(serde_json::json!({"v": 1})) }))
            .route("/ok", post(|| async { StatusCode::OK }))
            .route("/bad", post(|| async { StatusCode::BAD_REQUEST }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn service(hub: Arc<EventHub>) -> ConnectionService {
        let relay = HttpRelay::new(Duration::from_secs(5), Duration::from_secs(2)).unwrap();
        ConnectionService::new(Arc::new(MemoryConnectionStore::new()), relay, hub)
    }

    #[tokio::test]
    async fn test_create_publishes_event() {
        let hub = EventHub::start(BroadcastConfig::default().without_greeting());
        let (writer, mut reader) = tokio::io::duplex(64 * 1024);
        let _stream = hub.open_subscriber_stream(writer).await;
        let service = service(Arc::clone(&hub));

        let created = service
            .create(NewConnection::new("orders", "http://a.test/src", "http://b.test/dst"))
            .await
            .unwrap();

        let events = read_events(&mut reader, 1).await;
        assert_eq!(events[0].kind, CONNECTION_CREATED);
        let payload = events[0].payload.as_ref().unwrap();
        assert_eq!(payload["connection_id"], created.id.to_string());
        assert_eq!(payload["name"], "orders");

        hub.shutdown().await;
    }

    #[tokio::test]
    async fn test_create_rejects_invalid() {
        let hub = EventHub::start(BroadcastConfig::default());
        let service = service(Arc::clone(&hub));

        let err = service
            .create(NewConnection::new("bad", "nope", "http://b.test/dst"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
        assert!(service.list().await.unwrap().is_empty());

        hub.shutdown().await;
    }

    #[tokio::test]
    async fn test_execute_counts_and_publishes() {
        let addr = upstream().await;
        let hub = EventHub::start(BroadcastConfig::default().without_greeting());
        let service = service(Arc::clone(&hub));

        let ok = service
            .create(NewConnection::new("ok", format!("http://{}/source", addr), format!("http://{}/ok", addr)))
            .await
            .unwrap();
        let bad = service
            .create(NewConnection::new("bad", format!("http://{}/source", addr), format!("http://{}/bad", addr)))
            .await
            .unwrap();

        let (writer, mut reader) = tokio::io::duplex(64 * 1024);
        let _stream = hub.open_subscriber_stream(writer).await;

        let report = service.execute(&ok.id.to_string()).await.unwrap();
        assert!(report.is_success());
        let report = service.execute(&bad.id.to_string()).await.unwrap();
        assert!(!report.is_success());

        let ok_stats = service.stats(&ok.id.to_string()).await.unwrap();
        assert_eq!((ok_stats.execution_count, ok_stats.success_count, ok_stats.error_count), (1, 1, 0));
        let bad_stats = service.stats(&bad.id.to_string()).await.unwrap();
        assert_eq!((bad_stats.execution_count, bad_stats.success_count, bad_stats.error_count), (1, 0, 1));

        let events = read_events(&mut reader, 2).await;
        assert!(events.iter().all(|e| e.kind == CONNECTION_EXECUTED));
        let first: &Value = events[0].payload.as_ref().unwrap();
        assert_eq!(first["connection_id"], ok.id.to_string());
        assert_eq!(first["success"], true);

        hub.shutdown().await;
    }

    #[tokio::test]
    async fn test_execute_transport_failure_counts_error() {
        let hub = EventHub::start(BroadcastConfig::default());
        let service = service(Arc::clone(&hub));

        let dead = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let conn = service
            .create(NewConnection::new("dead", format!("http://{}/x", dead), format!("http://{}/y", dead)))
            .await
            .unwrap();

        let err = service.execute(&conn.id.to_string()).await.unwrap_err();
        assert!(matches!(err, Error::Relay(_)));

        let stats = service.stats(&conn.id.to_string()).await.unwrap();
        assert_eq!(stats.execution_count, 1);
        assert_eq!(stats.error_count, 1);

        hub.shutdown().await;
    }

    #[tokio::test]
    async fn test_delete_and_unknown_ids() {
        let hub = EventHub::start(BroadcastConfig::default());
        let service = service(Arc::clone(&hub));
        let conn = service
            .create(NewConnection::new("gone", "http://a.test/x", "http://b.test/y"))
            .await
            .unwrap();

        service.delete(&conn.id.to_string()).await.unwrap();
        assert!(matches!(service.delete(&conn.id.to_string()).await, Err(Error::NotFound(_))));
        assert!(matches!(service.execute("missing").await, Err(Error::NotFound(_))));
        assert!(matches!(service.test("missing").await, Err(Error::NotFound(_))));
        assert!(matches!(service.stats("missing").await, Err(Error::NotFound(_))));

        hub.shutdown().await;
    }
}
