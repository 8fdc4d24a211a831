//! Connection storage
//!
//! The relay only needs get/list/create/update-counters/delete by id, so
//! storage sits behind [`ConnectionStore`]. [`MemoryConnectionStore`] keeps
//! records in process memory.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::model::{Connection, NewConnection};

/// Error type for store operations
#[derive(Debug, Clone)]
pub enum StoreError {
    /// No connection with this id
    NotFound(String),
    /// Backend failure
    Backend(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "Connection not found: {}", id),
            StoreError::Backend(msg) => write!(f, "Store backend error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

/// Persistence for connection records
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Insert a new connection
    async fn create(&self, new: NewConnection) -> Result<Connection, StoreError>;

    /// Fetch one connection
    async fn get(&self, id: &str) -> Result<Connection, StoreError>;

    /// All connections, newest first
    async fn list(&self) -> Result<Vec<Connection>, StoreError>;

    /// Count one execution and return the updated record
    async fn record_execution(&self, id: &str, succeeded: bool) -> Result<Connection, StoreError>;

    /// Delete a connection
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}

/// In-memory store
pub struct MemoryConnectionStore {
    connections: RwLock<HashMap<Uuid, Connection>>,
}

impl MemoryConnectionStore {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryConnectionStore {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_id(id: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(id).map_err(|_| StoreError::NotFound(id.to_string()))
}

#[async_trait]
impl ConnectionStore for MemoryConnectionStore {
    async fn create(&self, new: NewConnection) -> Result<Connection, StoreError> {
        let connection = Connection::create(new);
        self.connections
            .write()
            .await
            .insert(connection.id, connection.clone());

        tracing::debug!(connection_id = %connection.id, name = %connection.name, "Connection stored");
        Ok(connection)
    }

    async fn get(&self, id: &str) -> Result<Connection, StoreError> {
        let key = parse_id(id)?;
        self.connections
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn list(&self) -> Result<Vec<Connection>, StoreError> {
        let mut connections: Vec<Connection> =
            self.connections.read().await.values().cloned().collect();
        connections.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(connections)
    }

    async fn record_execution(&self, id: &str, succeeded: bool) -> Result<Connection, StoreError> {
        let key = parse_id(id)?;
        let mut connections = self.connections.write().await;
        let connection = connections
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        connection.record_execution(succeeded);
        Ok(connection.clone())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let key = parse_id(id)?;
        match self.connections.write().await.remove(&key) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }
}
