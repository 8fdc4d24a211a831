//! Stream registry implementation
//!
//! The set of subscriber streams currently receiving broadcasts. Request
//! handlers add streams as clients connect and remove them on their exit
//! path; the dispatcher takes snapshots and removes the streams it found dead.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::subscriber::{StreamStats, SubscriberStream};

/// Registry of active subscriber streams
///
/// Thread-safe via `RwLock`. Per-stream I/O never happens under the registry
/// lock: callers iterate a [`snapshot`](Self::snapshot), so a slow client
/// cannot hold up registration of others.
pub struct StreamRegistry {
    /// Map of stream id to stream
    streams: RwLock<HashMap<u64, Arc<SubscriberStream>>>,
}

impl StreamRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
        }
    }

    /// Register a stream
    pub async fn add(&self, stream: Arc<SubscriberStream>) {
        let id = stream.id();
        let size = {
            let mut streams = self.streams.write().await;
            streams.insert(id, stream);
            streams.len()
        };

        tracing::info!(stream_id = id, subscribers = size, "Subscriber added");
    }

    /// Remove a stream
    ///
    /// Removing a stream that is not registered is a no-op. Returns whether
    /// the stream was present.
    pub async fn remove(&self, stream: &SubscriberStream) -> bool {
        self.remove_id(stream.id()).await
    }

    /// Remove a stream by id
    pub async fn remove_id(&self, id: u64) -> bool {
        let (removed, size) = {
            let mut streams = self.streams.write().await;
            let removed = streams.remove(&id).is_some();
            (removed, streams.len())
        };

        if removed {
            tracing::debug!(stream_id = id, subscribers = size, "Subscriber removed");
        }

        removed
    }

    /// Point-in-time copy of the registered streams
    pub async fn snapshot(&self) -> Vec<Arc<SubscriberStream>> {
        self.streams.read().await.values().cloned().collect()
    }

    /// Number of registered streams
    pub async fn size(&self) -> usize {
        self.streams.read().await.len()
    }

    /// Whether a stream with this id is registered
    pub async fn contains(&self, id: u64) -> bool {
        self.streams.read().await.contains_key(&id)
    }

    /// Per-stream statistics, ordered by stream id
    pub async fn stats(&self) -> Vec<StreamStats> {
        let mut snapshot = self.snapshot().await;
        snapshot.sort_by_key(|s| s.id());

        let mut stats = Vec::with_capacity(snapshot.len());
        for stream in snapshot {
            stats.push(stream.stats().await);
        }
        stats
    }

    /// Remove and return every registered stream
    pub(super) async fn drain(&self) -> Vec<Arc<SubscriberStream>> {
        self.streams.write().await.drain().map(|(_, s)| s).collect()
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}
