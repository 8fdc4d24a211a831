//! Event hub
//!
//! Owns the bus, the registry and the dispatcher task. Built once at process
//! start and handed to request handlers as `Arc<EventHub>`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::io::AsyncWrite;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::bus::{self, EventBus};
use super::config::BroadcastConfig;
use super::dispatcher::Dispatcher;
use super::event::Event;
use super::store::StreamRegistry;
use super::subscriber::{StreamStats, SubscriberStream};

/// Broadcast service: publish events, open subscriber streams
pub struct EventHub {
    bus: EventBus,
    registry: Arc<StreamRegistry>,
    config: BroadcastConfig,
    next_stream_id: AtomicU64,
    shutdown: CancellationToken,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl EventHub {
    /// Build the hub and spawn its dispatcher
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: BroadcastConfig) -> Arc<Self> {
        let (bus, rx) = bus::channel();
        let registry = Arc::new(StreamRegistry::new());
        let shutdown = CancellationToken::new();

        let handle = Dispatcher::new(rx, Arc::clone(&registry), config.clone(), shutdown.clone()).spawn();

        Arc::new(Self {
            bus,
            registry,
            config,
            next_stream_id: AtomicU64::new(1),
            shutdown,
            dispatcher: Mutex::new(Some(handle)),
        })
    }

    /// Hub configuration
    pub fn config(&self) -> &BroadcastConfig {
        &self.config
    }

    /// The subscriber registry
    pub fn registry(&self) -> &Arc<StreamRegistry> {
        &self.registry
    }

    /// Publish an event of `kind` carrying `payload`
    ///
    /// Fire-and-forget: always returns immediately.
    pub fn publish_event(&self, kind: impl Into<String>, payload: Value) {
        self.publish(Event::new(kind, payload));
    }

    /// Publish a prebuilt event
    pub fn publish(&self, event: Event) {
        self.bus.publish(event);
    }

    /// Take ownership of `writer` as a new subscriber stream
    ///
    /// The `connected` greeting (if enabled) is written before the stream is
    /// registered, so it is always the first frame the client sees. A stream
    /// whose greeting fails is returned already closed and never registered.
    pub async fn open_subscriber_stream<W>(&self, writer: W) -> Arc<SubscriberStream>
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let id = self.next_stream_id.fetch_add(1, Ordering::Relaxed);
        let stream = Arc::new(SubscriberStream::new(id, writer, self.config.write_timeout));

        if self.config.send_greeting && !stream.send(&Event::connected()).await.is_delivered() {
            tracing::debug!(stream_id = id, "Greeting failed, stream not registered");
            return stream;
        }

        if self.shutdown.is_cancelled() {
            stream.close().await;
            return stream;
        }

        self.register(&stream).await;
        stream
    }

    async fn register(&self, stream: &Arc<SubscriberStream>) {
        stream.start_at(self.bus.next_sequence());
        self.registry.add(Arc::clone(stream)).await;

        // Shutdown may have drained the registry before the add landed
        if self.shutdown.is_cancelled() {
            self.close_subscriber_stream(stream).await;
        }
    }

    /// Close a stream and drop it from the registry
    ///
    /// The owning request handler's exit path. Safe to call more than once.
    pub async fn close_subscriber_stream(&self, stream: &SubscriberStream) {
        stream.close().await;
        self.registry.remove(stream).await;
    }

    /// Number of registered subscriber streams
    pub async fn registry_size(&self) -> usize {
        self.registry.size().await
    }

    /// Per-stream statistics
    pub async fn stream_stats(&self) -> Vec<StreamStats> {
        self.registry.stats().await
    }

    /// Events published but not yet dispatched
    pub fn pending_events(&self) -> usize {
        self.bus.pending()
    }

    /// Whether the dispatcher is still consuming events
    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled() && !self.bus.is_closed()
    }

    /// Resolves once shutdown has been requested
    pub async fn stopped(&self) {
        self.shutdown.cancelled().await
    }

    /// Stop the dispatcher and close every stream
    ///
    /// Queued events are still delivered before streams are closed.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let handle = self.dispatcher.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Dispatcher task failed");
            }
        }
    }
}
