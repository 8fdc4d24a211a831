//! Broadcast dispatcher
//!
//! A single background task owns both fan-out and maintenance:
//!
//! ```text
//!   loop {
//!       next_or_timeout(poll_interval)
//!         ├─ Event  → snapshot → send to every stream → reap failures
//!         ├─ Idle   → snapshot → idle? reap : heartbeat → reap failures
//!         └─ Closed → exit
//!   }
//! ```
//!
//! Maintenance piggybacks on the poll timeout, so broadcasting and reaping
//! never race each other for the registry.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::join_all;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::bus::{EventReceiver, Next};
use super::config::BroadcastConfig;
use super::event::Event;
use super::store::StreamRegistry;
use super::subscriber::{SendOutcome, SubscriberStream};

/// Result of one broadcast or maintenance pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Streams that accepted the write
    pub live: usize,
    /// Streams removed from the registry during the pass
    pub removed: usize,
}

/// Drains the event bus and maintains the stream registry
pub struct Dispatcher {
    rx: EventReceiver,
    registry: Arc<StreamRegistry>,
    config: BroadcastConfig,
    shutdown: CancellationToken,
}

impl Dispatcher {
    /// Create a dispatcher over an event receiver and a registry
    pub fn new(
        rx: EventReceiver,
        registry: Arc<StreamRegistry>,
        config: BroadcastConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            rx,
            registry,
            config,
            shutdown,
        }
    }

    /// Spawn the dispatch loop onto the runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run until the shutdown token fires or every producer is gone
    pub async fn run(mut self) {
        tracing::info!(
            poll_ms = self.config.poll_interval.as_millis() as u64,
            idle_timeout_secs = self.config.idle_timeout.as_secs(),
            "Dispatcher started"
        );

        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                next = self.rx.next_or_timeout(self.config.poll_interval) => next,
            };

            match next {
                Next::Event(event) => {
                    self.broadcast(&event).await;
                }
                Next::Idle => {
                    self.maintain().await;
                }
                Next::Closed => {
                    tracing::info!("Event bus closed");
                    break;
                }
            }
        }

        self.stop().await;
    }

    /// Send one event to every registered stream and reap the failures
    ///
    /// Streams that registered after the event was published are skipped.
    pub async fn broadcast(&self, event: &Event) -> PassReport {
        let snapshot: Vec<Arc<SubscriberStream>> = self
            .registry
            .snapshot()
            .await
            .into_iter()
            .filter(|stream| stream.wants(event))
            .collect();

        let delivered = join_all(
            snapshot
                .iter()
                .map(|stream| isolated(stream, "broadcast", stream.send(event))),
        )
        .await;

        let report = self.reap(&snapshot, &delivered).await;

        tracing::info!(
            kind = %event.kind,
            live = report.live,
            removed = report.removed,
            "Broadcast event"
        );

        report
    }

    /// Heartbeat every registered stream, reaping idle and failed ones
    pub async fn maintain(&self) -> PassReport {
        let snapshot = self.registry.snapshot().await;
        let now = Instant::now();
        let idle_timeout = self.config.idle_timeout;

        let alive = join_all(snapshot.iter().map(|stream| async move {
            if stream.is_idle(now, idle_timeout).await {
                tracing::info!(
                    stream_id = stream.id(),
                    idle_timeout_secs = idle_timeout.as_secs(),
                    "Subscriber timed out"
                );
                stream.close().await;
                return false;
            }

            isolated(stream, "heartbeat", stream.send_heartbeat()).await
        }))
        .await;

        let report = self.reap(&snapshot, &alive).await;

        if report.live > 0 || report.removed > 0 {
            tracing::debug!(
                live = report.live,
                removed = report.removed,
                "Maintenance pass"
            );
        }

        report
    }

    async fn reap(&self, snapshot: &[Arc<SubscriberStream>], alive: &[bool]) -> PassReport {
        let mut report = PassReport::default();

        for (stream, ok) in snapshot.iter().zip(alive) {
            if *ok {
                report.live += 1;
            } else if self.registry.remove(stream).await {
                report.removed += 1;
            }
        }

        report
    }

    async fn stop(&mut self) {
        self.rx.close();

        let mut drained = 0usize;
        while let Some(event) = self.rx.try_next() {
            self.broadcast(&event).await;
            drained += 1;
        }

        let streams = self.registry.drain().await;
        for stream in &streams {
            stream.close().await;
        }

        tracing::info!(
            drained_events = drained,
            closed_streams = streams.len(),
            "Dispatcher stopped"
        );
    }
}

/// Run one stream's write, turning a panic into a failed write
///
/// A bug in one stream must not take the dispatch loop down with it.
async fn isolated<F>(stream: &SubscriberStream, duty: &'static str, write: F) -> bool
where
    F: Future<Output = SendOutcome>,
{
    match AssertUnwindSafe(write).catch_unwind().await {
        Ok(outcome) => outcome.is_delivered(),
        Err(_) => {
            tracing::error!(stream_id = stream.id(), duty, "Subscriber write panicked");
            stream.close().await;
            false
        }
    }
}
