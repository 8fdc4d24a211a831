//! Subscriber stream
//!
//! One long-lived outbound stream to a client. The stream exclusively owns
//! its writer; every write, and every change to its health state, happens
//! under the stream's own lock so a `send` and a concurrent `close` never
//! interleave.
//!
//! ```text
//!   Open ──(send ok)──► Open
//!     │
//!     ├──(send failed / write timeout)──► Closed
//!     └──(close)────────────────────────► Closed   (terminal)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::event::Event;

/// Boxed writer owned by a stream
pub type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Lifecycle state of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Accepting writes
    Open,
    /// Terminal; no further writes are attempted
    Closed,
}

/// Result of a write attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Frame written and flushed
    Delivered,
    /// Stream was already closed, nothing written
    Closed,
    /// Write failed; the stream is now closed
    Failed,
}

impl SendOutcome {
    /// Whether the frame reached the transport
    pub fn is_delivered(self) -> bool {
        self == SendOutcome::Delivered
    }
}

struct Inner {
    writer: Option<BoxWriter>,
    state: StreamState,
    last_heartbeat_at: Instant,
    events_sent: u64,
}

/// A single subscriber's outbound stream
pub struct SubscriberStream {
    id: u64,
    created_at: Instant,
    created_wall: DateTime<Utc>,
    write_timeout: Duration,
    inner: Mutex<Inner>,
    /// First bus sequence this stream may receive
    first_sequence: AtomicU64,
    /// Cancelled exactly once, when the stream transitions to `Closed`
    closed: CancellationToken,
}

impl SubscriberStream {
    /// Wrap a writer in a new open stream
    pub fn new<W>(id: u64, writer: W, write_timeout: Duration) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let now = Instant::now();

        Self {
            id,
            created_at: now,
            created_wall: Utc::now(),
            write_timeout,
            inner: Mutex::new(Inner {
                writer: Some(Box::new(writer)),
                state: StreamState::Open,
                last_heartbeat_at: now,
                events_sent: 0,
            }),
            first_sequence: AtomicU64::new(0),
            closed: CancellationToken::new(),
        }
    }

    /// Only deliver events published at or after `sequence`
    pub fn start_at(&self, sequence: u64) {
        self.first_sequence.store(sequence, Ordering::SeqCst);
    }

    /// Whether `event` was published after this stream joined
    pub fn wants(&self, event: &Event) -> bool {
        event.sequence >= self.first_sequence.load(Ordering::SeqCst)
    }

    /// Stream identifier, unique within one hub
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Write an event frame
    ///
    /// Counts towards `events_sent` on success.
    pub async fn send(&self, event: &Event) -> SendOutcome {
        self.write_event(event, true).await
    }

    /// Write a heartbeat frame
    ///
    /// Refreshes `last_heartbeat_at` on success but is not a counted message.
    pub async fn send_heartbeat(&self) -> SendOutcome {
        self.write_event(&Event::heartbeat(), false).await
    }

    async fn write_event(&self, event: &Event, counted: bool) -> SendOutcome {
        let mut inner = self.inner.lock().await;

        if inner.state == StreamState::Closed {
            return SendOutcome::Closed;
        }

        let frame = match event.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(stream_id = self.id, kind = %event.kind, error = %e, "Failed to encode frame");
                self.mark_closed(&mut inner);
                return SendOutcome::Failed;
            }
        };

        let Some(writer) = inner.writer.as_mut() else {
            self.mark_closed(&mut inner);
            return SendOutcome::Closed;
        };

        let write = async {
            writer.write_all(&frame).await?;
            writer.flush().await
        };

        match tokio::time::timeout(self.write_timeout, write).await {
            Ok(Ok(())) => {
                inner.last_heartbeat_at = Instant::now();
                if counted {
                    inner.events_sent += 1;
                }
                SendOutcome::Delivered
            }
            Ok(Err(e)) => {
                tracing::debug!(stream_id = self.id, kind = %event.kind, error = %e, "Subscriber stream broken");
                self.mark_closed(&mut inner);
                SendOutcome::Failed
            }
            Err(_) => {
                tracing::debug!(
                    stream_id = self.id,
                    kind = %event.kind,
                    timeout_ms = self.write_timeout.as_millis() as u64,
                    "Subscriber write timed out"
                );
                self.mark_closed(&mut inner);
                SendOutcome::Failed
            }
        }
    }

    /// Close the stream without writing
    ///
    /// Idempotent. Drops the writer so the client sees end-of-stream.
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;

        if inner.state == StreamState::Open {
            self.mark_closed(&mut inner);
            tracing::debug!(stream_id = self.id, "Subscriber stream closed");
        }
    }

    fn mark_closed(&self, inner: &mut Inner) {
        inner.state = StreamState::Closed;
        inner.writer = None;
        self.closed.cancel();
    }

    /// Whether the stream is still open
    ///
    /// Lock-free; may lag an in-flight close by the duration of that call.
    pub fn is_active(&self) -> bool {
        !self.closed.is_cancelled()
    }

    /// Resolves once the stream is closed
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    /// Time of the last successful write (or creation)
    pub async fn last_heartbeat_at(&self) -> Instant {
        self.inner.lock().await.last_heartbeat_at
    }

    /// Whether nothing was written successfully for longer than `threshold`
    pub async fn is_idle(&self, now: Instant, threshold: Duration) -> bool {
        now.saturating_duration_since(self.last_heartbeat_at().await) > threshold
    }

    /// Snapshot of the stream's counters
    pub async fn stats(&self) -> StreamStats {
        let inner = self.inner.lock().await;
        let since_created = inner.last_heartbeat_at.duration_since(self.created_at);

        StreamStats {
            id: self.id,
            active: inner.state == StreamState::Open,
            created_at: self.created_wall,
            last_heartbeat_at: self.created_wall
                + chrono::Duration::from_std(since_created).unwrap_or_else(|_| chrono::Duration::zero()),
            events_sent: inner.events_sent,
            age: self.created_at.elapsed(),
        }
    }
}

impl std::fmt::Debug for SubscriberStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberStream")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Per-stream statistics, as reported by the status endpoint
#[derive(Debug, Clone)]
pub struct StreamStats {
    /// Stream identifier
    pub id: u64,
    /// Whether the stream is open
    pub active: bool,
    /// Wall-clock creation time
    pub created_at: DateTime<Utc>,
    /// Wall-clock time of the last successful write
    pub last_heartbeat_at: DateTime<Utc>,
    /// Counted events delivered (heartbeats excluded)
    pub events_sent: u64,
    /// Time since creation
    pub age: Duration,
}
