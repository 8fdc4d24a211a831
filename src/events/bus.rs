//! Event bus between producers and the dispatcher
//!
//! An unbounded `tokio::sync::mpsc` channel. Producers hold cheap clones of
//! [`EventBus`]; the single [`EventReceiver`] is owned by the dispatcher,
//! which is the one place events are fanned out to subscribers. Having more
//! than one consumer would split events between them instead of
//! broadcasting, so the receiving half is deliberately not `Clone`.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::event::Event;

/// Result of waiting on the bus
#[derive(Debug)]
pub enum Next {
    /// Oldest unconsumed event
    Event(Event),
    /// Nothing arrived within the timeout
    Idle,
    /// Bus closed and fully drained
    Closed,
}

/// Create a connected bus/receiver pair
pub fn channel() -> (EventBus, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let pending = Arc::new(AtomicUsize::new(0));

    (
        EventBus {
            tx,
            pending: Arc::clone(&pending),
            next_sequence: Arc::new(AtomicU64::new(1)),
        },
        EventReceiver { rx, pending },
    )
}

/// Producer side of the bus
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: mpsc::UnboundedSender<Event>,
    pending: Arc<AtomicUsize>,
    next_sequence: Arc<AtomicU64>,
}

impl EventBus {
    /// Enqueue an event, stamping it with the next sequence number
    ///
    /// Never blocks. Once the bus is closed the event is dropped; producers
    /// are never told, since delivery is fire-and-forget anyway.
    pub fn publish(&self, mut event: Event) {
        event.sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        self.pending.fetch_add(1, Ordering::Relaxed);

        if let Err(mpsc::error::SendError(event)) = self.tx.send(event) {
            self.pending.fetch_sub(1, Ordering::Relaxed);
            tracing::debug!(kind = %event.kind, "Event dropped, bus closed");
        }
    }

    /// Sequence number the next published event will carry
    ///
    /// A subscriber registered now must only see events at or after it.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence.load(Ordering::SeqCst)
    }

    /// Number of events published but not yet taken by the dispatcher
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    /// Whether the receiving side has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side of the bus
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<Event>,
    pending: Arc<AtomicUsize>,
}

impl EventReceiver {
    /// Wait up to `timeout` for the next event
    pub async fn next_or_timeout(&mut self, timeout: Duration) -> Next {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(event)) => {
                self.pending.fetch_sub(1, Ordering::Relaxed);
                Next::Event(event)
            }
            Ok(None) => Next::Closed,
            Err(_) => Next::Idle,
        }
    }

    /// Take an already queued event without waiting
    pub fn try_next(&mut self) -> Option<Event> {
        let event = self.rx.try_recv().ok()?;
        self.pending.fetch_sub(1, Ordering::Relaxed);
        Some(event)
    }

    /// Stop accepting new events; queued ones can still be drained
    pub fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_fifo_order() {
        let (bus, mut rx) = channel();

        for i in 0..5 {
            bus.publish(Event::new("n", json!(i)));
        }
        assert_eq!(bus.pending(), 5);

        for i in 0..5 {
            match rx.next_or_timeout(Duration::from_millis(100)).await {
                Next::Event(event) => assert_eq!(event.payload, Some(json!(i))),
                other => panic!("expected event, got {:?}", other),
            }
        }
        assert_eq!(bus.pending(), 0);
    }

    #[tokio::test]
    async fn test_publish_assigns_increasing_sequence() {
        let (bus, mut rx) = channel();
        assert_eq!(bus.next_sequence(), 1);

        bus.publish(Event::new("a", json!(null)));
        bus.clone().publish(Event::new("b", json!(null)));
        assert_eq!(bus.next_sequence(), 3);

        assert_eq!(rx.try_next().unwrap().sequence, 1);
        assert_eq!(rx.try_next().unwrap().sequence, 2);
    }

    #[tokio::test]
    async fn test_timeout_returns_idle() {
        let (_bus, mut rx) = channel();

        let next = rx.next_or_timeout(Duration::from_millis(20)).await;
        assert!(matches!(next, Next::Idle));
    }

    #[tokio::test]
    async fn test_closed_when_producers_gone() {
        let (bus, mut rx) = channel();
        bus.publish(Event::new("last", json!(null)));
        drop(bus);

        assert!(matches!(
            rx.next_or_timeout(Duration::from_millis(20)).await,
            Next::Event(_)
        ));
        assert!(matches!(
            rx.next_or_timeout(Duration::from_millis(20)).await,
            Next::Closed
        ));
    }

    #[tokio::test]
    async fn test_publish_after_close_is_dropped() {
        let (bus, mut rx) = channel();
        bus.publish(Event::new("queued", json!(1)));
        rx.close();

        bus.publish(Event::new("late", json!(2)));
        assert!(bus.is_closed());
        assert_eq!(bus.pending(), 1);

        let drained = rx.try_next().unwrap();
        assert_eq!(drained.kind, "queued");
        assert!(rx.try_next().is_none());
        assert_eq!(bus.pending(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_producers() {
        let (bus, mut rx) = channel();

        let mut handles = Vec::new();
        for p in 0..4 {
            let bus = bus.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..25 {
                    bus.publish(Event::new("n", json!({"p": p, "i": i})));
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Per-producer order is preserved
        let mut last = [-1i64; 4];
        let mut count = 0;
        while let Some(event) = rx.try_next() {
            let payload = event.payload.unwrap();
            let p = payload["p"].as_u64().unwrap() as usize;
            let i = payload["i"].as_i64().unwrap();
            assert!(i > last[p]);
            last[p] = i;
            count += 1;
        }
        assert_eq!(count, 100);
    }
}
