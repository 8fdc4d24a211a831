//! Event broadcasting to long-lived subscriber streams
//!
//! Producers publish [`Event`]s onto the [`EventBus`]; a single
//! [`Dispatcher`] task drains it and writes each event to every stream in the
//! [`StreamRegistry`], reaping streams whose writes fail. When no event
//! arrives within the poll interval the dispatcher heartbeats every stream
//! instead, and reaps those idle past the timeout.
//!
//! # Architecture
//!
//! ```text
//!    [create/execute/test/delete]              [GET /events]
//!               │                                    │
//!               ▼                                    ▼
//!       EventHub::publish_event()      EventHub::open_subscriber_stream()
//!               │                                    │
//!               ▼                                    ▼
//!         EventBus (mpsc) ──► Dispatcher ──► StreamRegistry { id → SubscriberStream }
//!                              │    ▲                         │
//!                              │    └── heartbeat / reap ─────┤
//!                              └── send(event) ───────────────┴──► writer ──► client
//! ```
//!
//! [`EventHub`] bundles the pieces into one owned service object; there is no
//! global state.

pub mod bus;
pub mod config;
pub mod dispatcher;
pub mod event;
pub mod hub;
pub mod store;
pub mod subscriber;

pub use bus::{EventBus, EventReceiver, Next};
pub use config::BroadcastConfig;
pub use dispatcher::{Dispatcher, PassReport};
pub use event::Event;
pub use hub::EventHub;
pub use store::StreamRegistry;
pub use subscriber::{SendOutcome, StreamState, StreamStats, SubscriberStream};
