//! # relay-hub
//!
//! An HTTP endpoint relay with live event broadcasting.
//!
//! Connections pair a source URL with a destination URL; executing one fetches
//! from the source and forwards the body to the destination. Every create,
//! execute, test and delete is published to subscribers of the
//! server-sent-event stream at `GET /events`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use relay_hub::connections::MemoryConnectionStore;
//! use relay_hub::events::BroadcastConfig;
//! use relay_hub::server::{RelayServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> relay_hub::Result<()> {
//!     let server = RelayServer::new(
//!         ServerConfig::default(),
//!         BroadcastConfig::default(),
//!         Arc::new(MemoryConnectionStore::new()),
//!     )?;
//!
//!     server
//!         .run_until(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await
//! }
//! ```

pub mod connections;
pub mod error;
pub mod events;
pub mod server;
pub mod settings;
pub mod stats;

pub use error::{Error, Result};
pub use events::{BroadcastConfig, Event, EventHub};
pub use server::{RelayServer, ServerConfig};
pub use settings::Settings;
