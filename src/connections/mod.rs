//! Relay connections
//!
//! A connection pairs a source endpoint with a destination endpoint. Executing
//! it fetches from the source and forwards the body to the destination.

pub mod model;
pub mod relay;
pub mod service;
pub mod store;

pub use model::{Connection, NewConnection};
pub use relay::{HttpRelay, Probe, RelayError, RelayReport, TestReport};
pub use service::ConnectionService;
pub use store::{ConnectionStore, MemoryConnectionStore, StoreError};
