//! Statistics reported by the HTTP surface

pub mod metrics;

pub use metrics::{ConnectionStats, StatusReport, SubscriberStatus};
