//! Broadcast configuration

use std::time::Duration;

/// Configuration for the event hub and its dispatcher
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    /// How long the dispatcher waits for an event before running maintenance.
    /// Also the upper bound on broadcast latency.
    pub poll_interval: Duration,

    /// Streams with no successful send for longer than this are reaped
    /// without a write attempt
    pub idle_timeout: Duration,

    /// Interval of the per-subscriber keep-alive loop run by the owning task
    pub keepalive_interval: Duration,

    /// Maximum time a single frame write may take before the stream is
    /// considered broken
    pub write_timeout: Duration,

    /// Send a `connected` frame when a subscriber stream is opened
    pub send_greeting: bool,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            idle_timeout: Duration::from_secs(300),
            keepalive_interval: Duration::from_secs(5),
            write_timeout: Duration::from_secs(10),
            send_greeting: true,
        }
    }
}

impl BroadcastConfig {
    /// Set the dispatcher poll interval
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the keep-alive interval
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Set the per-frame write timeout
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Disable the `connected` greeting frame
    pub fn without_greeting(mut self) -> Self {
        self.send_greeting = false;
        self
    }
}
