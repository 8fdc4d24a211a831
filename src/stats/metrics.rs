//! Statistics for connections and subscriber streams

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::connections::Connection;
use crate::events::{EventHub, StreamStats};

/// Execution statistics for one connection
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStats {
    pub id: Uuid,
    pub name: String,
    pub source_url: String,
    pub dest_url: String,
    pub created_at: DateTime<Utc>,
    pub last_executed: Option<DateTime<Utc>>,
    pub execution_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    /// Percentage of successful executions, one decimal
    pub success_rate: f64,
}

impl ConnectionStats {
    /// Calculate success rate as a percentage rounded to one decimal
    pub fn success_rate(success_count: u64, execution_count: u64) -> f64 {
        if execution_count == 0 {
            return 0.0;
        }
        let rate = success_count as f64 * 100.0 / execution_count as f64;
        (rate * 10.0).round() / 10.0
    }
}

impl From<&Connection> for ConnectionStats {
    fn from(conn: &Connection) -> Self {
        Self {
            id: conn.id,
            name: conn.name.clone(),
            source_url: conn.source_url.clone(),
            dest_url: conn.dest_url.clone(),
            created_at: conn.created_at,
            last_executed: conn.last_executed,
            execution_count: conn.execution_count,
            success_count: conn.success_count,
            error_count: conn.error_count,
            success_rate: Self::success_rate(conn.success_count, conn.execution_count),
        }
    }
}

impl std::fmt::Display for ConnectionStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Connection Statistics:")?;
        writeln!(f, "ID: {}", self.id)?;
        writeln!(f, "Name: {}", self.name)?;
        writeln!(f, "Source URL: {}", self.source_url)?;
        writeln!(f, "Destination URL: {}", self.dest_url)?;
        writeln!(f, "Created: {}", self.created_at.to_rfc3339())?;
        match self.last_executed {
            Some(at) => writeln!(f, "Last Executed: {}", at.to_rfc3339())?,
            None => writeln!(f, "Last Executed: Never")?,
        }
        writeln!(f, "Total Executions: {}", self.execution_count)?;
        writeln!(f, "Successful Executions: {}", self.success_count)?;
        writeln!(f, "Failed Executions: {}", self.error_count)?;
        write!(f, "Success Rate: {:.1}%", self.success_rate)
    }
}

/// One subscriber stream as shown by the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct SubscriberStatus {
    pub id: u64,
    pub active: bool,
    pub age_seconds: f64,
    pub events_sent: u64,
    pub last_heartbeat: DateTime<Utc>,
}

impl From<StreamStats> for SubscriberStatus {
    fn from(stats: StreamStats) -> Self {
        Self {
            id: stats.id,
            active: stats.active,
            age_seconds: stats.age.as_secs_f64(),
            events_sent: stats.events_sent,
            last_heartbeat: stats.last_heartbeat_at,
        }
    }
}

/// Server-wide broadcast status
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Registered subscriber streams
    pub active_sse_connections: usize,
    /// Events published but not yet dispatched
    pub total_events_queued: usize,
    /// Whether the dispatcher task is running
    pub dispatcher_alive: bool,
    pub timestamp: DateTime<Utc>,
    pub connections: Vec<SubscriberStatus>,
}

impl StatusReport {
    /// Collect the current status from a hub
    pub async fn collect(hub: &EventHub) -> Self {
        let connections: Vec<SubscriberStatus> = hub
            .stream_stats()
            .await
            .into_iter()
            .map(SubscriberStatus::from)
            .collect();

        Self {
            active_sse_connections: connections.len(),
            total_events_queued: hub.pending_events(),
            dispatcher_alive: hub.is_running(),
            timestamp: Utc::now(),
            connections,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::connections::NewConnection;
    use crate::events::BroadcastConfig;

    #[test]
    fn test_success_rate() {
        assert_eq!(ConnectionStats::success_rate(0, 0), 0.0);
        assert_eq!(ConnectionStats::success_rate(3, 3), 100.0);
        assert_eq!(ConnectionStats::success_rate(1, 3), 33.3);
        assert_eq!(ConnectionStats::success_rate(2, 3), 66.7);
    }

    #[test]
    fn test_connection_stats_from_record() {
        let mut conn = Connection::create(NewConnection::new("n", "http://a/x", "http://b/y"));
        conn.record_execution(true);
        conn.record_execution(false);

        let stats = ConnectionStats::from(&conn);
        assert_eq!(stats.id, conn.id);
        assert_eq!(stats.execution_count, 2);
        assert_eq!(stats.success_rate, 50.0);
        assert!(stats.last_executed.is_some());
    }

    #[test]
    fn test_connection_stats_text() {
        let mut conn = Connection::create(NewConnection::new("orders", "http://a/x", "http://b/y"));
        let text = ConnectionStats::from(&conn).to_string();
        assert!(text.contains("Name: orders"));
        assert!(text.contains("Last Executed: Never"));
        assert!(text.ends_with("Success Rate: 0.0%"));

        conn.record_execution(true);
        conn.record_execution(true);
        conn.record_execution(false);
        let text = ConnectionStats::from(&conn).to_string();
        assert!(text.contains("Total Executions: 3"));
        assert!(text.contains("Failed Executions: 1"));
        assert!(text.ends_with("Success Rate: 66.7%"));
        assert!(!text.contains("Never"));
    }

    #[test]
    fn test_subscriber_status_from_stream_stats() {
        let now = Utc::now();
        let status = SubscriberStatus::from(StreamStats {
            id: 4,
            active: true,
            created_at: now,
            last_heartbeat_at: now,
            events_sent: 9,
            age: Duration::from_millis(1500),
        });

        assert_eq!(status.id, 4);
        assert_eq!(status.age_seconds, 1.5);
        assert_eq!(status.events_sent, 9);
    }

    #[tokio::test]
    async fn test_status_report_collect() {
        let hub = EventHub::start(BroadcastConfig::default().without_greeting());
        let _a = hub.open_subscriber_stream(tokio::io::sink()).await;
        let _b = hub.open_subscriber_stream(tokio::io::sink()).await;

        let report = StatusReport::collect(&hub).await;
        assert_eq!(report.active_sse_connections, 2);
        assert!(report.dispatcher_alive);
        assert_eq!(report.connections.len(), 2);
        assert!(report.connections.iter().all(|c| c.active));

        hub.shutdown().await;
        let report = StatusReport::collect(&hub).await;
        assert!(!report.dispatcher_alive);
        assert_eq!(report.active_sse_connections, 0);
    }
}
