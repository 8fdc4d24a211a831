//! Outbound relaying
//!
//! Executing a connection issues the source request, passes the body through
//! the mapping step, and sends the result to the destination. Testing a
//! connection probes both endpoints independently.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder};
use serde_json::{json, Value};

use super::model::Connection;

/// Which leg of a relay failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leg {
    Source,
    Destination,
}

impl std::fmt::Display for Leg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Leg::Source => write!(f, "source"),
            Leg::Destination => write!(f, "destination"),
        }
    }
}

/// Error type for relay operations
#[derive(Debug)]
pub enum RelayError {
    /// HTTP client could not be built
    Client(String),
    /// Stored method does not parse
    InvalidMethod(String),
    /// Stored header name or value is invalid
    InvalidHeader(String),
    /// Request on one leg failed at the transport level
    Request { leg: Leg, message: String },
}

impl std::fmt::Display for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayError::Client(msg) => write!(f, "HTTP client error: {}", msg),
            RelayError::InvalidMethod(method) => write!(f, "Invalid method: {}", method),
            RelayError::InvalidHeader(header) => write!(f, "Invalid header: {}", header),
            RelayError::Request { leg, message } => {
                write!(f, "{} request failed: {}", leg, message)
            }
        }
    }
}

impl std::error::Error for RelayError {}

/// Body carried from source to destination
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Text(String),
}

/// Apply a connection's mapping rules to a payload
///
/// Rules are stored but not interpreted yet; the payload passes through.
pub fn apply_mapping(_rules: &[Value], payload: Payload) -> Payload {
    payload
}

/// Statuses observed while executing a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayReport {
    pub source_status: u16,
    pub dest_status: u16,
}

impl RelayReport {
    /// A relay succeeds when the destination answers below 400
    pub fn is_success(&self) -> bool {
        self.dest_status < 400
    }
}

impl std::fmt::Display for RelayReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Connection executed successfully. Source status: {}, Destination status: {}",
            self.source_status, self.dest_status
        )
    }
}

/// Result of probing one endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Status(u16),
    Error(String),
}

impl Probe {
    pub fn is_ok(&self) -> bool {
        matches!(self, Probe::Status(code) if *code < 400)
    }
}

impl std::fmt::Display for Probe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Probe::Status(code) if *code < 400 => write!(f, "{} - OK", code),
            Probe::Status(code) => write!(f, "{} - ERROR", code),
            Probe::Error(msg) => write!(f, "ERROR - {}", msg),
        }
    }
}

/// Results of testing both endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestReport {
    pub source: Probe,
    pub destination: Probe,
}

impl std::fmt::Display for TestReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Connection test results:")?;
        writeln!(f, "Source endpoint: {}", self.source)?;
        write!(f, "Destination endpoint: {}", self.destination)
    }
}

/// HTTP relay client
#[derive(Clone)]
pub struct HttpRelay {
    client: Client,
    test_timeout: Duration,
}

impl HttpRelay {
    /// Build a relay with a per-request timeout for executions and a
    /// separate timeout for test probes
    pub fn new(request_timeout: Duration, test_timeout: Duration) -> Result<Self, RelayError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| RelayError::Client(e.to_string()))?;

        Ok(Self {
            client,
            test_timeout,
        })
    }

    /// Fetch from the source and forward to the destination
    pub async fn execute(&self, connection: &Connection) -> Result<RelayReport, RelayError> {
        let source = self
            .request(&connection.source_method, &connection.source_url, &connection.source_headers)?
            .send()
            .await
            .map_err(|e| request_error(Leg::Source, e))?;
        let source_status = source.status().as_u16();

        let is_json = source
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("application/json"))
            .unwrap_or(false);

        let text = source
            .text()
            .await
            .map_err(|e| request_error(Leg::Source, e))?;

        let payload = if is_json {
            match serde_json::from_str(&text) {
                Ok(value) => Payload::Json(value),
                Err(_) => Payload::Text(text),
            }
        } else {
            Payload::Text(text)
        };

        let payload = apply_mapping(&connection.mapping_rules, payload);

        let dest = self.request(&connection.dest_method, &connection.dest_url, &connection.dest_headers)?;
        let dest = match payload {
            Payload::Json(value) => dest.json(&value),
            Payload::Text(text) => dest.body(text),
        };
        let dest_status = dest
            .send()
            .await
            .map_err(|e| request_error(Leg::Destination, e))?
            .status()
            .as_u16();

        tracing::debug!(
            connection_id = %connection.id,
            source_status,
            dest_status,
            "Relay executed"
        );

        Ok(RelayReport {
            source_status,
            dest_status,
        })
    }

    /// Probe both endpoints; never fails as a whole
    pub async fn test(&self, connection: &Connection) -> TestReport {
        let source = self
            .probe(
                self.request(&connection.source_method, &connection.source_url, &connection.source_headers),
            )
            .await;

        let destination = self
            .probe(
                self.request(&connection.dest_method, &connection.dest_url, &connection.dest_headers)
                    .map(|req| req.json(&json!({"test": "data"}))),
            )
            .await;

        TestReport {
            source,
            destination,
        }
    }

    async fn probe(&self, request: Result<RequestBuilder, RelayError>) -> Probe {
        let request = match request {
            Ok(request) => request.timeout(self.test_timeout),
            Err(e) => return Probe::Error(e.to_string()),
        };

        match request.send().await {
            Ok(response) => Probe::Status(response.status().as_u16()),
            Err(e) => Probe::Error(e.to_string()),
        }
    }

    fn request(
        &self,
        method: &str,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<RequestBuilder, RelayError> {
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| RelayError::InvalidMethod(method.to_string()))?;

        Ok(self.client.request(method, url).headers(header_map(headers)?))
    }
}

fn header_map(headers: &HashMap<String, String>) -> Result<HeaderMap, RelayError> {
    let mut map = HeaderMap::with_capacity(headers.len());

    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| RelayError::InvalidHeader(name.clone()))?;
        let value =
            HeaderValue::from_str(value).map_err(|_| RelayError::InvalidHeader(name.as_str().to_string()))?;
        map.insert(name, value);
    }

    Ok(map)
}

fn request_error(leg: Leg, e: reqwest::Error) -> RelayError {
    RelayError::Request {
        leg,
        message: e.to_string(),
    }
}
