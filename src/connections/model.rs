//! Connection records
//!
//! A connection pairs a source endpoint with a destination endpoint. Executing
//! it fetches from the source and forwards the body to the destination.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A stored source → destination pair with its execution counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: Uuid,
    pub name: String,
    pub source_url: String,
    pub source_method: String,
    pub source_headers: HashMap<String, String>,
    pub dest_url: String,
    pub dest_method: String,
    pub dest_headers: HashMap<String, String>,
    /// Stored verbatim; mapping is currently the identity transform
    pub mapping_rules: Vec<Value>,
    pub created_at: DateTime<Utc>,
    pub last_executed: Option<DateTime<Utc>>,
    pub execution_count: u64,
    pub success_count: u64,
    pub error_count: u64,
}

impl Connection {
    /// Build a fresh record with a new id and zeroed counters
    pub fn create(new: NewConnection) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: new.name,
            source_url: new.source_url,
            source_method: new.source_method.to_ascii_uppercase(),
            source_headers: new.source_headers,
            dest_url: new.dest_url,
            dest_method: new.dest_method.to_ascii_uppercase(),
            dest_headers: new.dest_headers,
            mapping_rules: new.mapping_rules,
            created_at: Utc::now(),
            last_executed: None,
            execution_count: 0,
            success_count: 0,
            error_count: 0,
        }
    }

    /// Count one execution
    pub fn record_execution(&mut self, succeeded: bool) {
        self.last_executed = Some(Utc::now());
        self.execution_count += 1;
        if succeeded {
            self.success_count += 1;
        } else {
            self.error_count += 1;
        }
    }
}

fn default_source_method() -> String {
    "GET".to_string()
}

fn default_dest_method() -> String {
    "POST".to_string()
}

/// Request body for creating a connection
#[derive(Debug, Clone, Deserialize)]
pub struct NewConnection {
    pub name: String,
    pub source_url: String,
    pub dest_url: String,
    #[serde(default = "default_source_method")]
    pub source_method: String,
    #[serde(default = "default_dest_method")]
    pub dest_method: String,
    #[serde(default)]
    pub source_headers: HashMap<String, String>,
    #[serde(default)]
    pub dest_headers: HashMap<String, String>,
    #[serde(default)]
    pub mapping_rules: Vec<Value>,
}

impl NewConnection {
    /// Minimal request with default methods and no headers
    pub fn new(
        name: impl Into<String>,
        source_url: impl Into<String>,
        dest_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source_url: source_url.into(),
            dest_url: dest_url.into(),
            source_method: default_source_method(),
            dest_method: default_dest_method(),
            source_headers: HashMap::new(),
            dest_headers: HashMap::new(),
            mapping_rules: Vec::new(),
        }
    }

    /// Check that the name is present and URLs and methods parse
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".into());
        }

        for (field, url) in [("source_url", &self.source_url), ("dest_url", &self.dest_url)] {
            Url::parse(url).map_err(|e| format!("{}: {}", field, e))?;
        }

        for (field, method) in [
            ("source_method", &self.source_method),
            ("dest_method", &self.dest_method),
        ] {
            Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .map_err(|_| format!("{}: invalid method {:?}", field, method))?;
        }

        Ok(())
    }
}
