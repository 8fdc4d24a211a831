//! Process settings
//!
//! Loaded with the `config` crate from an optional YAML file and `RELAY__*`
//! environment variables, then turned into [`ServerConfig`] and
//! [`BroadcastConfig`].

use std::net::SocketAddr;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::events::BroadcastConfig;
use crate::server::ServerConfig;

/// Environment variable naming a settings file
pub const CONFIG_ENV_VAR: &str = "RELAY_CONFIG";
/// Prefix for settings environment variables, e.g. `RELAY__SERVER__BIND_ADDR`
pub const CONFIG_ENV_PREFIX: &str = "RELAY";
/// Environment variable for the log filter
pub const LOG_ENV_VAR: &str = "RELAY_LOG";

/// Top-level settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub broadcast: BroadcastSettings,
}

/// HTTP server settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_addr: String,
    pub request_timeout_secs: u64,
    pub test_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            request_timeout_secs: 30,
            test_timeout_secs: 10,
        }
    }
}

/// Event broadcast settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BroadcastSettings {
    pub poll_interval_ms: u64,
    pub idle_timeout_secs: u64,
    pub keepalive_interval_secs: u64,
    pub write_timeout_secs: u64,
    pub send_greeting: bool,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            idle_timeout_secs: 300,
            keepalive_interval_secs: 5,
            write_timeout_secs: 10,
            send_greeting: true,
        }
    }
}

impl Settings {
    /// Load settings from file and environment
    ///
    /// Sources, later overriding earlier:
    /// 1. `relay.yaml` in the current directory (if present)
    /// 2. The file at `path` (if given)
    /// 3. The file named by `RELAY_CONFIG` (if set)
    /// 4. `RELAY__<SECTION>__<KEY>` environment variables
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder().add_source(File::new("relay", FileFormat::Yaml).required(false));

        if let Some(path) = path {
            builder = builder.add_source(File::new(path, FileFormat::Yaml).required(true));
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&path, FileFormat::Yaml).required(true));
        }

        let settings = builder
            .add_source(environment())
            .build()?
            .try_deserialize()?;

        Ok(settings)
    }

    /// Parse settings from YAML text
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;

        Ok(settings)
    }

    /// HTTP server configuration
    pub fn server_config(&self) -> Result<ServerConfig> {
        let addr: SocketAddr = self
            .server
            .bind_addr
            .parse()
            .map_err(|e| Error::Config(format!("server.bind_addr {:?}: {}", self.server.bind_addr, e)))?;

        Ok(ServerConfig::with_addr(addr)
            .request_timeout(Duration::from_secs(self.server.request_timeout_secs))
            .test_timeout(Duration::from_secs(self.server.test_timeout_secs)))
    }

    /// Event hub configuration
    pub fn broadcast_config(&self) -> Result<BroadcastConfig> {
        let b = &self.broadcast;
        for (key, value) in [
            ("poll_interval_ms", b.poll_interval_ms),
            ("idle_timeout_secs", b.idle_timeout_secs),
            ("keepalive_interval_secs", b.keepalive_interval_secs),
            ("write_timeout_secs", b.write_timeout_secs),
        ] {
            if value == 0 {
                return Err(Error::Config(format!("broadcast.{} must be greater than zero", key)));
            }
        }

        let config = BroadcastConfig::default()
            .poll_interval(Duration::from_millis(b.poll_interval_ms))
            .idle_timeout(Duration::from_secs(b.idle_timeout_secs))
            .keepalive_interval(Duration::from_secs(b.keepalive_interval_secs))
            .write_timeout(Duration::from_secs(b.write_timeout_secs));

        Ok(if b.send_greeting {
            config
        } else {
            config.without_greeting()
        })
    }
}

fn environment() -> Environment {
    Environment::with_prefix(CONFIG_ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        let server = settings.server_config().unwrap();
        let broadcast = settings.broadcast_config().unwrap();

        assert_eq!(server.bind_addr.port(), 8000);
        assert_eq!(server.request_timeout, Duration::from_secs(30));
        assert_eq!(broadcast.poll_interval, Duration::from_secs(1));
        assert_eq!(broadcast.idle_timeout, Duration::from_secs(300));
        assert_eq!(broadcast.keepalive_interval, Duration::from_secs(5));
        assert!(broadcast.send_greeting);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let settings = Settings::from_yaml(
            r#"
server:
  bind_addr: "127.0.0.1:9000"
broadcast:
  poll_interval_ms: 250
  send_greeting: false
"#,
        )
        .unwrap();

        let server = settings.server_config().unwrap();
        assert_eq!(server.bind_addr, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(server.test_timeout, Duration::from_secs(10));

        let broadcast = settings.broadcast_config().unwrap();
        assert_eq!(broadcast.poll_interval, Duration::from_millis(250));
        assert_eq!(broadcast.idle_timeout, Duration::from_secs(300));
        assert!(!broadcast.send_greeting);
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut vars = config::Map::new();
        vars.insert("RELAY__SERVER__REQUEST_TIMEOUT_SECS".to_string(), "5".to_string());
        vars.insert("RELAY__BROADCAST__IDLE_TIMEOUT_SECS".to_string(), "60".to_string());

        let settings: Settings = Config::builder()
            .add_source(File::from_str("server:\n  request_timeout_secs: 20\n", FileFormat::Yaml))
            .add_source(environment().source(Some(vars)))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.server.request_timeout_secs, 5);
        assert_eq!(settings.broadcast.idle_timeout_secs, 60);
        assert_eq!(settings.server.bind_addr, "0.0.0.0:8000");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut settings = Settings::default();
        settings.server.bind_addr = "not-an-addr".to_string();
        assert!(matches!(settings.server_config(), Err(Error::Config(_))));

        let mut settings = Settings::default();
        settings.broadcast.poll_interval_ms = 0;
        assert!(matches!(settings.broadcast_config(), Err(Error::Config(_))));

        assert!(matches!(Settings::from_yaml("server: ["), Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let mut settings = Settings::default();
        settings.broadcast.idle_timeout_secs = 0;
        match settings.broadcast_config() {
            Err(Error::Config(msg)) => assert!(msg.contains("idle_timeout_secs")),
            other => panic!("expected config error, got {:?}", other),
        }

        let mut settings = Settings::default();
        settings.broadcast.write_timeout_secs = 0;
        match settings.broadcast_config() {
            Err(Error::Config(msg)) => assert!(msg.contains("write_timeout_secs")),
            other => panic!("expected config error, got {:?}", other),
        }
    }
}
