//! Crate-wide error types
//!
//! Errors from the broadcast core never leave it: transport failures on a
//! subscriber stream become a `SendOutcome`. The types here cover the
//! collaborators around the core (configuration, storage, relaying, HTTP).

use std::io;

use crate::connections::relay::RelayError;
use crate::connections::store::StoreError;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// I/O error (binding the listener, serving)
    Io(io::Error),
    /// Configuration could not be loaded or is invalid
    Config(String),
    /// Connection store failure
    Store(StoreError),
    /// Outbound relay failure
    Relay(RelayError),
    /// Connection with this id does not exist
    NotFound(String),
    /// Request payload rejected
    InvalidRequest(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Store(e) => write!(f, "Store error: {}", e),
            Error::Relay(e) => write!(f, "Relay error: {}", e),
            Error::NotFound(id) => write!(f, "Connection {} not found", id),
            Error::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Store(e) => Some(e),
            Error::Relay(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => Error::NotFound(id),
            other => Error::Store(other),
        }
    }
}

impl From<RelayError> for Error {
    fn from(e: RelayError) -> Self {
        Error::Relay(e)
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::Config(e.to_string())
    }
}
