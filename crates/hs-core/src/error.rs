//! Core error types for hubsim

use hs_protocol::ProtocolError;
use std::path::PathBuf;
use thiserror::Error;

use crate::types::StationIndex;

/// Errors raised on the hub side
#[derive(Error, Debug)]
pub enum HubError {
    /// Station table is full
    #[error("Station capacity exceeded (max {max} stations)")]
    CapacityExceeded { max: usize },

    /// Read or write failure on one station's endpoint
    #[error("Transport fault on {station}: {source}")]
    Transport {
        station: StationIndex,
        #[source]
        source: std::io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that end a station agent
#[derive(Error, Debug)]
pub enum StationError {
    /// Read or write failure on the station's channel
    #[error("Transport fault: {0}")]
    Transport(#[from] std::io::Error),

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(ProtocolError),
}

impl From<ProtocolError> for StationError {
    fn from(err: ProtocolError) -> Self {
        // Codec I/O failures are transport faults, not protocol violations
        match err {
            ProtocolError::Io(e) => StationError::Transport(e),
            other => StationError::Protocol(other),
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Config file could not be read
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
}
