//! Station configuration
//!
//! A station file is line oriented. Empty lines and lines starting with `#`
//! are ignored. Of the remaining lines, the first character of the first
//! line is the station identifier, the first character of the second line
//! is the destination identifier, and every further line is one outbound
//! message, sent in file order.
//!
//! ```text
//! # station A talks to B
//! A
//! B
//! hello
//! world
//! ```

use std::path::Path;

use hs_protocol::{StationId, DEFAULT_MAX_BUFFERED, ETX, PAYLOAD_POS};

use crate::error::ConfigError;

/// Maximum number of outbound messages kept per station
pub const MAX_MESSAGES: usize = 10;

/// Longest message, in bytes, whose frame fits a receiver's frame buffer
pub const MAX_MESSAGE_LEN: usize = DEFAULT_MAX_BUFFERED - PAYLOAD_POS - 1;

/// Parsed station configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationConfig {
    /// This station's identifier
    pub id: StationId,
    /// Station every queued message is sent to
    pub destination: StationId,
    /// Outbound messages in send order
    pub messages: Vec<String>,
}

impl StationConfig {
    /// Create a configuration directly
    pub fn new(id: StationId, destination: StationId, messages: Vec<String>) -> Self {
        Self {
            id,
            destination,
            messages,
        }
    }

    /// Parse the station file format
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut lines = content
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.trim().is_empty() && !line.starts_with('#'));

        let id = parse_id(lines.next(), "station id")?;
        let destination = parse_id(lines.next(), "destination id")?;

        let mut messages = Vec::new();
        for line in lines {
            if line.as_bytes().contains(&ETX) {
                return Err(ConfigError::Invalid(format!(
                    "message {:?} contains the frame terminator '{}'",
                    line, ETX as char
                )));
            }
            if line.len() > MAX_MESSAGE_LEN {
                return Err(ConfigError::Invalid(format!(
                    "message of {} bytes exceeds the {} byte limit",
                    line.len(),
                    MAX_MESSAGE_LEN
                )));
            }
            if messages.len() == MAX_MESSAGES {
                tracing::warn!(
                    "Station {}: ignoring message {:?} (limit is {} messages)",
                    id,
                    line,
                    MAX_MESSAGES
                );
                continue;
            }
            messages.push(line.to_string());
        }

        Ok(Self {
            id,
            destination,
            messages,
        })
    }

    /// Load and parse a station file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }
}

fn parse_id(line: Option<&str>, field: &str) -> Result<StationId, ConfigError> {
    let first = line
        .and_then(|l| l.chars().next())
        .ok_or_else(|| ConfigError::MissingField(field.to_string()))?;

    StationId::try_from(first)
        .map_err(|e| ConfigError::Invalid(format!("{} {:?}: {}", field, first, e)))
}
