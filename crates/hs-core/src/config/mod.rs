//! Configuration management for hubsim

mod hub;
mod serde_utils;
mod station;

pub use hub::HubConfig;
pub use station::{StationConfig, MAX_MESSAGES, MAX_MESSAGE_LEN};

use crate::error::ConfigError;
use std::path::Path;

/// Load a TOML configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)?;
    let config: T = toml::from_str(&content)?;
    Ok(config)
}
