//! hs-core: Core types and configuration for hubsim
//!
//! This crate provides the error taxonomy, station and hub configuration,
//! and shared types used by the hub and the station agents.

pub mod config;
pub mod error;
pub mod types;

pub use error::{ConfigError, HubError, StationError};
pub use types::StationIndex;
