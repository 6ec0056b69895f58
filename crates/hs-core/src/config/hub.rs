//! Hub configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_secs;

/// Configuration for the hub process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Maximum number of stations the hub will register
    pub max_stations: usize,

    /// How long the hub relays traffic before cancelling all listeners
    #[serde(with = "duration_secs")]
    pub relay_deadline: Duration,

    /// How long stations get to exit once relaying has stopped, shared by
    /// all stations
    #[serde(with = "duration_secs")]
    pub station_exit_grace: Duration,

    /// Size of each listener's read buffer
    pub read_buffer_size: usize,

    /// Station program spawned for each configured station
    pub station_program: PathBuf,

    /// Station configuration files, registered in order
    pub stations: Vec<PathBuf>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_stations: 10,
            relay_deadline: Duration::from_secs(30),
            station_exit_grace: Duration::from_secs(5),
            read_buffer_size: 8192,
            station_program: PathBuf::from("hs-station"),
            stations: vec![],
        }
    }
}
