//! Hub session
//!
//! Owns the stations for one run: registers them, relays their traffic
//! until the deadline, then closes every receive endpoint and waits for
//! the stations to finish.

use std::path::Path;
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use hs_core::config::{HubConfig, StationConfig};
use hs_core::{HubError, StationError, StationIndex};
use hs_station::{StationAgent, StationEvent, StationReport};

use crate::fabric::{duplex_link, resolve_station_program, spawn_station};
use crate::listener::{ListenerPool, RelaySummary};
use crate::registry::StationRegistry;

/// Buffer size of in-process station links
const LOCAL_LINK_CAPACITY: usize = 8192;

/// How a station ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StationExit {
    /// In-process agent finished and reported its counters
    Report(StationReport),
    /// Child process exited with the given code
    Exited(Option<i32>),
    /// Station stopped on an error
    Failed(String),
    /// Station did not exit within the grace period and was killed
    Killed,
}

/// Final state of one station
#[derive(Debug, Clone)]
pub struct StationOutcome {
    pub name: String,
    pub exit: StationExit,
}

/// Result of a hub run
#[derive(Debug, Clone)]
pub struct HubSummary {
    pub relay: RelaySummary,
    pub stations: Vec<StationOutcome>,
}

struct ProcessStation {
    name: String,
    child: Child,
}

struct LocalStation {
    name: String,
    handle: JoinHandle<Result<StationReport, StationError>>,
}

/// Hub with its stations, before and during relaying
pub struct Hub {
    config: HubConfig,
    registry: StationRegistry,
    processes: Vec<ProcessStation>,
    locals: Vec<LocalStation>,
}

impl Hub {
    /// Create a hub with no stations
    pub fn new(config: HubConfig) -> Self {
        Self {
            registry: StationRegistry::with_capacity(config.max_stations),
            config,
            processes: Vec::new(),
            locals: Vec::new(),
        }
    }

    /// Number of registered stations
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// Check if no station is registered
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Start a station process for `config_path` and register its pipes
    pub fn spawn_process_station(&mut self, config_path: &Path) -> Result<StationIndex, HubError> {
        self.ensure_capacity()?;

        let program = resolve_station_program(&self.config.station_program);
        let station = spawn_station(&program, config_path)?;
        let name = config_path.display().to_string();

        let index = self.registry.register(name.clone(), station.tx, station.rx)?;
        tracing::info!("Created {} from {} (pid {:?})", index, name, station.child.id());

        self.processes.push(ProcessStation {
            name,
            child: station.child,
        });
        Ok(index)
    }

    /// Run a station agent as a task inside the hub process
    pub fn spawn_local_station(&mut self, config: StationConfig) -> Result<StationIndex, HubError> {
        self.add_local(config, None)
    }

    /// Like [`Hub::spawn_local_station`], reporting the agent's events on `events`
    pub fn spawn_observed_station(
        &mut self,
        config: StationConfig,
        events: mpsc::UnboundedSender<StationEvent>,
    ) -> Result<StationIndex, HubError> {
        self.add_local(config, Some(events))
    }

    fn add_local(
        &mut self,
        config: StationConfig,
        events: Option<mpsc::UnboundedSender<StationEvent>>,
    ) -> Result<StationIndex, HubError> {
        self.ensure_capacity()?;

        let (hub, station) = duplex_link(LOCAL_LINK_CAPACITY);
        let name = format!("station {}", config.id);
        let index = self.registry.register(name.clone(), hub.tx, hub.rx)?;

        let mut agent = StationAgent::new(config, station.reader, station.writer);
        if let Some(tx) = events {
            agent = agent.with_events(tx);
        }
        tracing::info!("Created {} ({}) in process", index, name);

        self.locals.push(LocalStation {
            name,
            handle: tokio::spawn(agent.run()),
        });
        Ok(index)
    }

    fn ensure_capacity(&self) -> Result<(), HubError> {
        if self.registry.is_full() {
            return Err(HubError::CapacityExceeded {
                max: self.registry.capacity(),
            });
        }
        Ok(())
    }

    /// Relay until the deadline or `shutdown`, then close all endpoints and
    /// wait for the stations to exit
    pub async fn run(self, shutdown: &CancellationToken) -> HubSummary {
        let Hub {
            config,
            registry,
            processes,
            locals,
        } = self;

        tracing::info!(
            "Relaying for {} stations (deadline {:?})",
            registry.len(),
            config.relay_deadline
        );
        let pool = ListenerPool::start(registry, config.read_buffer_size);
        let relay = pool.run_until(config.relay_deadline, shutdown).await;

        // One grace period for all stations; they received EOF together
        let grace = config.station_exit_grace;
        let deadline = Instant::now() + grace;

        let mut stations = Vec::with_capacity(processes.len() + locals.len());
        for process in processes {
            stations.push(wait_for_process(process, deadline, grace).await);
        }
        for local in locals {
            stations.push(wait_for_local(local, deadline, grace).await);
        }

        HubSummary { relay, stations }
    }
}

async fn wait_for_process(
    mut process: ProcessStation,
    deadline: Instant,
    grace: Duration,
) -> StationOutcome {
    let exit = match tokio::time::timeout_at(deadline, process.child.wait()).await {
        Ok(Ok(status)) => {
            tracing::info!("{} exited ({})", process.name, status);
            StationExit::Exited(status.code())
        }
        Ok(Err(e)) => {
            tracing::error!("Failed to wait for {}: {}", process.name, e);
            StationExit::Failed(e.to_string())
        }
        Err(_) => {
            tracing::warn!(
                "{} did not exit within {:?}, killing it",
                process.name,
                grace
            );
            if let Err(e) = process.child.kill().await {
                tracing::error!("Failed to kill {}: {}", process.name, e);
            }
            StationExit::Killed
        }
    };

    StationOutcome {
        name: process.name,
        exit,
    }
}

async fn wait_for_local(mut local: LocalStation, deadline: Instant, grace: Duration) -> StationOutcome {
    let exit = match tokio::time::timeout_at(deadline, &mut local.handle).await {
        Ok(Ok(Ok(report))) => {
            tracing::info!("{} finished: {:?}", local.name, report);
            StationExit::Report(report)
        }
        Ok(Ok(Err(e))) => {
            tracing::error!("{} stopped: {}", local.name, e);
            StationExit::Failed(e.to_string())
        }
        Ok(Err(e)) => {
            tracing::error!("{} task failed: {}", local.name, e);
            StationExit::Failed(e.to_string())
        }
        Err(_) => {
            tracing::warn!("{} did not finish within {:?}, aborting it", local.name, grace);
            local.handle.abort();
            StationExit::Killed
        }
    };

    StationOutcome {
        name: local.name,
        exit,
    }
}
