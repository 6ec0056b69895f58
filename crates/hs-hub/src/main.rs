//! hubsim hub
//!
//! Creates one station per configuration file, relays their traffic for a
//! fixed time, then closes every station's input so the stations stop.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hs_core::config::{self, HubConfig, StationConfig};
use hs_core::HubError;
use hs_hub::{Hub, StationExit};

#[derive(Parser)]
#[command(name = "hs-hub")]
#[command(about = "hubsim hub - relays every station's frames to all other stations")]
#[command(version)]
struct Args {
    /// Station configuration files (override the hub config's list)
    stations: Vec<PathBuf>,

    /// Path to hub configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds to relay before stopping (overrides config)
    #[arg(short, long)]
    deadline: Option<f64>,

    /// Maximum number of stations (overrides config)
    #[arg(long)]
    max_stations: Option<usize>,

    /// Station program to spawn (overrides config)
    #[arg(long)]
    station_program: Option<PathBuf>,

    /// Run stations as tasks inside the hub instead of child processes
    #[arg(long)]
    in_process: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => config::load_config::<HubConfig>(path)
            .with_context(|| format!("Failed to load hub config from {:?}", path))?,
        None => HubConfig::default(),
    };

    // Apply command-line overrides
    if !args.stations.is_empty() {
        config.stations = args.stations.clone();
    }
    if let Some(secs) = args.deadline {
        config.relay_deadline = Duration::try_from_secs_f64(secs)
            .with_context(|| format!("Invalid deadline: {}", secs))?;
    }
    if let Some(max) = args.max_stations {
        config.max_stations = max;
    }
    if let Some(program) = args.station_program.clone() {
        config.station_program = program;
    }

    if config.stations.is_empty() {
        anyhow::bail!("No stations configured. Pass station config files or use --config.");
    }

    let station_files = config.stations.clone();
    let mut hub = Hub::new(config);

    for path in &station_files {
        let result = if args.in_process {
            match StationConfig::load(path) {
                Ok(station) => hub.spawn_local_station(station),
                Err(e) => {
                    tracing::error!("Skipping station {:?}: {}", path, e);
                    continue;
                }
            }
        } else {
            hub.spawn_process_station(path)
        };

        match result {
            Ok(_) => {}
            Err(e @ HubError::CapacityExceeded { .. }) => {
                tracing::warn!("Station {:?} not created: {}", path, e);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to create station {:?}", path));
            }
        }
    }

    if hub.is_empty() {
        anyhow::bail!("No station could be created");
    }

    // Create cancellation token for graceful shutdown
    let shutdown = CancellationToken::new();

    // Setup signal handlers
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, stopping the hub...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, stopping the hub...");
            }
        }

        shutdown_clone.cancel();
    });

    let summary = hub.run(&shutdown).await;

    for outcome in &summary.relay.listeners {
        tracing::debug!("Listener for {} ({}): {:?}", outcome.index, outcome.name, outcome.exit);
    }
    let failed = summary
        .stations
        .iter()
        .filter(|s| !matches!(s.exit, StationExit::Report(_) | StationExit::Exited(Some(0))))
        .count();
    tracing::info!(
        "Hub stopped ({:?}); {} of {} stations ended cleanly",
        summary.relay.reason,
        summary.stations.len() - failed,
        summary.stations.len()
    );

    Ok(())
}
