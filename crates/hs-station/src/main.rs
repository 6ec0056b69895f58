//! hubsim station process
//!
//! Reads frames from standard input and writes frames to standard output,
//! so the hub can wire it up with a pair of pipes. Logs go to standard
//! error.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hs_core::config::StationConfig;
use hs_station::StationAgent;

#[derive(Parser)]
#[command(name = "hs-station")]
#[command(about = "hubsim station - stop-and-wait agent speaking on stdin/stdout")]
#[command(version)]
struct Args {
    /// Station configuration file (id, destination, messages)
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Standard output carries frames, so logs must stay on stderr
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = StationConfig::load(&args.config)
        .with_context(|| format!("Failed to load station config from {:?}", args.config))?;

    tracing::debug!(
        "Station {} (pid {}) configured from {:?}",
        config.id,
        std::process::id(),
        args.config
    );

    let station = config.id;
    let report = StationAgent::new(config, tokio::io::stdin(), tokio::io::stdout())
        .run()
        .await
        .with_context(|| format!("Station {} stopped on a transport fault", station))?;

    tracing::debug!("Station {} finished: {:?}", station, report);
    Ok(())
}
