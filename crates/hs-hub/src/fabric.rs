//! Transport fabric
//!
//! Every station needs two byte channels to the hub: one it transmits on
//! (the hub reads it) and one it receives on (the hub writes it). They can
//! be in-memory pipes for stations running inside the hub process, or the
//! standard input and output of a station child process.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::DuplexStream;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use hs_core::HubError;

/// Hub side of an in-memory link
pub struct HubLink {
    /// Station transmissions arrive here
    pub tx: DuplexStream,
    /// Relayed traffic for the station is written here
    pub rx: DuplexStream,
}

/// Station side of an in-memory link
pub struct StationLink {
    /// Relayed traffic from the hub
    pub reader: DuplexStream,
    /// Frames the station transmits
    pub writer: DuplexStream,
}

/// Create an in-memory channel pair buffering up to `capacity` bytes each way
pub fn duplex_link(capacity: usize) -> (HubLink, StationLink) {
    let (hub_tx, station_writer) = tokio::io::duplex(capacity);
    let (hub_rx, station_reader) = tokio::io::duplex(capacity);

    (
        HubLink {
            tx: hub_tx,
            rx: hub_rx,
        },
        StationLink {
            reader: station_reader,
            writer: station_writer,
        },
    )
}

/// A station running as a child process
pub struct SpawnedStation {
    pub child: Child,
    /// The station's standard output
    pub tx: ChildStdout,
    /// The station's standard input
    pub rx: ChildStdin,
}

/// Start `program` with `config` as its only argument and pipe its standard
/// streams to the hub. Standard error is inherited so station logs show up
/// on the hub's terminal.
pub fn spawn_station(program: &Path, config: &Path) -> Result<SpawnedStation, HubError> {
    let mut child = Command::new(program)
        .arg(config)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()?;

    let tx = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
    let rx = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;

    tracing::debug!(
        "Spawned {:?} {:?} (pid {:?})",
        program,
        config,
        child.id()
    );

    Ok(SpawnedStation { child, tx, rx })
}

fn missing_pipe(which: &str) -> HubError {
    HubError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("station {} was not piped", which),
    ))
}

/// Resolve the station program.
///
/// A bare program name is looked up next to the running executable first,
/// so a hub started from a build directory finds the station built with it.
/// Otherwise the name is left for the `PATH` lookup.
pub fn resolve_station_program(program: &Path) -> PathBuf {
    if program.components().count() != 1 {
        return program.to_path_buf();
    }

    let sibling = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(program)))
        .filter(|candidate| candidate.is_file());

    sibling.unwrap_or_else(|| program.to_path_buf())
}
