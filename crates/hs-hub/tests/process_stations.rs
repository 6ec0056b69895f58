//! Hub tests with stations running as child processes
//!
//! The station program is a small shell script whose behavior depends on
//! the name of the config file it is started with.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use hs_core::config::HubConfig;
use hs_hub::{Hub, StationExit, StopReason};

const STATION_SCRIPT: &str = r#"#!/bin/sh
case "${1##*/}" in
    *talker*) printf '@BA-hi~'; cat > "$1.heard" ;;
    *echo*) exec cat ;;
    *stubborn*) cat > /dev/null; exec sleep 30 ;;
esac
"#;

/// Station script shared by every test, written once before anything
/// executes it
fn station_script() -> &'static Path {
    static SCRIPT: OnceLock<(TempDir, PathBuf)> = OnceLock::new();

    let (_dir, path) = SCRIPT.get_or_init(|| {
        let dir = TempDir::new().expect("Failed to create script directory");
        let path = dir.path().join("station.sh");
        std::fs::write(&path, STATION_SCRIPT).expect("Failed to write station script");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("Failed to make station script executable");
        (dir, path)
    });
    path
}

fn station_file(dir: &TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, "# read by the station script only\n").unwrap();
    path
}

fn hub_config(program: &Path, deadline: Duration, grace: Duration) -> HubConfig {
    HubConfig {
        station_program: program.to_path_buf(),
        relay_deadline: deadline,
        station_exit_grace: grace,
        ..HubConfig::default()
    }
}

#[tokio::test]
async fn test_process_stations_exchange_and_exit_cleanly() {
    let dir = TempDir::new().unwrap();
    let script = station_script();
    let talker = station_file(&dir, "talker.cfg");
    let echo = station_file(&dir, "echo.cfg");

    let mut hub = Hub::new(hub_config(
        script,
        Duration::from_millis(500),
        Duration::from_secs(5),
    ));
    hub.spawn_process_station(&talker).unwrap();
    hub.spawn_process_station(&echo).unwrap();

    let summary = hub.run(&CancellationToken::new()).await;
    assert_eq!(summary.relay.reason, StopReason::Deadline);
    for station in &summary.stations {
        assert_eq!(station.exit, StationExit::Exited(Some(0)), "{}", station.name);
    }

    // The echo station sent the talker's frame back through the hub
    let heard = std::fs::read_to_string(dir.path().join("talker.cfg.heard")).unwrap();
    assert_eq!(heard, "@BA-hi~");
}

#[tokio::test]
async fn test_stations_ignoring_eof_are_killed_after_one_grace_period() {
    let dir = TempDir::new().unwrap();
    let script = station_script();
    let deadline = Duration::from_millis(100);
    let grace = Duration::from_millis(400);

    let mut hub = Hub::new(hub_config(script, deadline, grace));
    for i in 0..3 {
        hub.spawn_process_station(&station_file(&dir, &format!("stubborn{}.cfg", i)))
            .unwrap();
    }

    let started = Instant::now();
    let summary = hub.run(&CancellationToken::new()).await;
    let elapsed = started.elapsed();

    assert!(summary
        .stations
        .iter()
        .all(|s| s.exit == StationExit::Killed));
    // All three share the grace period instead of waiting one after another
    assert!(
        elapsed < deadline + grace * 2,
        "shutdown took {:?}",
        elapsed
    );
}

#[test]
fn test_hub_binary_spawns_station_processes() {
    let dir = TempDir::new().unwrap();
    let script = station_script();
    let talker = station_file(&dir, "talker.cfg");
    let echo = station_file(&dir, "echo.cfg");

    Command::cargo_bin("hs-hub")
        .expect("Failed to locate hs-hub binary - ensure it's built before running tests")
        .arg("--station-program")
        .arg(script)
        .args(["--deadline", "0.5"])
        .arg(&talker)
        .arg(&echo)
        .timeout(Duration::from_secs(30))
        .assert()
        .success()
        .stderr(predicate::str::contains("2 of 2 stations ended cleanly"));

    let heard = std::fs::read_to_string(dir.path().join("talker.cfg.heard")).unwrap();
    assert_eq!(heard, "@BA-hi~");
}
