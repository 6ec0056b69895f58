//! hs-hub: Shared-medium hub for hubsim
//!
//! The hub connects several stations and copies everything one station
//! transmits to every other station, like a hub on a single collision
//! domain. It keeps a registry of station endpoints, runs one listener per
//! station, and closes all endpoints when relaying stops.

pub mod fabric;
pub mod hub;
pub mod listener;
pub mod registry;

pub use hub::{Hub, HubSummary, StationExit, StationOutcome};
pub use listener::{ListenerExit, ListenerOutcome, ListenerPool, RelaySummary, StopReason};
pub use registry::{BroadcastReport, Broadcaster, StationRegistry};
