//! hs-station: Station agent for hubsim
//!
//! A station sends its queued messages one at a time to a fixed
//! destination, waiting for an acknowledgment before sending the next,
//! and acknowledges every message addressed to it. All traffic goes
//! through one inbound and one outbound byte channel to the hub.

pub mod agent;
pub mod state;

pub use agent::StationAgent;
pub use state::{SendState, StationEvent, StationReport};
