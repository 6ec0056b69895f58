//! Station send state and observable events

use bytes::Bytes;

use hs_protocol::StationId;

/// Stop-and-wait send state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendState {
    /// A sent message has not been acknowledged yet
    pub ack_pending: bool,
    /// Index of the next queued message to send
    pub cursor: usize,
}

impl SendState {
    /// Whether the next message of a queue of `queued` may go out now
    pub fn can_send(&self, queued: usize) -> bool {
        !self.ack_pending && self.cursor < queued
    }

    /// Record that the message at `cursor` was transmitted
    pub fn mark_sent(&mut self) {
        self.ack_pending = true;
        self.cursor += 1;
    }

    /// Record an acknowledgment from the destination.
    ///
    /// Returns whether an outstanding message was waiting for it.
    pub fn acknowledge(&mut self) -> bool {
        std::mem::replace(&mut self.ack_pending, false)
    }
}

/// Something the agent did or observed, in loop order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StationEvent {
    /// A queued message was transmitted
    Sent { to: StationId, payload: String },
    /// The destination acknowledged the outstanding message
    AckReceived { from: StationId },
    /// An acknowledgment arrived from a station we are not sending to
    StrayAck { from: StationId },
    /// A message addressed to this station arrived (and was acknowledged)
    Received { from: StationId, payload: Bytes },
    /// Corrupted input was skipped
    Malformed { skipped: usize },
}

/// Counters returned when the agent stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StationReport {
    pub sent: usize,
    pub acknowledged: usize,
    pub received: usize,
    pub stray_acks: usize,
    pub malformed: usize,
}
