//! hs-protocol: Wire format for hubsim stations
//!
//! Stations exchange text frames over a shared medium. Every frame is
//! `STX dest src '-' payload ETX` with no length prefix and no escaping,
//! so the payload must never contain ETX. This crate defines the frame,
//! the decode events a receiving station sees, and a tokio codec that
//! keeps the inbound frame buffer bounded.

pub mod codec;
pub mod error;
pub mod frame;
pub mod station;

pub use codec::{decode_frame, Inbound, StationCodec, DEFAULT_MAX_BUFFERED};
pub use error::ProtocolError;
pub use frame::{Frame, ACK_MARKER, ETX, PAYLOAD_POS, STX};
pub use station::StationId;
