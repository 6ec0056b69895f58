//! Protocol error types

use thiserror::Error;

/// Errors that can occur during protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Payload would terminate the frame early
    #[error("Payload contains the ETX byte at offset {offset}")]
    EtxInPayload { offset: usize },

    /// Byte cannot be used as a station identifier
    #[error("Invalid station identifier: 0x{0:02x}")]
    InvalidStationId(u8),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
