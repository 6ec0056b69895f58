//! Station identifier type

use std::fmt;

use crate::error::ProtocolError;
use crate::frame::{ETX, STX};

/// Single-character identifier of a station on the shared medium
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StationId(u8);

impl StationId {
    /// Create a station ID from a raw byte.
    ///
    /// Only printable, non-space ASCII is accepted, and the frame
    /// delimiters are excluded.
    pub fn new(byte: u8) -> Result<Self, ProtocolError> {
        if byte.is_ascii_graphic() && byte != STX && byte != ETX {
            Ok(Self(byte))
        } else {
            Err(ProtocolError::InvalidStationId(byte))
        }
    }

    /// Get the raw byte value
    pub fn as_u8(&self) -> u8 {
        self.0
    }

    /// Get the identifier as a character
    pub fn as_char(&self) -> char {
        self.0 as char
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl TryFrom<u8> for StationId {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Self::new(byte)
    }
}

impl TryFrom<char> for StationId {
    type Error = ProtocolError;

    fn try_from(c: char) -> Result<Self, Self::Error> {
        if c.is_ascii() {
            Self::new(c as u8)
        } else {
            // Report the first UTF-8 byte; anything non-ASCII is rejected anyway
            let mut buf = [0u8; 4];
            Err(ProtocolError::InvalidStationId(c.encode_utf8(&mut buf).as_bytes()[0]))
        }
    }
}
