//! Frame encoding
//!
//! The frame format is plain text:
//! - STX: 1 byte (`@`)
//! - dest: 1 byte (station identifier)
//! - src: 1 byte (station identifier)
//! - separator: 1 byte (`-`)
//! - payload: any bytes except ETX
//! - ETX: 1 byte (`~`)

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::station::StationId;

/// Start of frame
pub const STX: u8 = b'@';

/// End of frame
pub const ETX: u8 = b'~';

/// Separator between the addressing header and the payload
pub const SEPARATOR: u8 = b'-';

/// Offset of the destination identifier
pub const DEST_POS: usize = 1;

/// Offset of the source identifier
pub const SRC_POS: usize = 2;

/// Offset of the first payload byte
pub const PAYLOAD_POS: usize = 4;

/// Payload prefix that marks an acknowledgment
pub const ACK_MARKER: &[u8] = b"Ack";

/// One addressed protocol unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Station the frame is addressed to
    pub dest: StationId,
    /// Station that sent the frame
    pub src: StationId,
    payload: Bytes,
}

impl Frame {
    /// Create a new frame
    ///
    /// Fails if the payload contains ETX, since the frame would end early.
    pub fn new(
        dest: StationId,
        src: StationId,
        payload: impl Into<Bytes>,
    ) -> Result<Self, ProtocolError> {
        let payload = payload.into();
        if let Some(offset) = payload.iter().position(|&b| b == ETX) {
            return Err(ProtocolError::EtxInPayload { offset });
        }
        Ok(Self { dest, src, payload })
    }

    /// Acknowledgment frame sent back to `to`
    pub fn ack(to: StationId, from: StationId) -> Self {
        Self {
            dest: to,
            src: from,
            payload: Bytes::from_static(ACK_MARKER),
        }
    }

    /// The payload bytes
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Whether this frame is read as an acknowledgment by the receiver
    pub fn is_ack(&self) -> bool {
        self.payload.starts_with(ACK_MARKER)
    }

    /// Total encoded length
    pub fn encoded_len(&self) -> usize {
        PAYLOAD_POS + self.payload.len() + 1
    }

    /// Encode the frame into a byte buffer
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());
        dst.put_u8(STX);
        dst.put_u8(self.dest.as_u8());
        dst.put_u8(self.src.as_u8());
        dst.put_u8(SEPARATOR);
        dst.extend_from_slice(&self.payload);
        dst.put_u8(ETX);
    }

    /// Encode the frame into a standalone buffer
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(c: char) -> StationId {
        StationId::try_from(c).unwrap()
    }

    #[test]
    fn test_encode_layout() {
        let frame = Frame::new(id('B'), id('A'), "hello").unwrap();
        assert_eq!(frame.to_bytes().as_ref(), b"@BA-hello~");
        assert_eq!(frame.encoded_len(), 10);
        assert_eq!(frame.payload().as_ref(), b"hello");
    }

    #[test]
    fn test_ack_frame() {
        let frame = Frame::ack(id('A'), id('B'));
        assert!(frame.is_ack());
        assert_eq!(frame.to_bytes().as_ref(), b"@AB-Ack~");
    }

    #[test]
    fn test_empty_payload() {
        let frame = Frame::new(id('C'), id('D'), Bytes::new()).unwrap();
        assert_eq!(frame.to_bytes().as_ref(), b"@CD-~");
        assert!(!frame.is_ack());
    }

    #[test]
    fn test_payload_with_etx_rejected() {
        let result = Frame::new(id('B'), id('A'), "bad~payload");
        assert!(matches!(
            result,
            Err(ProtocolError::EtxInPayload { offset: 3 })
        ));
    }

    #[test]
    fn test_payload_may_contain_stx() {
        let frame = Frame::new(id('B'), id('A'), "me@home").unwrap();
        assert_eq!(frame.to_bytes().as_ref(), b"@BA-me@home~");
    }
}
