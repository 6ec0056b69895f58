//! Tokio codec for station frames
//!
//! Decoding is done from the point of view of one receiving station: every
//! frame on the shared medium reaches every station, so the decoder reports
//! frames addressed elsewhere instead of treating them as errors, and it
//! resynchronizes on corrupted input rather than failing the stream.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::frame::{Frame, ACK_MARKER, DEST_POS, ETX, PAYLOAD_POS, SRC_POS, STX};
use crate::station::StationId;

/// Default bound on buffered bytes of a single unfinished frame
pub const DEFAULT_MAX_BUFFERED: usize = 4096;

/// Result of decoding one frame from the inbound buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Bytes that could not be parsed as a frame and were discarded
    Malformed {
        /// The discarded span
        skipped: Bytes,
    },
    /// A well-formed frame addressed to another station
    NotForMe {
        /// Station the frame was addressed to
        dest: StationId,
    },
    /// Acknowledgment from `src`
    Ack {
        /// Station that sent the acknowledgment
        src: StationId,
    },
    /// Data message from `src`
    Message {
        /// Station that sent the message
        src: StationId,
        /// Message body (without delimiters)
        payload: Bytes,
    },
}

/// Decode at most one frame from the front of `src`.
///
/// Consumed bytes are removed from the buffer and anything after them stays
/// in place for the next call. Returns `None` when the buffer is empty or
/// holds only the beginning of a frame whose ETX has not arrived yet.
pub fn decode_frame(src: &mut BytesMut, self_id: StationId) -> Option<Inbound> {
    let first = *src.first()?;

    if first != STX {
        // Resynchronize: drop through the next ETX, or up to the next STX
        let skip = match src.iter().position(|&b| b == ETX || b == STX) {
            Some(i) if src[i] == ETX => i + 1,
            Some(i) => i,
            None => src.len(),
        };
        return Some(Inbound::Malformed {
            skipped: src.split_to(skip).freeze(),
        });
    }

    let etx = src.iter().position(|&b| b == ETX)?;
    let frame = src.split_to(etx + 1).freeze();

    if etx < PAYLOAD_POS {
        return Some(Inbound::Malformed { skipped: frame });
    }

    let (dest, sender) = match (
        StationId::new(frame[DEST_POS]),
        StationId::new(frame[SRC_POS]),
    ) {
        (Ok(dest), Ok(sender)) => (dest, sender),
        _ => return Some(Inbound::Malformed { skipped: frame }),
    };

    if dest != self_id {
        return Some(Inbound::NotForMe { dest });
    }

    let payload = frame.slice(PAYLOAD_POS..etx);
    if payload.starts_with(ACK_MARKER) {
        Some(Inbound::Ack { src: sender })
    } else {
        Some(Inbound::Message {
            src: sender,
            payload,
        })
    }
}

/// Codec for one station's inbound and outbound traffic
#[derive(Debug, Clone)]
pub struct StationCodec {
    self_id: StationId,
    max_buffered: usize,
}

impl StationCodec {
    /// Create a codec that decodes on behalf of `self_id`
    pub fn new(self_id: StationId) -> Self {
        Self {
            self_id,
            max_buffered: DEFAULT_MAX_BUFFERED,
        }
    }

    /// Create a codec with a custom bound on unfinished frame size
    pub fn with_max_buffered(self_id: StationId, max_buffered: usize) -> Self {
        Self {
            self_id,
            max_buffered: max_buffered.max(PAYLOAD_POS + 1),
        }
    }

    /// Station this codec decodes for
    pub fn self_id(&self) -> StationId {
        self.self_id
    }
}

impl Decoder for StationCodec {
    type Item = Inbound;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(inbound) = decode_frame(src, self.self_id) {
            return Ok(Some(inbound));
        }

        // An unfinished frame may not grow without bound
        if src.len() >= self.max_buffered {
            tracing::warn!(
                "Station {}: discarding {} buffered bytes without ETX",
                self.self_id,
                src.len()
            );
            return Ok(Some(Inbound::Malformed {
                skipped: src.split().freeze(),
            }));
        }

        Ok(None)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(inbound) => Ok(Some(inbound)),
            None => {
                if !buf.is_empty() {
                    tracing::debug!(
                        "Station {}: dropping {} bytes of unfinished frame at end of stream",
                        self.self_id,
                        buf.len()
                    );
                    buf.clear();
                }
                Ok(None)
            }
        }
    }
}

impl Encoder<Frame> for StationCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        frame.encode(dst);
        Ok(())
    }
}
