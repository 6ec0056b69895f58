//! Station protocol engine
//!
//! Each pass of the loop first sends the next queued message if nothing is
//! outstanding, then blocks until one acknowledgment or message addressed
//! to this station arrives. The inbound read is the only place the agent
//! waits, so it keeps answering traffic after its own queue is exhausted.
//! It stops only when the inbound channel reaches end-of-stream.
//!
//! There is no acknowledgment timeout: if the destination never answers,
//! the agent keeps serving inbound traffic but never sends again.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};

use hs_core::config::StationConfig;
use hs_core::StationError;
use hs_protocol::{Frame, Inbound, StationCodec, StationId};

use crate::state::{SendState, StationEvent, StationReport};

/// Acknowledgment or message pulled from the inbound channel
enum Received {
    Ack(StationId),
    Message(StationId, Bytes),
}

/// Per-station send/receive/acknowledge loop
pub struct StationAgent<R, W> {
    config: StationConfig,
    inbound: FramedRead<R, StationCodec>,
    outbound: FramedWrite<W, StationCodec>,
    state: SendState,
    report: StationReport,
    events: Option<mpsc::UnboundedSender<StationEvent>>,
}

impl<R, W> StationAgent<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Create an agent reading frames from `reader` and writing to `writer`
    pub fn new(config: StationConfig, reader: R, writer: W) -> Self {
        let codec = StationCodec::new(config.id);
        Self::with_codec(config, codec, reader, writer)
    }

    /// Create an agent with a custom codec (e.g. a different buffer bound)
    pub fn with_codec(config: StationConfig, codec: StationCodec, reader: R, writer: W) -> Self {
        Self {
            inbound: FramedRead::new(reader, codec.clone()),
            outbound: FramedWrite::new(writer, codec),
            config,
            state: SendState::default(),
            report: StationReport::default(),
            events: None,
        }
    }

    /// Report every send and receipt on `tx`
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<StationEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Current stop-and-wait state
    pub fn state(&self) -> SendState {
        self.state
    }

    /// Station identifier
    pub fn id(&self) -> StationId {
        self.config.id
    }

    /// Run until the inbound channel closes
    pub async fn run(mut self) -> Result<StationReport, StationError> {
        tracing::info!(
            "Station {}: starting ({} queued messages for station {})",
            self.config.id,
            self.config.messages.len(),
            self.config.destination
        );

        loop {
            self.transmit_next().await?;

            match self.receive().await? {
                Some(Received::Ack(src)) => self.handle_ack(src),
                Some(Received::Message(src, payload)) => {
                    self.handle_message(src, payload).await?
                }
                None => break,
            }
        }

        if self.state.ack_pending {
            tracing::warn!(
                "Station {}: channel closed while waiting for an acknowledgment from {}",
                self.config.id,
                self.config.destination
            );
        }
        tracing::info!(
            "Station {}: channel closed, stopping (sent {}, acknowledged {}, received {})",
            self.config.id,
            self.report.sent,
            self.report.acknowledged,
            self.report.received
        );

        Ok(self.report)
    }

    /// Send the next queued message if nothing is outstanding
    async fn transmit_next(&mut self) -> Result<(), StationError> {
        if !self.state.can_send(self.config.messages.len()) {
            return Ok(());
        }

        let text = self.config.messages[self.state.cursor].clone();
        let frame = Frame::new(self.config.destination, self.config.id, text.clone())?;

        tracing::info!(
            "Station {}: Sent to station {} >{}<",
            self.config.id,
            self.config.destination,
            text
        );
        self.outbound.send(frame).await?;

        self.state.mark_sent();
        self.report.sent += 1;
        self.emit(StationEvent::Sent {
            to: self.config.destination,
            payload: text,
        });
        Ok(())
    }

    /// Block until an acknowledgment or a message for this station arrives.
    ///
    /// Returns `None` at end-of-stream.
    async fn receive(&mut self) -> Result<Option<Received>, StationError> {
        loop {
            let inbound = match self.inbound.next().await {
                Some(result) => result?,
                None => return Ok(None),
            };

            match inbound {
                Inbound::Ack { src } => return Ok(Some(Received::Ack(src))),
                Inbound::Message { src, payload } => {
                    return Ok(Some(Received::Message(src, payload)))
                }
                Inbound::NotForMe { dest } => {
                    tracing::trace!(
                        "Station {}: skipping frame for station {}",
                        self.config.id,
                        dest
                    );
                }
                Inbound::Malformed { skipped } => {
                    tracing::warn!(
                        "Station {}: no STX, skipped >{}<",
                        self.config.id,
                        String::from_utf8_lossy(&skipped)
                    );
                    self.report.malformed += 1;
                    self.emit(StationEvent::Malformed {
                        skipped: skipped.len(),
                    });
                }
            }
        }
    }

    fn handle_ack(&mut self, src: StationId) {
        if src != self.config.destination {
            tracing::warn!(
                "Station {}: received an Ack from {} - ignored",
                self.config.id,
                src
            );
            self.report.stray_acks += 1;
            self.emit(StationEvent::StrayAck { from: src });
            return;
        }

        if self.state.acknowledge() {
            self.report.acknowledged += 1;
            tracing::info!(
                "Station {}: Received from station {} an acknowledgement",
                self.config.id,
                src
            );
        } else {
            tracing::debug!(
                "Station {}: acknowledgment from {} with nothing outstanding",
                self.config.id,
                src
            );
        }
        self.emit(StationEvent::AckReceived { from: src });
    }

    async fn handle_message(&mut self, src: StationId, payload: Bytes) -> Result<(), StationError> {
        tracing::info!(
            "Station {}: Received from station {} >{}<",
            self.config.id,
            src,
            String::from_utf8_lossy(&payload)
        );
        self.report.received += 1;
        self.emit(StationEvent::Received { from: src, payload });

        self.outbound.send(Frame::ack(src, self.config.id)).await?;
        Ok(())
    }

    fn emit(&self, event: StationEvent) {
        if let Some(tx) = &self.events {
            // Observer may have gone away; the protocol does not depend on it
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hs_core::config::MAX_MESSAGE_LEN;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    fn id(c: char) -> StationId {
        StationId::try_from(c).unwrap()
    }

    type Spawned = (
        DuplexStream,
        mpsc::UnboundedReceiver<StationEvent>,
        JoinHandle<Result<StationReport, StationError>>,
    );

    /// Start an agent whose channel pair ends in the returned stream
    fn spawn_agent(me: char, dest: char, messages: &[&str]) -> Spawned {
        let config = StationConfig::new(
            id(me),
            id(dest),
            messages.iter().map(|m| m.to_string()).collect(),
        );
        let (station_io, hub_io) = tokio::io::duplex(1024);
        let (reader, writer) = tokio::io::split(station_io);
        let (tx, rx) = mpsc::unbounded_channel();

        let agent = StationAgent::new(config, reader, writer).with_events(tx);
        (hub_io, rx, tokio::spawn(agent.run()))
    }

    async fn expect_bytes(hub: &mut DuplexStream, expected: &[u8]) {
        let mut buf = vec![0u8; expected.len()];
        timeout(Duration::from_secs(2), hub.read_exact(&mut buf))
            .await
            .expect("timed out waiting for station output")
            .unwrap();
        assert_eq!(
            String::from_utf8_lossy(&buf),
            String::from_utf8_lossy(expected)
        );
    }

    async fn expect_silence(hub: &mut DuplexStream) {
        let mut buf = [0u8; 1];
        let result = timeout(Duration::from_millis(100), hub.read(&mut buf)).await;
        assert!(result.is_err(), "station transmitted unexpectedly");
    }

    #[tokio::test]
    async fn test_waits_for_ack_before_next_message() {
        let (mut hub, _events, handle) = spawn_agent('A', 'B', &["one", "two"]);

        expect_bytes(&mut hub, b"@BA-one~").await;
        expect_silence(&mut hub).await;

        hub.write_all(b"@AB-Ack~").await.unwrap();
        expect_bytes(&mut hub, b"@BA-two~").await;

        hub.write_all(b"@AB-Ack~").await.unwrap();
        expect_silence(&mut hub).await;

        drop(hub);
        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.sent, 2);
        assert_eq!(report.acknowledged, 2);
    }

    #[tokio::test]
    async fn test_stray_ack_does_not_release_next_message() {
        let (mut hub, mut events, handle) = spawn_agent('A', 'B', &["one", "two"]);

        expect_bytes(&mut hub, b"@BA-one~").await;
        hub.write_all(b"@AC-Ack~").await.unwrap();
        expect_silence(&mut hub).await;

        hub.write_all(b"@AB-Ack~").await.unwrap();
        expect_bytes(&mut hub, b"@BA-two~").await;

        drop(hub);
        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.stray_acks, 1);

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(seen.contains(&StationEvent::StrayAck { from: id('C') }));
    }

    #[tokio::test]
    async fn test_message_is_acknowledged_to_its_source() {
        let (mut hub, mut events, handle) = spawn_agent('B', 'A', &[]);

        hub.write_all(b"@BC-hello~").await.unwrap();
        expect_bytes(&mut hub, b"@CB-Ack~").await;

        let event = events.recv().await.unwrap();
        assert_eq!(
            event,
            StationEvent::Received {
                from: id('C'),
                payload: Bytes::from("hello"),
            }
        );

        drop(hub);
        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.received, 1);
        assert_eq!(report.sent, 0);
    }

    #[tokio::test]
    async fn test_skips_foreign_and_corrupted_frames() {
        let (mut hub, _events, handle) = spawn_agent('A', 'B', &["one", "two"]);

        expect_bytes(&mut hub, b"@BA-one~").await;
        hub.write_all(b"garbage~@CA-other~@AB-Ack~").await.unwrap();
        expect_bytes(&mut hub, b"@BA-two~").await;

        drop(hub);
        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.malformed, 1);
        assert_eq!(report.acknowledged, 1);
    }

    #[tokio::test]
    async fn test_frame_split_across_reads() {
        let (mut hub, _events, handle) = spawn_agent('B', 'A', &[]);

        hub.write_all(b"@BA-hel").await.unwrap();
        expect_silence(&mut hub).await;
        hub.write_all(b"lo~").await.unwrap();
        expect_bytes(&mut hub, b"@AB-Ack~").await;

        drop(hub);
        assert_eq!(handle.await.unwrap().unwrap().received, 1);
    }

    #[tokio::test]
    async fn test_longest_message_split_across_reads() {
        let (mut hub, _events, handle) = spawn_agent('B', 'A', &[]);

        let mut wire = b"@BA-".to_vec();
        wire.extend(std::iter::repeat(b'x').take(MAX_MESSAGE_LEN));
        wire.push(b'~');
        let (head, tail) = wire.split_at(3000);

        hub.write_all(head).await.unwrap();
        hub.write_all(tail).await.unwrap();
        expect_bytes(&mut hub, b"@AB-Ack~").await;

        drop(hub);
        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.received, 1);
        assert_eq!(report.malformed, 0);
    }

    #[tokio::test]
    async fn test_new_agent_is_ready_to_send() {
        let config = StationConfig::new(id('A'), id('B'), vec!["hi".to_string()]);
        let (station_io, _hub_io) = tokio::io::duplex(64);
        let (reader, writer) = tokio::io::split(station_io);

        let agent = StationAgent::new(config, reader, writer);
        assert_eq!(agent.id(), id('A'));
        assert_eq!(agent.state(), SendState::default());
        assert!(agent.state().can_send(1));
    }

    #[tokio::test]
    async fn test_keeps_answering_after_queue_exhausted() {
        let (mut hub, _events, handle) = spawn_agent('A', 'B', &["only"]);

        expect_bytes(&mut hub, b"@BA-only~").await;
        hub.write_all(b"@AB-Ack~").await.unwrap();
        expect_silence(&mut hub).await;

        hub.write_all(b"@AB-still there?~").await.unwrap();
        expect_bytes(&mut hub, b"@BA-Ack~").await;
        assert!(!handle.is_finished());

        drop(hub);
        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.sent, 1);
        assert_eq!(report.received, 1);
    }

    #[tokio::test]
    async fn test_end_of_stream_stops_pending_agent() {
        let (mut hub, _events, handle) = spawn_agent('A', 'B', &["never acked", "never sent"]);

        expect_bytes(&mut hub, b"@BA-never acked~").await;
        drop(hub);

        let report = timeout(Duration::from_secs(2), handle)
            .await
            .expect("agent did not stop at end of stream")
            .unwrap()
            .unwrap();
        assert_eq!(report.sent, 1);
        assert_eq!(report.acknowledged, 0);
    }
}
