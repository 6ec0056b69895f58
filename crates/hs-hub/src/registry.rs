//! Station registry and broadcast relay
//!
//! Stations are registered before relaying starts. Starting the relay
//! consumes the registry and splits it into the per-station transmit
//! endpoints (handed to the listeners) and a [`Broadcaster`] holding the
//! receive endpoints. The broadcaster's station table never changes after
//! that, so listeners share it through an `Arc` without locking the table.
//!
//! Each receive endpoint sits behind its own async mutex. Several listeners
//! may broadcast at the same time, and the mutex makes every relayed chunk
//! land in a receiver's stream as one contiguous write.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use hs_core::{HubError, StationIndex};

/// Endpoint the hub reads a station's transmissions from
pub type TxEndpoint = Box<dyn AsyncRead + Send + Unpin>;

/// Endpoint the hub writes a station's receptions to
pub type RxEndpoint = Box<dyn AsyncWrite + Send + Unpin>;

/// Station registered but not yet relaying
struct PendingStation {
    name: String,
    tx: TxEndpoint,
    rx: RxEndpoint,
}

/// Append-only table of stations, filled before relaying starts
pub struct StationRegistry {
    capacity: usize,
    stations: Vec<PendingStation>,
}

impl StationRegistry {
    /// Create an empty registry holding at most `capacity` stations
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            stations: Vec::with_capacity(capacity),
        }
    }

    /// Register a station's endpoint pair.
    ///
    /// Fails with [`HubError::CapacityExceeded`] once the registry is full,
    /// leaving it unchanged.
    pub fn register<T, R>(
        &mut self,
        name: impl Into<String>,
        tx: T,
        rx: R,
    ) -> Result<StationIndex, HubError>
    where
        T: AsyncRead + Send + Unpin + 'static,
        R: AsyncWrite + Send + Unpin + 'static,
    {
        if self.is_full() {
            return Err(HubError::CapacityExceeded { max: self.capacity });
        }

        let index = StationIndex::new(self.stations.len());
        let name = name.into();
        tracing::debug!("Registered {} ({})", index, name);

        self.stations.push(PendingStation {
            name,
            tx: Box::new(tx),
            rx: Box::new(rx),
        });
        Ok(index)
    }

    /// Number of registered stations
    pub fn len(&self) -> usize {
        self.stations.len()
    }

    /// Check if no station is registered
    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Maximum number of stations
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether another registration would be rejected
    pub fn is_full(&self) -> bool {
        self.stations.len() >= self.capacity
    }

    /// Names of registered stations, in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stations.iter().map(|s| s.name.as_str())
    }

    /// Freeze the registry for relaying
    pub fn into_parts(self) -> (Arc<Broadcaster>, Vec<StationSource>) {
        let mut ports = Vec::with_capacity(self.stations.len());
        let mut sources = Vec::with_capacity(self.stations.len());

        for (i, station) in self.stations.into_iter().enumerate() {
            let index = StationIndex::new(i);
            ports.push(StationPort {
                index,
                name: station.name.clone(),
                rx: Mutex::new(Some(station.rx)),
            });
            sources.push(StationSource {
                index,
                name: station.name,
                tx: station.tx,
            });
        }

        (Arc::new(Broadcaster { ports }), sources)
    }
}

/// A station's transmit side, owned by its listener
pub struct StationSource {
    /// Registration position
    pub index: StationIndex,
    /// Station name used in logs
    pub name: String,
    /// Endpoint carrying the station's transmissions
    pub tx: TxEndpoint,
}

/// A station's receive side inside the broadcaster
struct StationPort {
    index: StationIndex,
    name: String,
    /// `None` once the endpoint failed or was closed
    rx: Mutex<Option<RxEndpoint>>,
}

/// Outcome of one broadcast
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Stations the payload was written to
    pub delivered: Vec<StationIndex>,
    /// Stations whose endpoint failed or was already closed
    pub failed: Vec<StationIndex>,
}

/// Read-only station table used to relay traffic
pub struct Broadcaster {
    ports: Vec<StationPort>,
}

impl Broadcaster {
    /// Write `payload` to every station except `sender`, in registration order.
    ///
    /// A failing endpoint is closed and skipped from then on; the other
    /// stations still receive the payload.
    pub async fn broadcast(&self, sender: StationIndex, payload: &[u8]) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        for port in self.ports.iter().filter(|p| p.index != sender) {
            let mut guard = port.rx.lock().await;
            let Some(rx) = guard.as_mut() else {
                tracing::trace!("Skipping closed endpoint of {} ({})", port.index, port.name);
                report.failed.push(port.index);
                continue;
            };

            match write_unit(rx, payload).await {
                Ok(()) => {
                    tracing::trace!(
                        "Relayed {} bytes from {} to {}",
                        payload.len(),
                        sender,
                        port.index
                    );
                    report.delivered.push(port.index);
                }
                Err(e) => {
                    tracing::warn!(
                        "Write to {} ({}) failed, closing its endpoint: {}",
                        port.index,
                        port.name,
                        e
                    );
                    *guard = None;
                    report.failed.push(port.index);
                }
            }
        }

        report
    }

    /// Close every receive endpoint.
    ///
    /// Stations see end-of-stream on their next read and stop.
    pub async fn close_all(&self) {
        for port in &self.ports {
            if let Some(mut rx) = port.rx.lock().await.take() {
                if let Err(e) = rx.shutdown().await {
                    tracing::debug!("Shutdown of {} endpoint failed: {}", port.index, e);
                }
                tracing::debug!("Closed receive endpoint of {} ({})", port.index, port.name);
            }
        }
    }

    /// Whether a station's receive endpoint is still open
    pub async fn is_open(&self, index: StationIndex) -> bool {
        match self.ports.get(index.as_usize()) {
            Some(port) => port.rx.lock().await.is_some(),
            None => false,
        }
    }

    /// Number of stations
    pub fn len(&self) -> usize {
        self.ports.len()
    }

    /// Check if there are no stations
    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}

async fn write_unit(rx: &mut RxEndpoint, payload: &[u8]) -> std::io::Result<()> {
    rx.write_all(payload).await?;
    rx.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, DuplexStream};

    const MAX_STATIONS: usize = 10;

    /// Register `n` stations and return each station's receiving end
    fn registry_with(n: usize) -> (StationRegistry, Vec<DuplexStream>, Vec<DuplexStream>) {
        let mut registry = StationRegistry::with_capacity(MAX_STATIONS);
        let mut receivers = Vec::new();
        let mut transmitters = Vec::new();

        for i in 0..n {
            let (hub_tx, station_out) = tokio::io::duplex(64 * 1024);
            let (hub_rx, station_in) = tokio::io::duplex(64 * 1024);
            registry
                .register(format!("stn{}", i), hub_tx, hub_rx)
                .unwrap();
            receivers.push(station_in);
            transmitters.push(station_out);
        }

        (registry, receivers, transmitters)
    }

    #[test]
    fn test_register_assigns_sequential_indexes() {
        let mut registry = StationRegistry::with_capacity(3);
        for expected in 0..3 {
            let (a, _) = tokio::io::duplex(16);
            let (b, _) = tokio::io::duplex(16);
            let index = registry.register("stn", a, b).unwrap();
            assert_eq!(index, StationIndex::new(expected));
        }
        assert!(registry.is_full());
    }

    #[test]
    fn test_register_beyond_capacity() {
        let (mut registry, _rx, _tx) = registry_with(MAX_STATIONS);
        let (a, _) = tokio::io::duplex(16);
        let (b, _) = tokio::io::duplex(16);

        let result = registry.register("one too many", a, b);
        assert!(matches!(
            result,
            Err(HubError::CapacityExceeded { max: MAX_STATIONS })
        ));
        assert_eq!(registry.len(), MAX_STATIONS);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_everyone_but_sender() {
        for n in 1..=MAX_STATIONS {
            let (registry, mut receivers, _tx) = registry_with(n);
            let (relay, _sources) = registry.into_parts();

            let mut expected: Vec<Vec<u8>> = vec![Vec::new(); n];
            for sender in 0..n {
                let payload = format!("@X{}-from {}~", sender, sender).into_bytes();
                let report = relay.broadcast(StationIndex::new(sender), &payload).await;

                assert_eq!(report.delivered.len(), n - 1);
                assert!(!report.delivered.contains(&StationIndex::new(sender)));
                for (i, bytes) in expected.iter_mut().enumerate() {
                    if i != sender {
                        bytes.extend_from_slice(&payload);
                    }
                }
            }

            relay.close_all().await;
            for (i, receiver) in receivers.iter_mut().enumerate() {
                let mut received = Vec::new();
                receiver.read_to_end(&mut received).await.unwrap();
                assert_eq!(received, expected[i], "station {} of {}", i, n);
            }
        }
    }

    #[tokio::test]
    async fn test_failed_endpoint_does_not_stop_broadcast() {
        let (registry, mut receivers, _tx) = registry_with(3);
        let (relay, _sources) = registry.into_parts();

        // Station 1 goes away
        drop(receivers.remove(1));

        let report = relay.broadcast(StationIndex::new(0), b"@BA-hi~").await;
        assert_eq!(report.delivered, vec![StationIndex::new(2)]);
        assert_eq!(report.failed, vec![StationIndex::new(1)]);
        assert!(!relay.is_open(StationIndex::new(1)).await);

        let again = relay.broadcast(StationIndex::new(0), b"@BA-hi~").await;
        assert_eq!(again.failed, vec![StationIndex::new(1)]);

        relay.close_all().await;
        let mut received = Vec::new();
        receivers[1].read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"@BA-hi~@BA-hi~");
    }

    #[tokio::test]
    async fn test_close_all_ends_station_streams() {
        let (registry, mut receivers, _tx) = registry_with(2);
        let (relay, _sources) = registry.into_parts();

        relay.close_all().await;
        assert!(!relay.is_open(StationIndex::new(0)).await);

        let mut buf = [0u8; 8];
        for receiver in receivers.iter_mut() {
            assert_eq!(receiver.read(&mut buf).await.unwrap(), 0);
        }
    }

    #[test]
    fn test_into_parts_preserves_order() {
        let (registry, _rx, _tx) = registry_with(4);
        let names: Vec<String> = registry.names().map(String::from).collect();
        let (relay, sources) = registry.into_parts();

        assert_eq!(relay.len(), 4);
        for (i, source) in sources.iter().enumerate() {
            assert_eq!(source.index, StationIndex::new(i));
            assert_eq!(source.name, names[i]);
        }
    }
}
