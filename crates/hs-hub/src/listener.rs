//! Listener pool
//!
//! One task per station reads the station's transmissions and hands each
//! chunk, exactly as read, to the broadcaster. Reads are not aligned to
//! frames; a chunk may hold several frames or part of one. All listeners
//! share one cancellation token, checked before every read, so a relay
//! that has started always finishes.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use hs_core::{HubError, StationIndex};

use crate::registry::{Broadcaster, StationRegistry, StationSource, TxEndpoint};

/// Why a listener stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerExit {
    /// The station closed its transmit endpoint
    EndOfStream,
    /// The pool was stopped
    Cancelled,
    /// Reading failed; only this listener is affected
    Fault(String),
}

/// Final state of one listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerOutcome {
    pub index: StationIndex,
    pub name: String,
    pub exit: ListenerExit,
}

/// What ended the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The relay deadline elapsed
    Deadline,
    /// Shutdown was requested from outside
    Shutdown,
    /// Every listener ended on its own
    AllClosed,
}

/// Summary of a relay run
#[derive(Debug, Clone)]
pub struct RelaySummary {
    pub reason: StopReason,
    pub listeners: Vec<ListenerOutcome>,
}

struct Listener {
    index: StationIndex,
    name: String,
    /// Hands back the transmit endpoint so the pool decides when it closes
    handle: JoinHandle<(ListenerExit, TxEndpoint)>,
}

/// Running set of listeners, one per registered station
pub struct ListenerPool {
    relay: Arc<Broadcaster>,
    cancel: CancellationToken,
    listeners: Vec<Listener>,
    /// Yields `None` once every listener task has ended
    all_done: mpsc::Receiver<()>,
}

impl ListenerPool {
    /// Start relaying for every station in `registry`
    pub fn start(registry: StationRegistry, read_buffer_size: usize) -> Self {
        let (relay, sources) = registry.into_parts();
        let cancel = CancellationToken::new();
        let (alive_tx, all_done) = mpsc::channel::<()>(1);
        let read_buffer_size = read_buffer_size.max(1);

        let listeners = sources
            .into_iter()
            .map(|source| {
                let index = source.index;
                let name = source.name.clone();
                let handle = tokio::spawn(listen(
                    source,
                    Arc::clone(&relay),
                    cancel.clone(),
                    read_buffer_size,
                    alive_tx.clone(),
                ));
                Listener {
                    index,
                    name,
                    handle,
                }
            })
            .collect::<Vec<_>>();

        tracing::info!("Started {} hub listeners", listeners.len());

        Self {
            relay,
            cancel,
            listeners,
            all_done,
        }
    }

    /// Broadcaster shared by the listeners
    pub fn relay(&self) -> &Arc<Broadcaster> {
        &self.relay
    }

    /// Number of listeners
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Check if the pool has no listeners
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Cancel every listener.
    ///
    /// Listeners stop before their next read; a relay in progress completes.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Wait for every listener to end and collect how each one stopped
    pub async fn join(self) -> Vec<ListenerOutcome> {
        self.join_holding().await.0
    }

    /// Like [`ListenerPool::join`], also returning the transmit endpoints
    async fn join_holding(self) -> (Vec<ListenerOutcome>, Vec<TxEndpoint>) {
        let mut outcomes = Vec::with_capacity(self.listeners.len());
        let mut held = Vec::with_capacity(self.listeners.len());

        for listener in self.listeners {
            let exit = match listener.handle.await {
                Ok((exit, tx)) => {
                    held.push(tx);
                    exit
                }
                Err(e) => {
                    tracing::error!("Listener for {} aborted: {}", listener.index, e);
                    ListenerExit::Fault(e.to_string())
                }
            };
            outcomes.push(ListenerOutcome {
                index: listener.index,
                name: listener.name,
                exit,
            });
        }

        (outcomes, held)
    }

    /// Stop all listeners, wait for them, then close every receive endpoint.
    ///
    /// Transmit endpoints stay open until the receive endpoints are closed,
    /// so a station still answering the last relayed frames can write them.
    pub async fn shutdown(self) -> Vec<ListenerOutcome> {
        self.stop();
        let relay = Arc::clone(&self.relay);
        let (outcomes, held) = self.join_holding().await;
        relay.close_all().await;
        drop(held);
        outcomes
    }

    /// Relay until `deadline` elapses, `shutdown` fires, or every station
    /// has closed its transmit endpoint; then shut the pool down.
    pub async fn run_until(mut self, deadline: Duration, shutdown: &CancellationToken) -> RelaySummary {
        let reason = tokio::select! {
            _ = tokio::time::sleep(deadline) => StopReason::Deadline,
            _ = shutdown.cancelled() => StopReason::Shutdown,
            _ = self.all_done.recv() => StopReason::AllClosed,
        };

        tracing::info!("Stopping hub listeners ({:?})", reason);
        let listeners = self.shutdown().await;

        RelaySummary { reason, listeners }
    }
}

async fn listen(
    source: StationSource,
    relay: Arc<Broadcaster>,
    cancel: CancellationToken,
    read_buffer_size: usize,
    _alive: mpsc::Sender<()>,
) -> (ListenerExit, TxEndpoint) {
    let StationSource {
        index,
        name,
        mut tx,
    } = source;
    let mut buffer = vec![0u8; read_buffer_size];

    tracing::debug!("Listening to {} ({})", index, name);

    loop {
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            read = tx.read(&mut buffer) => Some(read),
        };
        let Some(read) = read else {
            tracing::debug!("Listener for {} cancelled", index);
            return (ListenerExit::Cancelled, tx);
        };

        match read {
            Ok(0) => {
                tracing::info!("Pipe closed by {} ({})", index, name);
                return (ListenerExit::EndOfStream, tx);
            }
            Ok(n) => {
                tracing::debug!(
                    "Received {} bytes from {} >{}<",
                    n,
                    index,
                    String::from_utf8_lossy(&buffer[..n])
                );
                relay.broadcast(index, &buffer[..n]).await;
            }
            Err(e) => {
                let fault = HubError::Transport {
                    station: index,
                    source: e,
                };
                tracing::error!("Listener for {} stopped: {}", name, fault);
                return (ListenerExit::Fault(fault.to_string()), tx);
            }
        }
    }
}
