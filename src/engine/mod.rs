//! Fan-out broadcast engine.
//!
//! The engine owns the live peer set. Each [`dispatch`](BroadcastEngine::dispatch)
//! takes a snapshot of the set, writes the chunk to every peer concurrently,
//! waits for every write to settle and then removes the failed peers in one
//! step. Nothing mutates the set while the writes are in flight.

mod peer;

pub use peer::{PeerConnection, PeerId};

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::event::{emit, DropReason};
use crate::transport::DeviceAddress;
use crate::{AudioChunk, EventCallback, StreamEvent, SyncStreamError};

/// Result of one [`BroadcastEngine::dispatch`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The live set was empty; nothing was written. Route the chunk to the
    /// fallback sink.
    NoPeers,
    /// Every peer in the snapshot was attempted.
    Dispatched {
        /// Peers that accepted the whole chunk.
        delivered: usize,
        /// Peers removed from the live set by this call.
        evicted: usize,
    },
}

impl DispatchOutcome {
    /// Returns `true` for [`DispatchOutcome::NoPeers`].
    pub fn is_no_peers(&self) -> bool {
        matches!(self, Self::NoPeers)
    }
}

/// Counters kept by the engine over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Chunks dispatched to at least one peer.
    pub chunks_dispatched: u64,
    /// Successful per-peer writes.
    pub writes_delivered: u64,
    /// Peers evicted after a failed liveness check or write.
    pub peers_evicted: u64,
}

/// Owns the live peer set and fans chunks out to it.
///
/// All methods take `&self`; share the engine behind an `Arc`. Dispatch calls
/// are serialized internally, so per-peer chunk order is the order in which
/// `dispatch` was entered. [`disconnect_all`](Self::disconnect_all) and
/// [`add_peer`](Self::add_peer) never wait for an in-flight dispatch.
///
/// # Example
///
/// ```
/// use syncstream::transport::mock::MockTransport;
/// use syncstream::{AudioChunk, BroadcastEngine, DispatchOutcome, PeerConnection, ServiceProfile};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let engine = BroadcastEngine::new();
/// let speaker = MockTransport::new();
/// engine
///     .add_peer(PeerConnection::new(1u64, "Speaker", ServiceProfile::AudioSink, Box::new(speaker.clone())))
///     .unwrap();
///
/// let outcome = engine.dispatch(&AudioChunk::new(vec![0u8; 1024], 0, Duration::ZERO)).await;
/// assert_eq!(outcome, DispatchOutcome::Dispatched { delivered: 1, evicted: 0 });
/// assert_eq!(speaker.write_count(), 1);
/// # }
/// ```
pub struct BroadcastEngine {
    peers: Mutex<HashMap<DeviceAddress, Arc<PeerConnection>>>,
    dispatch_lock: tokio::sync::Mutex<()>,
    event_callback: Option<EventCallback>,
    chunks_dispatched: AtomicU64,
    writes_delivered: AtomicU64,
    peers_evicted: AtomicU64,
}

impl BroadcastEngine {
    /// Creates an engine with an empty peer set.
    pub fn new() -> Self {
        Self {
            peers: Mutex::new(HashMap::new()),
            dispatch_lock: tokio::sync::Mutex::new(()),
            event_callback: None,
            chunks_dispatched: AtomicU64::new(0),
            writes_delivered: AtomicU64::new(0),
            peers_evicted: AtomicU64::new(0),
        }
    }

    /// Sets the callback that receives `PeerDropped` events.
    #[must_use]
    pub fn with_event_callback(mut self, callback: EventCallback) -> Self {
        self.event_callback = Some(callback);
        self
    }

    /// Inserts a connection into the live set.
    ///
    /// # Errors
    ///
    /// Returns [`SyncStreamError::InvalidPeer`] if the connection is no longer
    /// live or its address is already in the set. The rejected connection is
    /// closed in the background when called inside a tokio runtime; prefer
    /// [`admit`](Self::admit) from async code.
    pub fn add_peer(&self, peer: PeerConnection) -> Result<PeerId, SyncStreamError> {
        self.try_insert(peer).map_err(|(error, rejected)| {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move { close_rejected(&rejected).await });
            }
            error
        })
    }

    /// Inserts a connection into the live set, closing it before returning
    /// if it is rejected.
    ///
    /// # Errors
    ///
    /// Same as [`add_peer`](Self::add_peer).
    pub async fn admit(&self, peer: PeerConnection) -> Result<PeerId, SyncStreamError> {
        match self.try_insert(peer) {
            Ok(id) => Ok(id),
            Err((error, rejected)) => {
                close_rejected(&rejected).await;
                Err(error)
            }
        }
    }

    #[allow(clippy::result_large_err)]
    fn try_insert(
        &self,
        peer: PeerConnection,
    ) -> Result<PeerId, (SyncStreamError, PeerConnection)> {
        let address = peer.address();
        if !peer.is_connected() {
            let error = SyncStreamError::InvalidPeer {
                address,
                reason: "transport is not live".to_string(),
            };
            return Err((error, peer));
        }

        let id = peer.id();
        match self.peers.lock().entry(address) {
            Entry::Occupied(_) => {
                let error = SyncStreamError::InvalidPeer {
                    address,
                    reason: "address is already in the live set".to_string(),
                };
                return Err((error, peer));
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(peer));
            }
        }

        debug!(%address, %id, "peer added to live set");
        Ok(id)
    }

    /// Writes `chunk` to every live peer concurrently and evicts the ones
    /// that fail.
    ///
    /// Returns [`DispatchOutcome::NoPeers`] without waiting on anything when
    /// the live set is empty.
    pub async fn dispatch(&self, chunk: &AudioChunk) -> DispatchOutcome {
        let _serial = self.dispatch_lock.lock().await;

        let snapshot: Vec<Arc<PeerConnection>> = self.peers.lock().values().cloned().collect();
        if snapshot.is_empty() {
            return DispatchOutcome::NoPeers;
        }

        let results = join_all(snapshot.iter().map(|peer| peer.deliver(chunk))).await;

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (peer, result) in snapshot.into_iter().zip(results) {
            match result {
                Ok(()) => delivered += 1,
                Err(reason) => failed.push((peer, reason)),
            }
        }

        let evicted = if failed.is_empty() {
            0
        } else {
            self.evict(failed).await
        };

        self.chunks_dispatched.fetch_add(1, Ordering::Relaxed);
        self.writes_delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        debug!(
            sequence = chunk.sequence,
            bytes = chunk.len(),
            delivered,
            evicted,
            "chunk dispatched"
        );

        DispatchOutcome::Dispatched { delivered, evicted }
    }

    /// Removes the failed peers that are still in the set, then closes them.
    ///
    /// A peer already removed by `disconnect_all` is skipped, so no peer is
    /// reported dropped twice.
    async fn evict(&self, failed: Vec<(Arc<PeerConnection>, DropReason)>) -> usize {
        let removed: Vec<_> = {
            let mut peers = self.peers.lock();
            failed
                .into_iter()
                .filter(|(peer, _)| {
                    let current = peers.get(&peer.address()).map(|p| p.id());
                    if current == Some(peer.id()) {
                        peers.remove(&peer.address());
                        true
                    } else {
                        false
                    }
                })
                .collect()
        };

        for (peer, reason) in &removed {
            warn!(
                address = %peer.address(),
                name = peer.name(),
                %reason,
                "peer dropped"
            );
            emit(
                self.event_callback.as_ref(),
                StreamEvent::PeerDropped {
                    address: peer.address(),
                    name: peer.name().to_string(),
                    reason: reason.clone(),
                },
            );
        }

        join_all(removed.iter().map(|(peer, _)| async move {
            if let Err(e) = peer.close().await {
                debug!(address = %peer.address(), error = %e, "close after eviction failed");
            }
        }))
        .await;

        self.peers_evicted
            .fetch_add(removed.len() as u64, Ordering::Relaxed);
        removed.len()
    }

    /// Closes every live peer and empties the set.
    ///
    /// The set is empty as soon as this is entered; a dispatch already in
    /// flight finishes against its snapshot and evicts nothing. Close
    /// failures are logged and otherwise ignored. Returns the number of peers
    /// that were disconnected.
    pub async fn disconnect_all(&self) -> usize {
        let drained: Vec<Arc<PeerConnection>> = {
            let mut peers = self.peers.lock();
            std::mem::take(&mut *peers).into_values().collect()
        };

        join_all(drained.iter().map(|peer| async move {
            if let Err(e) = peer.close().await {
                warn!(address = %peer.address(), error = %e, "failed to close peer");
            }
        }))
        .await;

        if !drained.is_empty() {
            info!(peers = drained.len(), "disconnected all peers");
        }
        drained.len()
    }

    /// Returns the number of live peers.
    pub fn peer_count(&self) -> usize {
        self.peers.lock().len()
    }

    /// Returns `true` if no peer is live.
    pub fn is_empty(&self) -> bool {
        self.peers.lock().is_empty()
    }

    /// Returns `true` if `address` is in the live set.
    pub fn contains(&self, address: DeviceAddress) -> bool {
        self.peers.lock().contains_key(&address)
    }

    /// Returns the live addresses in ascending order.
    pub fn peer_addresses(&self) -> Vec<DeviceAddress> {
        let mut addresses: Vec<_> = self.peers.lock().keys().copied().collect();
        addresses.sort_unstable();
        addresses
    }

    /// Returns the engine counters.
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            chunks_dispatched: self.chunks_dispatched.load(Ordering::Relaxed),
            writes_delivered: self.writes_delivered.load(Ordering::Relaxed),
            peers_evicted: self.peers_evicted.load(Ordering::Relaxed),
        }
    }
}

impl Default for BroadcastEngine {
    fn default() -> Self {
        Self::new()
    }
}

async fn close_rejected(peer: &PeerConnection) {
    if let Err(e) = peer.close().await {
        debug!(address = %peer.address(), error = %e, "close of rejected connection failed");
    }
}
