//! Live peer connections owned by the broadcast engine.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::config::ServiceProfile;
use crate::event::DropReason;
use crate::transport::{DeviceAddress, PeerCandidate, Transport};
use crate::{AudioChunk, TransportError};

static NEXT_PEER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one connection, unique for the process lifetime.
///
/// Two connections to the same address over time get different ids, so an
/// eviction computed against an old snapshot never removes a newer peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(u64);

impl PeerId {
    fn next() -> Self {
        Self(NEXT_PEER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// A live transport bound to one device address and the profile that
/// connected it.
///
/// Once handed to [`BroadcastEngine::add_peer`](crate::BroadcastEngine::add_peer)
/// the engine owns it exclusively.
pub struct PeerConnection {
    id: PeerId,
    address: DeviceAddress,
    name: String,
    profile: ServiceProfile,
    transport: Box<dyn Transport>,
    connected: AtomicBool,
    chunks_sent: AtomicU64,
    bytes_sent: AtomicU64,
}

impl PeerConnection {
    /// Binds an open transport to a device.
    pub fn new(
        address: impl Into<DeviceAddress>,
        name: impl Into<String>,
        profile: ServiceProfile,
        transport: Box<dyn Transport>,
    ) -> Self {
        Self {
            id: PeerId::next(),
            address: address.into(),
            name: name.into(),
            profile,
            transport,
            connected: AtomicBool::new(true),
            chunks_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
        }
    }

    /// Binds an open transport to the candidate it was negotiated for.
    pub fn from_candidate(
        candidate: &PeerCandidate,
        profile: ServiceProfile,
        transport: Box<dyn Transport>,
    ) -> Self {
        Self::new(candidate.address, candidate.name.clone(), profile, transport)
    }

    /// Returns the connection id.
    pub fn id(&self) -> PeerId {
        self.id
    }

    /// Returns the device address.
    pub fn address(&self) -> DeviceAddress {
        self.address
    }

    /// Returns the advisory device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the profile this connection was negotiated with.
    pub fn profile(&self) -> ServiceProfile {
        self.profile
    }

    /// Returns `true` until a write fails, the transport reports the remote
    /// gone, or the connection is closed.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.transport.is_live()
    }

    /// Returns the number of chunks written successfully.
    pub fn chunks_sent(&self) -> u64 {
        self.chunks_sent.load(Ordering::Relaxed)
    }

    /// Returns the number of bytes written successfully.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    /// Checks liveness, then writes the whole chunk.
    ///
    /// Any failure clears the connected flag for good.
    pub(crate) async fn deliver(&self, chunk: &AudioChunk) -> Result<(), DropReason> {
        if !self.is_connected() {
            self.connected.store(false, Ordering::SeqCst);
            return Err(DropReason::Disconnected);
        }

        match self.transport.write(chunk).await {
            Ok(()) => {
                self.chunks_sent.fetch_add(1, Ordering::Relaxed);
                self.bytes_sent
                    .fetch_add(chunk.len() as u64, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.connected.store(false, Ordering::SeqCst);
                Err(DropReason::WriteFailed(e.to_string()))
            }
        }
    }

    pub(crate) async fn close(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        self.transport.close().await
    }
}

impl fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerConnection")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("name", &self.name)
            .field("profile", &self.profile)
            .field("connected", &self.connected.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;
    use std::time::Duration;

    fn peer(transport: &MockTransport) -> PeerConnection {
        PeerConnection::new(
            0xA1_u64,
            "Kitchen",
            ServiceProfile::AudioSink,
            Box::new(transport.clone()),
        )
    }

    #[test]
    fn test_peer_ids_are_unique() {
        let transport = MockTransport::new();
        let a = peer(&transport);
        let b = peer(&transport);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.address(), b.address());
    }

    #[tokio::test]
    async fn test_deliver_counts_bytes() {
        let transport = MockTransport::new();
        let peer = peer(&transport);

        peer.deliver(&AudioChunk::new(vec![0u8; 512], 0, Duration::ZERO))
            .await
            .unwrap();

        assert_eq!(peer.chunks_sent(), 1);
        assert_eq!(peer.bytes_sent(), 512);
        assert_eq!(transport.received_sequences(), vec![0]);
    }

    #[tokio::test]
    async fn test_deliver_skips_dead_transport() {
        let transport = MockTransport::new();
        let peer = peer(&transport);
        transport.set_live(false);

        let result = peer
            .deliver(&AudioChunk::new(vec![1u8], 0, Duration::ZERO))
            .await;

        assert_eq!(result, Err(DropReason::Disconnected));
        assert_eq!(transport.write_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_write_is_terminal() {
        let transport = MockTransport::new().fail_after(0);
        let peer = peer(&transport);

        let result = peer
            .deliver(&AudioChunk::new(vec![1u8], 0, Duration::ZERO))
            .await;
        assert!(matches!(result, Err(DropReason::WriteFailed(_))));
        assert!(!peer.is_connected());
        assert!(transport.is_live());
    }

    #[test]
    fn test_debug_omits_transport() {
        let peer = peer(&MockTransport::new());
        let debug = format!("{peer:?}");
        assert!(debug.contains("Kitchen"));
        assert!(debug.contains(".."));
    }
}
