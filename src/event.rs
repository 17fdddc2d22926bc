//! Runtime events for monitoring discovery, connections and the live peer set.
//!
//! Events are non-fatal notifications. The session keeps running after any
//! of them is emitted - they're for logging, UI and metrics, not error
//! handling.

use std::fmt;
use std::sync::Arc;

use crate::config::ServiceProfile;
use crate::transport::{DeviceAddress, DiscoverySource};

/// Why a peer left the live set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// The liveness check failed before a write.
    Disconnected,
    /// A write raised a transport error.
    WriteFailed(String),
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("peer disconnected"),
            Self::WriteFailed(reason) => write!(f, "write failed: {reason}"),
        }
    }
}

/// Runtime events emitted by the connection manager, broadcast engine and
/// session router.
///
/// # Example
///
/// ```
/// use syncstream::StreamEvent;
///
/// fn handle_event(event: StreamEvent) {
///     match event {
///         StreamEvent::ConnectionSummary { connected, attempted } => {
///             println!("{connected} of {attempted} candidates connected");
///         }
///         StreamEvent::PeerDropped { name, reason, .. } => {
///             println!("peer {name} dropped: {reason}");
///         }
///         StreamEvent::FallbackActivated => println!("playing locally"),
///         _ => {}
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A discovery path failed and the next one is being tried.
    DiscoveryFallback {
        /// Name of the backend that failed.
        backend: String,
        /// Description of the failure.
        reason: String,
    },

    /// Discovery finished on one of its paths.
    DiscoveryCompleted {
        /// Which path produced the result.
        source: DiscoverySource,
        /// Number of candidates found.
        found: usize,
    },

    /// Every discovery path failed; no candidates are available.
    DiscoveryUnavailable,

    /// One pass over the profile list failed for a candidate.
    ConnectAttemptFailed {
        /// Candidate address.
        address: DeviceAddress,
        /// 1-based pass number.
        attempt: u32,
        /// Last profile tried in this pass.
        profile: ServiceProfile,
        /// Description of the last failure.
        reason: String,
    },

    /// A candidate connected and was handed to the broadcast engine.
    PeerConnected {
        /// Peer address.
        address: DeviceAddress,
        /// Advisory device name.
        name: String,
        /// Profile that connected.
        profile: ServiceProfile,
    },

    /// A candidate was dropped after exhausting retries or hitting an
    /// unsupported stack.
    ConnectionFailed {
        /// Candidate address.
        address: DeviceAddress,
        /// Advisory device name.
        name: String,
        /// Passes made before giving up.
        attempts: u32,
        /// Why the candidate was dropped.
        reason: String,
    },

    /// A connect cycle finished.
    ConnectionSummary {
        /// Candidates that connected.
        connected: usize,
        /// Candidates attempted.
        attempted: usize,
    },

    /// A peer was evicted from the live set.
    PeerDropped {
        /// Peer address.
        address: DeviceAddress,
        /// Advisory device name.
        name: String,
        /// Why the peer was evicted.
        reason: DropReason,
    },

    /// No live peers remain; chunks are routed to the fallback sink.
    FallbackActivated,

    /// Peers are live again after a fallback period.
    PeersRestored {
        /// Number of live peers.
        peers: usize,
    },

    /// The fallback sink reported an error.
    SinkError {
        /// Name of the sink that errored.
        sink_name: String,
        /// Description of the error.
        error: String,
    },

    /// A chunk was refused because the queue was full.
    BufferOverflow {
        /// Total chunks refused so far in this session.
        dropped_chunks: u64,
    },
}

/// Callback type for receiving runtime events.
///
/// Register an event callback via [`SyncStreamBuilder::on_event()`].
///
/// [`SyncStreamBuilder::on_event()`]: crate::SyncStreamBuilder::on_event
pub type EventCallback = Arc<dyn Fn(StreamEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// # Example
///
/// ```
/// use syncstream::{event_callback, StreamEvent};
///
/// let callback = event_callback(|event| {
///     println!("Got event: {:?}", event);
/// });
/// callback(StreamEvent::FallbackActivated);
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(StreamEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Sends an event to an optional callback.
pub(crate) fn emit(callback: Option<&EventCallback>, event: StreamEvent) {
    if let Some(callback) = callback {
        callback(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_reason_display() {
        assert_eq!(DropReason::Disconnected.to_string(), "peer disconnected");
        assert_eq!(
            DropReason::WriteFailed("pipe".into()).to_string(),
            "write failed: pipe"
        );
    }

    #[test]
    fn test_stream_event_clone() {
        let event = StreamEvent::SinkError {
            sink_name: "file".to_string(),
            error: "disk full".to_string(),
        };
        if let StreamEvent::SinkError { sink_name, error } = event.clone() {
            assert_eq!(sink_name, "file");
            assert_eq!(error, "disk full");
        } else {
            panic!("Expected SinkError variant");
        }
    }

    #[test]
    fn test_emit_without_callback_is_noop() {
        emit(None, StreamEvent::FallbackActivated);
    }

    #[test]
    fn test_event_callback_helper() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let callback = event_callback(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        emit(Some(&callback), StreamEvent::FallbackActivated);
        emit(Some(&callback), StreamEvent::DiscoveryUnavailable);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
