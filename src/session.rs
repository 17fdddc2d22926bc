//! Streaming session management.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::{PcmFormat, StreamConfig};
use crate::engine::BroadcastEngine;
use crate::event::emit;
use crate::fallback::FallbackSink;
use crate::pipeline::{Router, RouterCommand};
use crate::{AudioChunk, EventCallback, StreamEvent, SyncStreamError};

/// Statistics about a streaming session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Chunks taken off the queue by the router.
    pub chunks_received: u64,
    /// Chunks delivered to at least one peer.
    pub chunks_dispatched: u64,
    /// Chunks played by the fallback sink.
    pub chunks_to_fallback: u64,
    /// Chunks refused by `try_send` because the queue was full.
    pub chunks_dropped: u64,
    /// Peers evicted during the session.
    pub peers_evicted: u64,
}

/// Internal state shared between Session and background tasks.
pub(crate) struct SessionState {
    pub running: AtomicBool,
    pub chunks_received: AtomicU64,
    pub chunks_dispatched: AtomicU64,
    pub chunks_to_fallback: AtomicU64,
    pub chunks_dropped: AtomicU64,
    pub peers_evicted: AtomicU64,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            chunks_received: AtomicU64::new(0),
            chunks_dispatched: AtomicU64::new(0),
            chunks_to_fallback: AtomicU64::new(0),
            chunks_dropped: AtomicU64::new(0),
            peers_evicted: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            chunks_received: self.chunks_received.load(Ordering::SeqCst),
            chunks_dispatched: self.chunks_dispatched.load(Ordering::SeqCst),
            chunks_to_fallback: self.chunks_to_fallback.load(Ordering::SeqCst),
            chunks_dropped: self.chunks_dropped.load(Ordering::SeqCst),
            peers_evicted: self.peers_evicted.load(Ordering::SeqCst),
        }
    }
}

/// Handle to a running router task.
///
/// Created by [`SyncStream::start_session`] and held by the
/// [`SyncStream`]; dropping it without [`stop`](Session::stop) still stops
/// the router and disconnects the peers in the background.
///
/// [`SyncStream`]: crate::SyncStream
/// [`SyncStream::start_session`]: crate::SyncStream::start_session
pub(crate) struct Session {
    state: Arc<SessionState>,
    engine: Arc<BroadcastEngine>,
    router_cmd_tx: mpsc::Sender<RouterCommand>,
    router_handle: Option<JoinHandle<()>>,
}

impl Session {
    /// Spawns the router task and returns the session with its producer
    /// handle.
    pub(crate) fn start(
        engine: Arc<BroadcastEngine>,
        fallback: Arc<dyn FallbackSink>,
        config: &StreamConfig,
        event_callback: Option<EventCallback>,
    ) -> (Self, ChunkSender) {
        let state = Arc::new(SessionState::new());
        let (chunk_tx, chunk_rx) = mpsc::channel(config.chunk_queue_capacity.max(1));
        let (router_cmd_tx, cmd_rx) = mpsc::channel(1);

        let router = Router::new(Arc::clone(&engine), fallback, Arc::clone(&state))
            .with_event_callback(event_callback.clone());
        let router_handle = tokio::spawn(router.run(chunk_rx, cmd_rx));

        info!(
            peers = engine.peer_count(),
            queue = config.chunk_queue_capacity,
            "streaming session started"
        );

        let sender = ChunkSender {
            tx: chunk_tx,
            sequence: Arc::new(AtomicU64::new(0)),
            started: Instant::now(),
            format: config.format,
            chunk_duration: config.chunk_duration,
            state: Arc::clone(&state),
            event_callback,
        };

        let session = Self {
            state,
            engine,
            router_cmd_tx,
            router_handle: Some(router_handle),
        };
        (session, sender)
    }

    /// Returns `true` if the session is still running.
    pub(crate) fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    /// Returns current session statistics.
    pub(crate) fn stats(&self) -> SessionStats {
        self.state.stats()
    }

    /// Stops the router, draining queued chunks, then disconnects every peer.
    ///
    /// Calling it again is a no-op.
    pub(crate) async fn stop(&mut self) {
        if !self.state.running.swap(false, Ordering::SeqCst) {
            // Already stopped
            return;
        }

        let _ = self.router_cmd_tx.send(RouterCommand::Stop).await;
        if let Some(handle) = self.router_handle.take() {
            let _ = handle.await;
        }

        let disconnected = self.engine.disconnect_all().await;
        let stats = self.state.stats();
        info!(
            chunks = stats.chunks_received,
            to_fallback = stats.chunks_to_fallback,
            disconnected,
            "streaming session stopped"
        );
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.state.running.swap(false, Ordering::SeqCst) {
            // Dropped without stop() - trigger background cleanup
            let _ = self.router_cmd_tx.try_send(RouterCommand::Stop);
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                let engine = Arc::clone(&self.engine);
                runtime.spawn(async move {
                    engine.disconnect_all().await;
                });
            }
        }
    }
}

/// Producer handle for a streaming session: the `onChunk` interface.
///
/// Each submitted buffer becomes one [`AudioChunk`] with the next sequence
/// number and a timestamp relative to session start. Clones share the
/// sequence counter; submit from one task at a time to keep per-peer order
/// meaningful.
///
/// # Example
///
/// ```ignore
/// let sender = stream.start_session().await?;
/// while let Some(buffer) = capture.next().await {
///     sender.send(buffer).await?;
/// }
/// stream.stop_session().await;
/// ```
#[derive(Clone)]
pub struct ChunkSender {
    tx: mpsc::Sender<AudioChunk>,
    sequence: Arc<AtomicU64>,
    started: Instant,
    format: PcmFormat,
    chunk_duration: Duration,
    state: Arc<SessionState>,
    event_callback: Option<EventCallback>,
}

impl ChunkSender {
    fn make_chunk(&self, bytes: Vec<u8>) -> AudioChunk {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        AudioChunk::new(bytes, sequence, self.started.elapsed())
    }

    /// Queues one captured buffer, waiting for queue space if needed.
    ///
    /// With the default queue capacity the wait is bounded by one dispatch
    /// cycle. Returns the chunk's sequence number.
    ///
    /// # Errors
    ///
    /// Returns [`SyncStreamError::SessionStopped`] once the session has
    /// stopped.
    pub async fn send(&self, bytes: impl Into<Vec<u8>>) -> Result<u64, SyncStreamError> {
        if !self.is_running() {
            return Err(SyncStreamError::SessionStopped);
        }
        let permit = self
            .tx
            .reserve()
            .await
            .map_err(|_| SyncStreamError::SessionStopped)?;

        let chunk = self.make_chunk(bytes.into());
        let sequence = chunk.sequence;
        permit.send(chunk);
        Ok(sequence)
    }

    /// Queues one captured buffer without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`SyncStreamError::ChunkQueueFull`] (and emits
    /// [`StreamEvent::BufferOverflow`]) if the queue is full, or
    /// [`SyncStreamError::SessionStopped`] once the session has stopped.
    pub fn try_send(&self, bytes: impl Into<Vec<u8>>) -> Result<u64, SyncStreamError> {
        if !self.is_running() {
            return Err(SyncStreamError::SessionStopped);
        }
        let permit = match self.tx.try_reserve() {
            Ok(permit) => permit,
            Err(TrySendError::Full(())) => {
                let dropped = self.state.chunks_dropped.fetch_add(1, Ordering::SeqCst) + 1;
                debug!(dropped, "chunk queue full");
                emit(
                    self.event_callback.as_ref(),
                    StreamEvent::BufferOverflow {
                        dropped_chunks: dropped,
                    },
                );
                return Err(SyncStreamError::ChunkQueueFull);
            }
            Err(TrySendError::Closed(())) => return Err(SyncStreamError::SessionStopped),
        };

        let chunk = self.make_chunk(bytes.into());
        let sequence = chunk.sequence;
        permit.send(chunk);
        Ok(sequence)
    }

    /// Returns `true` while the session accepts chunks.
    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst) && !self.tx.is_closed()
    }

    /// Layout the session was configured with
    /// ([`StreamConfig::format`](crate::StreamConfig::format)).
    pub fn format(&self) -> PcmFormat {
        self.format
    }

    /// Audio per chunk for capture adapters feeding this session
    /// ([`StreamConfig::chunk_duration`](crate::StreamConfig::chunk_duration)).
    pub fn chunk_duration(&self) -> Duration {
        self.chunk_duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceProfile;
    use crate::engine::PeerConnection;
    use crate::fallback::ChannelFallback;
    use crate::transport::mock::MockTransport;

    fn engine_with_peer() -> (Arc<BroadcastEngine>, MockTransport) {
        let engine = Arc::new(BroadcastEngine::new());
        let transport = MockTransport::new();
        engine
            .add_peer(PeerConnection::new(
                1u64,
                "Speaker",
                ServiceProfile::AudioSink,
                Box::new(transport.clone()),
            ))
            .unwrap();
        (engine, transport)
    }

    fn fallback() -> (Arc<dyn FallbackSink>, mpsc::Receiver<AudioChunk>) {
        let (tx, rx) = mpsc::channel(16);
        (Arc::new(ChannelFallback::new(tx)), rx)
    }

    #[test]
    fn test_session_state_new() {
        let state = SessionState::new();
        assert!(state.running.load(Ordering::SeqCst));
        assert_eq!(state.stats(), SessionStats::default());
    }

    #[tokio::test]
    async fn test_session_delivers_in_order_and_stops() {
        let (engine, transport) = engine_with_peer();
        let (fallback, _rx) = fallback();
        let (mut session, sender) =
            Session::start(engine.clone(), fallback, &StreamConfig::default(), None);

        for i in 0..5u8 {
            assert_eq!(sender.send(vec![i; 8]).await.unwrap(), u64::from(i));
        }
        session.stop().await;

        assert_eq!(transport.received_sequences(), vec![0, 1, 2, 3, 4]);
        assert!(transport.is_closed());
        assert!(engine.is_empty());
        assert_eq!(session.stats().chunks_dispatched, 5);
        assert!(matches!(
            sender.send(vec![0u8]).await,
            Err(SyncStreamError::SessionStopped)
        ));
    }

    #[tokio::test]
    async fn test_session_stop_is_idempotent() {
        let (engine, transport) = engine_with_peer();
        let (fallback, _rx) = fallback();
        let (mut session, _sender) =
            Session::start(engine, fallback, &StreamConfig::default(), None);

        session.stop().await;
        session.stop().await;

        assert!(!session.is_running());
        assert_eq!(transport.close_count(), 1);
    }

    #[tokio::test]
    async fn test_try_send_reports_full_queue() {
        let engine = Arc::new(BroadcastEngine::new());
        let (fallback, rx) = fallback();
        let config = StreamConfig {
            chunk_queue_capacity: 1,
            ..Default::default()
        };
        let (mut session, sender) = Session::start(engine, fallback, &config, None);

        let mut full = false;
        for _ in 0..16 {
            if matches!(sender.try_send(vec![0u8; 4]), Err(SyncStreamError::ChunkQueueFull)) {
                full = true;
                break;
            }
        }
        assert!(full);
        assert!(session.stats().chunks_dropped >= 1);

        drop(rx);
        session.stop().await;
    }

    #[tokio::test]
    async fn test_sender_carries_capture_settings() {
        let engine = Arc::new(BroadcastEngine::new());
        let (fallback, _rx) = fallback();
        let config = StreamConfig {
            format: crate::FormatPreset::Speech.format(),
            chunk_duration: std::time::Duration::from_millis(20),
            ..Default::default()
        };
        let (mut session, sender) = Session::start(engine, fallback, &config, None);

        assert_eq!(sender.format().sample_rate, 16000);
        assert_eq!(sender.chunk_duration(), std::time::Duration::from_millis(20));
        assert_eq!(sender.clone().chunk_duration(), sender.chunk_duration());

        session.stop().await;
    }
}
