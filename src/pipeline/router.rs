//! Router task that feeds chunks to the broadcast engine or the fallback sink.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::engine::{BroadcastEngine, DispatchOutcome};
use crate::event::emit;
use crate::fallback::FallbackSink;
use crate::session::SessionState;
use crate::{AudioChunk, EventCallback, StreamEvent};

/// Command sent to the router task.
pub enum RouterCommand {
    /// Stop the router gracefully.
    Stop,
}

/// Receives chunks in producer order and routes each one.
///
/// A chunk goes to the broadcast engine first. When it reaches no peer
/// (empty live set, or every peer evicted by this dispatch) it goes to the
/// fallback sink instead.
pub struct Router {
    engine: Arc<BroadcastEngine>,
    fallback: Arc<dyn FallbackSink>,
    state: Arc<SessionState>,
    event_callback: Option<EventCallback>,
    fallback_active: bool,
}

impl Router {
    /// Creates a router for one session.
    pub fn new(
        engine: Arc<BroadcastEngine>,
        fallback: Arc<dyn FallbackSink>,
        state: Arc<SessionState>,
    ) -> Self {
        Self {
            engine,
            fallback,
            state,
            event_callback: None,
            fallback_active: false,
        }
    }

    /// Sets the event callback.
    pub fn with_event_callback(mut self, callback: Option<EventCallback>) -> Self {
        self.event_callback = callback;
        self
    }

    fn emit_event(&self, event: StreamEvent) {
        emit(self.event_callback.as_ref(), event);
    }

    /// Dispatches one chunk and waits for it to settle.
    pub async fn route_chunk(&mut self, chunk: &AudioChunk) {
        self.state.chunks_received.fetch_add(1, Ordering::Relaxed);

        let delivered = match self.engine.dispatch(chunk).await {
            DispatchOutcome::NoPeers => 0,
            DispatchOutcome::Dispatched { delivered, evicted } => {
                self.state
                    .peers_evicted
                    .fetch_add(evicted as u64, Ordering::Relaxed);
                delivered
            }
        };

        if delivered > 0 {
            self.state.chunks_dispatched.fetch_add(1, Ordering::Relaxed);
            if self.fallback_active {
                self.fallback_active = false;
                let peers = self.engine.peer_count();
                info!(peers, "peers restored, leaving fallback sink");
                self.emit_event(StreamEvent::PeersRestored { peers });
            }
            return;
        }

        if !self.fallback_active {
            self.fallback_active = true;
            info!(sink = self.fallback.name(), "no live peers, routing to fallback sink");
            self.emit_event(StreamEvent::FallbackActivated);
        }
        self.play_fallback(chunk).await;
    }

    async fn play_fallback(&self, chunk: &AudioChunk) {
        let result = match self.fallback.initialize(chunk).await {
            Ok(()) => self.fallback.play().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                self.state.chunks_to_fallback.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!(sink = self.fallback.name(), error = %e, "fallback sink failed");
                self.emit_event(StreamEvent::SinkError {
                    sink_name: self.fallback.name().to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    async fn stop_fallback(&self) {
        if let Err(e) = self.fallback.stop().await {
            warn!(sink = self.fallback.name(), error = %e, "fallback sink failed to stop");
            self.emit_event(StreamEvent::SinkError {
                sink_name: self.fallback.name().to_string(),
                error: format!("Error during shutdown: {e}"),
            });
        }
    }

    /// Runs the router until a stop command arrives, then drains queued
    /// chunks and stops the fallback sink.
    pub async fn run(
        mut self,
        mut chunk_rx: mpsc::Receiver<AudioChunk>,
        mut cmd_rx: mpsc::Receiver<RouterCommand>,
    ) {
        loop {
            tokio::select! {
                Some(chunk) = chunk_rx.recv() => {
                    self.route_chunk(&chunk).await;
                }
                Some(cmd) = cmd_rx.recv() => {
                    match cmd {
                        RouterCommand::Stop => {
                            // Drain remaining chunks
                            chunk_rx.close();
                            while let Ok(chunk) = chunk_rx.try_recv() {
                                self.route_chunk(&chunk).await;
                            }
                            break;
                        }
                    }
                }
                else => break,
            }
        }

        self.stop_fallback().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceProfile;
    use crate::engine::PeerConnection;
    use crate::transport::mock::MockTransport;
    use crate::{event_callback, SinkError};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingFallback {
        played: Mutex<Vec<u64>>,
        pending: Mutex<Option<u64>>,
        stops: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl FallbackSink for RecordingFallback {
        fn name(&self) -> &str {
            "recording"
        }

        async fn initialize(&self, chunk: &AudioChunk) -> Result<(), SinkError> {
            *self.pending.lock() = Some(chunk.sequence);
            Ok(())
        }

        async fn play(&self) -> Result<(), SinkError> {
            if self.fail {
                return Err(SinkError::custom("speaker unplugged"));
            }
            let sequence = self.pending.lock().take().ok_or(SinkError::NotInitialized)?;
            self.played.lock().push(sequence);
            Ok(())
        }

        async fn stop(&self) -> Result<(), SinkError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn chunk(sequence: u64) -> AudioChunk {
        AudioChunk::new(vec![0u8; 16], sequence, Duration::ZERO)
    }

    fn router(engine: &Arc<BroadcastEngine>, fallback: &Arc<RecordingFallback>) -> Router {
        Router::new(
            engine.clone(),
            fallback.clone(),
            Arc::new(SessionState::new()),
        )
    }

    #[tokio::test]
    async fn test_router_uses_fallback_without_peers() {
        let engine = Arc::new(BroadcastEngine::new());
        let fallback = Arc::new(RecordingFallback::default());
        let mut router = router(&engine, &fallback);

        router.route_chunk(&chunk(0)).await;
        router.route_chunk(&chunk(1)).await;

        assert_eq!(*fallback.played.lock(), vec![0, 1]);
        assert_eq!(router.state.chunks_to_fallback.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_router_transitions_emit_events() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let engine = Arc::new(BroadcastEngine::new());
        let fallback = Arc::new(RecordingFallback::default());
        let mut router = router(&engine, &fallback)
            .with_event_callback(Some(event_callback(move |e| sink.lock().push(e))));

        router.route_chunk(&chunk(0)).await;
        router.route_chunk(&chunk(1)).await;

        let transport = MockTransport::new();
        engine
            .add_peer(PeerConnection::new(
                1u64,
                "Speaker",
                ServiceProfile::AudioSink,
                Box::new(transport.clone()),
            ))
            .unwrap();
        router.route_chunk(&chunk(2)).await;

        assert_eq!(transport.received_sequences(), vec![2]);
        assert_eq!(*fallback.played.lock(), vec![0, 1]);

        let events = events.lock();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], StreamEvent::FallbackActivated));
        assert!(matches!(events[1], StreamEvent::PeersRestored { peers: 1 }));
    }

    #[tokio::test]
    async fn test_router_chunk_lost_to_eviction_goes_to_fallback() {
        let engine = Arc::new(BroadcastEngine::new());
        let fallback = Arc::new(RecordingFallback::default());
        let transport = MockTransport::new().fail_after(0);
        engine
            .add_peer(PeerConnection::new(
                1u64,
                "Flaky",
                ServiceProfile::AudioSink,
                Box::new(transport),
            ))
            .unwrap();
        let mut router = router(&engine, &fallback);

        router.route_chunk(&chunk(0)).await;

        assert_eq!(*fallback.played.lock(), vec![0]);
        assert_eq!(router.state.peers_evicted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_router_reports_fallback_errors() {
        let errors = Arc::new(AtomicUsize::new(0));
        let count = errors.clone();
        let engine = Arc::new(BroadcastEngine::new());
        let fallback = Arc::new(RecordingFallback {
            fail: true,
            ..Default::default()
        });
        let mut router = router(&engine, &fallback).with_event_callback(Some(event_callback(
            move |e| {
                if matches!(e, StreamEvent::SinkError { .. }) {
                    count.fetch_add(1, Ordering::SeqCst);
                }
            },
        )));

        router.route_chunk(&chunk(0)).await;
        router.route_chunk(&chunk(1)).await;

        assert_eq!(errors.load(Ordering::SeqCst), 2);
        assert_eq!(router.state.chunks_to_fallback.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_router_run_drains_and_stops_fallback() {
        let engine = Arc::new(BroadcastEngine::new());
        let fallback = Arc::new(RecordingFallback::default());
        let router = router(&engine, &fallback);

        let (chunk_tx, chunk_rx) = mpsc::channel(10);
        let (cmd_tx, cmd_rx) = mpsc::channel(1);

        chunk_tx.send(chunk(0)).await.unwrap();
        chunk_tx.send(chunk(1)).await.unwrap();
        cmd_tx.send(RouterCommand::Stop).await.unwrap();

        router.run(chunk_rx, cmd_rx).await;

        assert_eq!(*fallback.played.lock(), vec![0, 1]);
        assert_eq!(fallback.stops.load(Ordering::SeqCst), 1);
    }
}
