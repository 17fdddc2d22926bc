//! Capture bridge task - reads from the ring buffer, encodes samples, submits
//! chunks to the session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::chunk::samples_to_le_bytes;
use crate::pipeline::AudioBuffer;
use crate::session::ChunkSender;
use crate::source::CaptureStream;

/// Capture parameters describing what the device actually delivers.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Device sample rate in Hz.
    pub sample_rate: u32,
    /// Device channel count.
    pub channels: u16,
    /// Audio per chunk.
    pub chunk_duration: Duration,
}

/// Moves audio from the ring buffer to the session.
///
/// Polls the ring buffer at half the chunk duration, cuts whole chunks,
/// encodes them as little-endian 16-bit PCM and submits them through a
/// [`ChunkSender`]. Waiting on the sender is what applies backpressure; the
/// audio callback itself never waits.
///
/// A bridge with no device stream behind it reads a pre-filled buffer: it
/// ends by itself once that buffer is empty.
struct CaptureBridge {
    audio_buffer: AudioBuffer,
    sender: ChunkSender,
    stop: Arc<AtomicBool>,
    poll_interval: Duration,
    finite: bool,
    chunks_forwarded: u64,
}

impl CaptureBridge {
    fn new(
        ring_consumer: ringbuf::HeapCons<i16>,
        config: &CaptureConfig,
        sender: ChunkSender,
        stop: Arc<AtomicBool>,
        finite: bool,
    ) -> Self {
        info!(
            sample_rate = config.sample_rate,
            channels = config.channels,
            chunk = ?config.chunk_duration,
            finite,
            "capture bridge starting"
        );

        let audio_buffer = AudioBuffer::new(
            ring_consumer,
            config.sample_rate,
            config.channels,
            config.chunk_duration,
        );

        // Poll at half the chunk duration for responsiveness
        let poll_interval = (config.chunk_duration / 2).max(Duration::from_millis(1));

        Self {
            audio_buffer,
            sender,
            stop,
            poll_interval,
            finite,
            chunks_forwarded: 0,
        }
    }

    /// Runs until stopped, the session ends or a finite source runs dry.
    /// Returns the number of chunks submitted.
    async fn run(mut self) -> u64 {
        let mut interval = tokio::time::interval(self.poll_interval);

        while !self.stop.load(Ordering::SeqCst) {
            if !self.sender.is_running() {
                debug!("session stopped, capture bridge exiting");
                return self.chunks_forwarded;
            }
            interval.tick().await;

            while let Some(samples) = self.audio_buffer.try_read_chunk() {
                if !self.forward(&samples).await {
                    debug!("session stopped, capture bridge exiting");
                    return self.chunks_forwarded;
                }
            }
            if self.finite {
                debug!("source exhausted");
                break;
            }
        }

        // Submit the short tail still in the buffer
        for samples in self.audio_buffer.drain() {
            if !self.forward(&samples).await {
                break;
            }
        }
        self.chunks_forwarded
    }

    async fn forward(&mut self, samples: &[i16]) -> bool {
        match self.sender.send(samples_to_le_bytes(samples)).await {
            Ok(_) => {
                self.chunks_forwarded += 1;
                true
            }
            Err(_) => false,
        }
    }
}

/// Handle to a running capture.
///
/// Dropping it stops the device stream (if any) but leaves the bridge task
/// to notice on its own; prefer [`stop`](Self::stop).
#[must_use = "capture stops when the handle is dropped"]
pub struct CaptureHandle {
    stop: Arc<AtomicBool>,
    task: JoinHandle<u64>,
    stream: Option<CaptureStream>,
}

impl CaptureHandle {
    /// Returns `true` while the bridge task is running.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stops capture, submits what is left in the buffer and waits for the
    /// bridge to finish. Returns the number of chunks submitted.
    pub async fn stop(self) -> u64 {
        // Close the device first so the drain sees a fixed tail
        drop(self.stream);
        self.stop.store(true, Ordering::SeqCst);
        self.task.await.unwrap_or(0)
    }

    /// Waits for the bridge to finish on its own: a finite source has been
    /// fully submitted or the session stopped. A device capture only ends
    /// with the session.
    pub async fn join(self) -> u64 {
        let chunks = self.task.await.unwrap_or(0);
        drop(self.stream);
        chunks
    }
}

/// Spawns the capture bridge task.
///
/// With `stream` set to `None` the buffer is treated as pre-filled and
/// finite.
pub(crate) fn spawn_capture_bridge(
    ring_consumer: ringbuf::HeapCons<i16>,
    config: &CaptureConfig,
    sender: ChunkSender,
    stream: Option<CaptureStream>,
) -> CaptureHandle {
    let finite = stream.is_none();
    spawn_bridge(ring_consumer, config, sender, stream, finite)
}

fn spawn_bridge(
    ring_consumer: ringbuf::HeapCons<i16>,
    config: &CaptureConfig,
    sender: ChunkSender,
    stream: Option<CaptureStream>,
    finite: bool,
) -> CaptureHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let bridge = CaptureBridge::new(ring_consumer, config, sender, Arc::clone(&stop), finite);
    CaptureHandle {
        stop,
        task: tokio::spawn(bridge.run()),
        stream,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamConfig;
    use crate::engine::{BroadcastEngine, PeerConnection};
    use crate::fallback::{ChannelFallback, FallbackSink};
    use crate::session::Session;
    use crate::transport::mock::MockTransport;
    use crate::ServiceProfile;
    use ringbuf::traits::{Producer, Split};
    use ringbuf::HeapRb;
    use tokio::sync::mpsc;

    fn session_with_peer() -> (Session, ChunkSender, MockTransport) {
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
        let (tx, _rx) = mpsc::channel(4);
        let fallback: Arc<dyn FallbackSink> = Arc::new(ChannelFallback::new(tx));
        let (session, sender) = Session::start(engine, fallback, &StreamConfig::default(), None);
        (session, sender, transport)
    }

    fn two_sample_chunks() -> CaptureConfig {
        CaptureConfig {
            sample_rate: 1000,
            channels: 1,
            chunk_duration: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn test_bridge_forwards_le_bytes() {
        let (mut session, sender, transport) = session_with_peer();

        let (mut producer, consumer) = HeapRb::<i16>::new(64).split();
        producer.push_slice(&[1, -1, 2, -2]);

        let handle = spawn_capture_bridge(consumer, &two_sample_chunks(), sender, None);
        let forwarded = handle.stop().await;
        session.stop().await;

        assert_eq!(forwarded, 2);
        assert_eq!(
            transport.received_bytes(),
            vec![0x01, 0x00, 0xFF, 0xFF, 0x02, 0x00, 0xFE, 0xFF]
        );
    }

    #[tokio::test]
    async fn test_finite_source_ends_on_its_own() {
        let (mut session, sender, transport) = session_with_peer();

        let (mut producer, consumer) = HeapRb::<i16>::new(64).split();
        producer.push_slice(&[1, 2, 3, 4, 5]);
        drop(producer);

        let handle = spawn_capture_bridge(consumer, &two_sample_chunks(), sender, None);
        let forwarded = tokio::time::timeout(Duration::from_secs(2), handle.join())
            .await
            .unwrap();
        session.stop().await;

        // two full chunks and a one-sample tail
        assert_eq!(forwarded, 3);
        assert_eq!(transport.received_sequences(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_live_source_ends_with_session() {
        let (mut session, sender, transport) = session_with_peer();

        // producer stays alive, as a device callback would
        let (mut producer, consumer) = HeapRb::<i16>::new(64).split();
        producer.push_slice(&[1, 2]);

        let handle = spawn_bridge(consumer, &two_sample_chunks(), sender, None, false);
        tokio::time::sleep(Duration::from_millis(20)).await;
        session.stop().await;

        let forwarded = tokio::time::timeout(Duration::from_secs(2), handle.join())
            .await
            .unwrap();

        assert_eq!(forwarded, 1);
        assert_eq!(transport.write_count(), 1);
        drop(producer);
    }
}
