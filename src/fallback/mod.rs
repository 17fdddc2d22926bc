//! Local playback path used when no peer is reachable.
//!
//! A [`FallbackSink`] receives chunks the broadcast engine could not deliver
//! because its live set was empty. The crate provides two:
//!
//! - [`ChannelFallback`]: forwards chunks to a tokio mpsc channel
//! - [`FileFallback`]: appends chunks to a WAV file
//!
//! Implement the trait to hand chunks to a local audio output.

mod channel;
mod file;

pub use channel::ChannelFallback;
pub use file::FileFallback;

use async_trait::async_trait;

use crate::{AudioChunk, SinkError};

/// Local playback for chunks that reached no peer.
///
/// The router calls `initialize` with the chunk and then `play`, once per
/// chunk, in producer order. `stop` is called once on session teardown.
///
/// # Implementation Notes
///
/// - Methods take `&self` - use interior mutability (`Mutex`) for state
/// - Errors are recoverable: the router emits a
///   [`StreamEvent::SinkError`](crate::StreamEvent::SinkError) and keeps going
///
/// # Example
///
/// ```
/// use syncstream::{AudioChunk, FallbackSink, SinkError};
/// use async_trait::async_trait;
/// use std::sync::Mutex;
///
/// struct PrintFallback {
///     pending: Mutex<usize>,
/// }
///
/// #[async_trait]
/// impl FallbackSink for PrintFallback {
///     fn name(&self) -> &str {
///         "print"
///     }
///
///     async fn initialize(&self, chunk: &AudioChunk) -> Result<(), SinkError> {
///         *self.pending.lock().unwrap() = chunk.len();
///         Ok(())
///     }
///
///     async fn play(&self) -> Result<(), SinkError> {
///         println!("playing {} bytes locally", self.pending.lock().unwrap());
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait FallbackSink: Send + Sync {
    /// Human-readable name for logging and error messages.
    fn name(&self) -> &str;

    /// Loads the next chunk to play.
    async fn initialize(&self, chunk: &AudioChunk) -> Result<(), SinkError>;

    /// Plays the chunk loaded by the last `initialize`.
    async fn play(&self) -> Result<(), SinkError>;

    /// Called once during session teardown.
    ///
    /// Default implementation does nothing.
    async fn stop(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct CountingFallback {
        initialized: AtomicUsize,
        played: AtomicUsize,
    }

    #[async_trait]
    impl FallbackSink for CountingFallback {
        fn name(&self) -> &str {
            "counting"
        }

        async fn initialize(&self, _chunk: &AudioChunk) -> Result<(), SinkError> {
            self.initialized.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn play(&self) -> Result<(), SinkError> {
            self.played.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_fallback_lifecycle() {
        let sink = CountingFallback {
            initialized: AtomicUsize::new(0),
            played: AtomicUsize::new(0),
        };

        let chunk = AudioChunk::new(vec![0u8; 32], 0, Duration::ZERO);
        sink.initialize(&chunk).await.unwrap();
        sink.play().await.unwrap();
        sink.stop().await.unwrap();

        assert_eq!(sink.initialized.load(Ordering::SeqCst), 1);
        assert_eq!(sink.played.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fallback_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<Arc<dyn FallbackSink>>();
    }
}
