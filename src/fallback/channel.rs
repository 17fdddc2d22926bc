//! Tokio mpsc channel fallback implementation.

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::fallback::FallbackSink;
use crate::{AudioChunk, SinkError};

/// A fallback that sends played chunks to a tokio mpsc channel.
///
/// Hand the receiver to whatever plays audio locally.
///
/// # Example
///
/// ```
/// use syncstream::{AudioChunk, ChannelFallback};
/// use tokio::sync::mpsc;
///
/// let (tx, mut rx) = mpsc::channel::<AudioChunk>(16);
/// let fallback = ChannelFallback::new(tx);
///
/// // Use fallback with the SyncStream builder...
/// // Then play locally:
/// // while let Some(chunk) = rx.recv().await { ... }
/// ```
pub struct ChannelFallback {
    name: String,
    sender: mpsc::Sender<AudioChunk>,
    pending: Mutex<Option<AudioChunk>>,
}

impl ChannelFallback {
    /// Creates a new channel fallback with the given sender.
    pub fn new(sender: mpsc::Sender<AudioChunk>) -> Self {
        Self::with_name("channel", sender)
    }

    /// Creates a new channel fallback with a custom name.
    pub fn with_name(name: impl Into<String>, sender: mpsc::Sender<AudioChunk>) -> Self {
        Self {
            name: name.into(),
            sender,
            pending: Mutex::new(None),
        }
    }
}

#[async_trait]
impl FallbackSink for ChannelFallback {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&self, chunk: &AudioChunk) -> Result<(), SinkError> {
        *self.pending.lock() = Some(chunk.clone());
        Ok(())
    }

    async fn play(&self) -> Result<(), SinkError> {
        let chunk = self.pending.lock().take().ok_or(SinkError::NotInitialized)?;
        self.sender
            .send(chunk)
            .await
            .map_err(|_| SinkError::ChannelClosed)
    }
}
