//! Tokio mpsc channel transport implementation.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::transport::Transport;
use crate::{AudioChunk, TransportError};

/// A transport that delivers chunks to a tokio mpsc channel.
///
/// Useful for in-process peers (a local mixer, a recorder, a network relay
/// task) and for wiring the engine in tests. The transport is live while the
/// receiver exists and `close` has not been called.
///
/// # Example
///
/// ```
/// use syncstream::{AudioChunk, ChannelTransport};
/// use tokio::sync::mpsc;
///
/// let (tx, mut rx) = mpsc::channel::<AudioChunk>(16);
/// let transport = ChannelTransport::new(tx);
/// // Hand `transport` to a PeerConnection, then:
/// // while let Some(chunk) = rx.recv().await { ... }
/// ```
pub struct ChannelTransport {
    sender: mpsc::Sender<AudioChunk>,
    closed: AtomicBool,
}

impl ChannelTransport {
    /// Creates a transport writing into `sender`.
    pub fn new(sender: mpsc::Sender<AudioChunk>) -> Self {
        Self {
            sender,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    fn is_live(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && !self.sender.is_closed()
    }

    async fn write(&self, chunk: &AudioChunk) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.sender
            .send(chunk.clone())
            .await
            .map_err(|_| TransportError::Disconnected)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
