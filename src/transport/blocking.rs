//! Adapters for radio stacks that expose blocking calls.
//!
//! Every blocking call runs on tokio's blocking thread pool, so a slow peer
//! or a long connect never stalls the fan-out to other peers.
//!
//! ```
//! use syncstream::transport::blocking::{BlockingConnector, BlockingTransport, WriterLink};
//! use syncstream::transport::ConnectResult;
//!
//! let connector = BlockingConnector::new(|address, profile| {
//!     // Call into the platform stack here; it may block.
//!     let _ = (address, profile);
//!     ConnectResult::Connected(Box::new(BlockingTransport::new(WriterLink::new(Vec::new()))))
//! });
//! # let _ = connector;
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::{DiscoveryOptions, ServiceProfile};
use crate::transport::{ConnectResult, Connector, DeviceAddress, DiscoveryBackend, PeerCandidate, Transport};
use crate::{AudioChunk, DiscoveryError, TransportError};

/// A synchronous byte link to one peer.
pub trait BlockingLink: Send + 'static {
    /// Returns `false` once the remote end is known to be gone.
    fn is_connected(&self) -> bool;

    /// Writes all bytes or fails.
    fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()>;

    /// Shuts the link down.
    fn shutdown(&mut self) -> std::io::Result<()>;
}

/// A [`Transport`] over a [`BlockingLink`].
///
/// Writes and closes run in `spawn_blocking`. The liveness check never waits
/// on an in-flight write; a link busy writing counts as live.
pub struct BlockingTransport<L: BlockingLink> {
    link: Arc<Mutex<L>>,
    closed: AtomicBool,
}

impl<L: BlockingLink> BlockingTransport<L> {
    /// Wraps a connected link.
    pub fn new(link: L) -> Self {
        Self {
            link: Arc::new(Mutex::new(link)),
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl<L: BlockingLink> Transport for BlockingTransport<L> {
    fn is_live(&self) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        self.link.try_lock().map_or(true, |link| link.is_connected())
    }

    async fn write(&self, chunk: &AudioChunk) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        // Clone Arcs for the blocking task (cheap - reference count increments)
        let link = Arc::clone(&self.link);
        let bytes = Arc::clone(&chunk.bytes);

        tokio::task::spawn_blocking(move || link.lock().write_all(&bytes))
            .await
            .map_err(|e| TransportError::custom(format!("write task panicked: {e}")))?
            .map_err(TransportError::from)
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let link = Arc::clone(&self.link);
        tokio::task::spawn_blocking(move || link.lock().shutdown())
            .await
            .map_err(|e| TransportError::custom(format!("close task panicked: {e}")))?
            .map_err(TransportError::from)
    }
}

/// A [`BlockingLink`] over any [`std::io::Write`] stream.
///
/// The link counts as disconnected after the first failed write.
pub struct WriterLink<W> {
    writer: W,
    connected: bool,
}

impl<W: Write + Send + 'static> WriterLink<W> {
    /// Wraps an open writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            connected: true,
        }
    }
}

impl<W: Write + Send + 'static> BlockingLink for WriterLink<W> {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        let result = self
            .writer
            .write_all(bytes)
            .and_then(|()| self.writer.flush());
        if result.is_err() {
            self.connected = false;
        }
        result
    }

    fn shutdown(&mut self) -> std::io::Result<()> {
        self.connected = false;
        self.writer.flush()
    }
}

/// A [`Connector`] backed by a blocking function.
pub struct BlockingConnector<F> {
    connect: Arc<F>,
}

impl<F> BlockingConnector<F>
where
    F: Fn(DeviceAddress, ServiceProfile) -> ConnectResult + Send + Sync + 'static,
{
    /// Wraps a blocking connect function.
    pub fn new(connect: F) -> Self {
        Self {
            connect: Arc::new(connect),
        }
    }
}

#[async_trait]
impl<F> Connector for BlockingConnector<F>
where
    F: Fn(DeviceAddress, ServiceProfile) -> ConnectResult + Send + Sync + 'static,
{
    async fn connect(&self, address: DeviceAddress, profile: ServiceProfile) -> ConnectResult {
        let connect = Arc::clone(&self.connect);
        match tokio::task::spawn_blocking(move || connect(address, profile)).await {
            Ok(result) => result,
            Err(e) => ConnectResult::TransientFailure(format!("connect task panicked: {e}")),
        }
    }
}

/// A [`DiscoveryBackend`] backed by a blocking enumeration function.
pub struct BlockingDiscovery<F> {
    name: String,
    discover: Arc<F>,
}

impl<F> BlockingDiscovery<F>
where
    F: Fn(&DiscoveryOptions) -> Result<Vec<PeerCandidate>, DiscoveryError> + Send + Sync + 'static,
{
    /// Wraps a blocking enumeration function.
    pub fn new(name: impl Into<String>, discover: F) -> Self {
        Self {
            name: name.into(),
            discover: Arc::new(discover),
        }
    }
}

#[async_trait]
impl<F> DiscoveryBackend for BlockingDiscovery<F>
where
    F: Fn(&DiscoveryOptions) -> Result<Vec<PeerCandidate>, DiscoveryError> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn discover(
        &self,
        options: &DiscoveryOptions,
    ) -> Result<Vec<PeerCandidate>, DiscoveryError> {
        let discover = Arc::clone(&self.discover);
        let options = options.clone();
        tokio::task::spawn_blocking(move || discover(&options))
            .await
            .map_err(|e| DiscoveryError::failed(format!("discovery task panicked: {e}")))?
    }
}
