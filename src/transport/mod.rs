//! Transport abstraction: the seam to the external radio stack.
//!
//! The core never talks to a radio directly. A stack plugs in through three
//! traits:
//!
//! - [`DiscoveryBackend`]: enumerates nearby devices (one per discovery path)
//! - [`Connector`]: negotiates one profile with one device
//! - [`Transport`]: a live stream-oriented connection to one peer
//!
//! Ready-made pieces:
//!
//! - [`ChannelTransport`]: delivers chunks into a tokio mpsc channel
//! - [`blocking`]: adapters for stacks with blocking calls
//! - [`mock`]: scripted doubles for tests and demos

mod address;
pub mod blocking;
mod channel;
pub mod mock;

pub use address::DeviceAddress;
pub use channel::ChannelTransport;

use std::fmt;

use async_trait::async_trait;

use crate::config::{DiscoveryOptions, ServiceProfile};
use crate::{AudioChunk, DiscoveryError, TransportError};

/// Which discovery path produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscoverySource {
    /// The primary stack binding.
    Primary,
    /// The lower-level enumeration used when the primary path yields nothing.
    Fallback,
}

impl fmt::Display for DiscoverySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Fallback => f.write_str("fallback"),
        }
    }
}

/// A discovered but not yet connected device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerCandidate {
    /// Stable device address.
    pub address: DeviceAddress,
    /// Human-readable name. Advisory only, not unique.
    pub name: String,
    /// Discovery path that produced this candidate.
    pub source: DiscoverySource,
}

impl PeerCandidate {
    /// Creates a candidate found on the primary path.
    pub fn new(address: impl Into<DeviceAddress>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
            source: DiscoverySource::Primary,
        }
    }

    /// Returns the candidate tagged with another discovery source.
    #[must_use]
    pub fn with_source(mut self, source: DiscoverySource) -> Self {
        self.source = source;
        self
    }
}

/// A stream-oriented connection to one remote peer.
///
/// # Implementation Notes
///
/// - Methods take `&self` - use interior mutability if needed
/// - `write` must deliver the whole chunk or fail; partial writes are failures
/// - `close` may race with an in-flight `write`; either may fail, neither may
///   panic
#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns `false` once the remote end is known to be gone.
    fn is_live(&self) -> bool;

    /// Writes the full chunk to the peer.
    async fn write(&self, chunk: &AudioChunk) -> Result<(), TransportError>;

    /// Closes the connection.
    async fn close(&self) -> Result<(), TransportError>;
}

/// Outcome of one profile negotiation attempt.
pub enum ConnectResult {
    /// The profile was agreed and the connection is open.
    Connected(Box<dyn Transport>),
    /// The platform or stack cannot connect this candidate at all. Not retried.
    Unsupported(String),
    /// This attempt failed; another profile or pass may succeed.
    TransientFailure(String),
}

impl fmt::Debug for ConnectResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected(_) => f.write_str("Connected(..)"),
            Self::Unsupported(reason) => f.debug_tuple("Unsupported").field(reason).finish(),
            Self::TransientFailure(reason) => {
                f.debug_tuple("TransientFailure").field(reason).finish()
            }
        }
    }
}

/// Negotiates service profiles with remote devices.
///
/// Every candidate's cycle runs on its own tokio task. An implementation
/// must still not block the runtime thread inside `connect`; wrap
/// synchronous stacks in [`BlockingConnector`](blocking::BlockingConnector),
/// which moves each call to the blocking pool.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Attempts to open a connection to `address` using `profile`.
    ///
    /// Blocks until the stack resolves the attempt; the stack's own timeout
    /// bounds it.
    async fn connect(&self, address: DeviceAddress, profile: ServiceProfile) -> ConnectResult;
}

/// One device enumeration path.
#[async_trait]
pub trait DiscoveryBackend: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Enumerates nearby devices.
    ///
    /// Return [`DiscoveryError::Unsupported`] when this path cannot work on
    /// the current platform; the manager then tries the next path.
    async fn discover(
        &self,
        options: &DiscoveryOptions,
    ) -> Result<Vec<PeerCandidate>, DiscoveryError>;
}
