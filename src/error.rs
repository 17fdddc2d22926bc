//! Error types for syncstream.
//!
//! Errors are split into two categories:
//! - **Contract errors** ([`SyncStreamError`]): returned to the immediate caller
//! - **Recoverable errors** ([`TransportError`], [`DiscoveryError`], [`SinkError`]):
//!   contained by the core, turned into eviction or omission and surfaced via
//!   [`EventCallback`](crate::EventCallback)

use std::path::PathBuf;

use crate::transport::DeviceAddress;

/// Errors raised to the caller of a core operation.
///
/// Per-peer and per-candidate failures never show up here; they are reported
/// through [`StreamEvent`](crate::StreamEvent) instead and the session keeps
/// running.
#[derive(Debug, thiserror::Error)]
pub enum SyncStreamError {
    /// A peer handed to the broadcast engine cannot be accepted.
    #[error("invalid peer {address}: {reason}")]
    InvalidPeer {
        /// Address of the rejected peer.
        address: DeviceAddress,
        /// Why the peer was rejected.
        reason: String,
    },

    /// `start_session` was called while a session is already running.
    #[error("a streaming session is already running")]
    SessionAlreadyRunning,

    /// A chunk was submitted after the session stopped.
    #[error("streaming session has stopped")]
    SessionStopped,

    /// A non-blocking submit found the chunk queue full.
    #[error("chunk queue is full")]
    ChunkQueueFull,

    /// No primary discovery backend was configured.
    #[error("no discovery backend configured - call discovery() or stack()")]
    NoDiscoveryBackend,

    /// No connector was configured.
    #[error("no connector configured - call connector() or stack()")]
    NoConnector,

    /// No fallback sink was configured.
    #[error("no fallback sink configured - call fallback_sink()")]
    NoFallbackSink,

    /// The connection profile list is empty.
    #[error("connection profile list is empty")]
    NoProfilesConfigured,

    /// The retry ceiling must allow at least one attempt.
    #[error("retry ceiling must be at least 1 (got {value})")]
    InvalidRetryCeiling {
        /// The rejected value.
        value: u32,
    },

    /// The requested capture device was not found.
    #[error("device not found: {name}")]
    DeviceNotFound {
        /// Name of the device that wasn't found.
        name: String,
    },

    /// No default input device is configured on this system.
    #[error("no default input device configured")]
    NoDefaultDevice,

    /// The capture device uses a sample format the adapter cannot read.
    #[error("unsupported sample format: {format}")]
    UnsupportedFormat {
        /// The format that wasn't supported.
        format: String,
    },

    /// An error from the underlying audio library (CPAL).
    #[error("audio backend error: {0}")]
    BackendError(String),
}

/// Errors from a single peer's transport.
///
/// A transport error evicts that peer only; the broadcast continues for the
/// remaining peers.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The transport rejected the bytes.
    #[error("write failed: {reason}")]
    WriteFailed {
        /// Description of what went wrong.
        reason: String,
    },

    /// The remote end went away.
    #[error("peer disconnected")]
    Disconnected,

    /// The transport was already closed locally.
    #[error("transport closed")]
    Closed,

    /// I/O error from a blocking link.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Custom error for user-implemented transports.
    #[error("{0}")]
    Custom(String),
}

impl TransportError {
    /// Creates a custom transport error with the given message.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Creates a write failed error with the given reason.
    pub fn write_failed(reason: impl Into<String>) -> Self {
        Self::WriteFailed {
            reason: reason.into(),
        }
    }
}

/// Errors from one discovery path.
///
/// The connection manager degrades to the next path on either variant; only
/// when every path fails does discovery report itself unavailable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiscoveryError {
    /// The platform or radio stack does not support this discovery path.
    #[error("discovery unsupported: {reason}")]
    Unsupported {
        /// Why the path is unsupported.
        reason: String,
    },

    /// The path is supported but enumeration failed.
    #[error("discovery failed: {reason}")]
    Failed {
        /// Description of the failure.
        reason: String,
    },
}

impl DiscoveryError {
    /// Creates an unsupported-path error.
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::Unsupported {
            reason: reason.into(),
        }
    }

    /// Creates a failed-enumeration error.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

/// Errors that can occur within a [`FallbackSink`](crate::FallbackSink).
///
/// Sink errors are recoverable - the router emits a
/// [`StreamEvent::SinkError`](crate::StreamEvent::SinkError) and keeps routing.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// A write operation failed.
    #[error("write failed: {reason}")]
    WriteFailed {
        /// Description of what went wrong.
        reason: String,
    },

    /// File I/O error.
    #[error("file error: {path}: {source}")]
    FileError {
        /// Path to the file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The receiving channel was closed.
    #[error("channel closed")]
    ChannelClosed,

    /// `play` was called without a preceding `initialize`.
    #[error("sink not initialized (call initialize first)")]
    NotInitialized,

    /// Custom error for user-implemented sinks.
    #[error("{0}")]
    Custom(String),
}

impl SinkError {
    /// Creates a custom sink error with the given message.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Creates a write failed error with the given reason.
    pub fn write_failed(reason: impl Into<String>) -> Self {
        Self::WriteFailed {
            reason: reason.into(),
        }
    }

    /// Creates a file error for the given path.
    pub fn file_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileError {
            path: path.into(),
            source,
        }
    }
}

/// A device address string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid device address: {input:?}")]
pub struct AddressParseError {
    /// The rejected input.
    pub input: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_peer_display() {
        let err = SyncStreamError::InvalidPeer {
            address: DeviceAddress::new([0x00, 0x1A, 0x7D, 0xDA, 0x71, 0x13]),
            reason: "transport is not live".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid peer 00:1A:7D:DA:71:13: transport is not live"
        );
    }

    #[test]
    fn test_transport_error_helpers() {
        assert_eq!(
            TransportError::write_failed("link reset").to_string(),
            "write failed: link reset"
        );
        assert_eq!(TransportError::custom("boom").to_string(), "boom");
    }

    #[test]
    fn test_transport_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err: TransportError = io_err.into();
        assert!(matches!(err, TransportError::Io(_)));
        assert!(err.to_string().contains("pipe"));
    }

    #[test]
    fn test_discovery_error_variants() {
        let err = DiscoveryError::unsupported("no radio");
        assert_eq!(err.to_string(), "discovery unsupported: no radio");
        assert_ne!(err, DiscoveryError::failed("no radio"));
    }

    #[test]
    fn test_sink_error_file_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = SinkError::file_error("/tmp/fallback.wav", io_err);
        assert!(err.to_string().contains("/tmp/fallback.wav"));
    }

    #[test]
    fn test_retry_ceiling_display() {
        let err = SyncStreamError::InvalidRetryCeiling { value: 0 };
        assert_eq!(err.to_string(), "retry ceiling must be at least 1 (got 0)");
    }
}
