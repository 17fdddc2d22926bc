//! # syncstream
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Fan out one live audio byte stream to a changing set of short-range
//! wireless peers.
//!
//! `syncstream` discovers nearby devices, negotiates a service profile with
//! each one and writes every captured chunk to every live peer in parallel.
//! A peer that fails is evicted on the spot while the others keep playing;
//! when no peer is left, chunks go to a local fallback sink instead.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use syncstream::{FileFallback, PcmFormat, ServiceProfile, SyncStream};
//!
//! let stream = SyncStream::builder()
//!     .stack(MyRadioStack::open()?)                 // discovery + connector
//!     .fallback_sink(FileFallback::wav("local.wav", PcmFormat::default()))
//!     .profiles([ServiceProfile::AudioSink, ServiceProfile::Handsfree])
//!     .on_event(|e| tracing::warn!(?e, "stream event"))
//!     .build()?;
//!
//! let summary = stream.discover_and_connect().await;
//! println!("{} peers live", summary.added);
//!
//! let sender = stream.start_session().await?;
//! while let Some(buffer) = capture.next().await {
//!     sender.send(buffer).await?;
//! }
//!
//! stream.stop_session().await;
//! ```
//!
//! ## Architecture
//!
//! - **Transport seam**: [`DiscoveryBackend`], [`Connector`] and [`Transport`]
//!   are the only way the core reaches a radio
//! - **Connection Manager**: primary then fallback discovery, per-candidate
//!   profile/retry cycles run concurrently
//! - **Broadcast Engine**: the live peer set; one chunk is written to every
//!   peer in parallel and fully settles before the next one starts
//! - **Session Router**: takes chunks off a bounded queue in order and sends
//!   each one to the engine, or to the fallback sink when nobody is listening
//!
//! The optional [`source`] module captures from a CPAL input device through a
//! lock-free ring buffer so the audio callback never blocks.

#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample formats
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap allowed in tests only
#![cfg_attr(test, allow(clippy::unwrap_used))]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

mod builder;
mod chunk;
mod config;
mod engine;
mod error;
mod event;
mod fallback;
mod manager;
mod pipeline;
mod session;
pub mod source;
pub mod transport;

pub use builder::{ConnectSummary, SyncStream, SyncStreamBuilder};
pub use chunk::{samples_to_le_bytes, AudioChunk};
pub use config::{
    ConnectionProfile, DiscoveryOptions, FormatPreset, ManagerConfig, PcmFormat, ServiceProfile,
    StreamConfig,
};
pub use engine::{BroadcastEngine, DispatchOutcome, EngineStats, PeerConnection, PeerId};
pub use error::{AddressParseError, DiscoveryError, SinkError, SyncStreamError, TransportError};
pub use event::{event_callback, DropReason, EventCallback, StreamEvent};
pub use fallback::{ChannelFallback, FallbackSink, FileFallback};
pub use manager::{ConnectReport, ConnectionManager, Discovery};
pub use pipeline::CaptureHandle;
pub use session::{ChunkSender, SessionStats};
pub use source::{
    default_input_device_name, list_input_devices, AudioDevice, DeviceConfig, MockSource,
};
pub use transport::{
    ChannelTransport, ConnectResult, Connector, DeviceAddress, DiscoveryBackend,
    DiscoverySource, PeerCandidate, Transport,
};
