//! Session pipeline components.
//!
//! Every producer feeds the same bounded chunk queue:
//!
//! ```text
//! CPAL Thread → Ring Buffer → Capture Bridge ─┐
//!                                             ├→ Chunk Queue → Router → Broadcast Engine
//! any caller of ChunkSender::send ────────────┘                     └→ Fallback Sink
//! ```
//!
//! - **Ring Buffer**: Lock-free SPSC queue so the audio callback never blocks
//! - **Capture Bridge**: Cuts the buffer into chunks and submits them
//! - **Router**: Dispatches each chunk and waits for it to settle; chunks
//!   that reach no peer go to the fallback sink

mod capture;
mod ring_buffer;
mod router;

pub use capture::CaptureHandle;
pub(crate) use capture::{spawn_capture_bridge, CaptureConfig};
pub(crate) use ring_buffer::AudioBuffer;
pub(crate) use router::{Router, RouterCommand};
