//! Audio data chunk with metadata.

use std::sync::Arc;
use std::time::Duration;

use crate::config::PcmFormat;

/// One captured buffer of raw audio bytes.
///
/// `AudioChunk` is the unit of both capture and fan-out. The bytes are
/// delivered to peers unframed and exactly as given; encoding is the
/// producer's business.
///
/// Bytes are stored in an `Arc<Vec<u8>>` so every peer write shares one
/// allocation.
///
/// # Example
///
/// ```
/// use syncstream::AudioChunk;
/// use std::time::Duration;
///
/// let chunk = AudioChunk::new(vec![0u8; 1024], 0, Duration::ZERO);
/// assert_eq!(chunk.len(), 1024);
///
/// let shared = chunk.clone(); // shares the byte buffer
/// assert_eq!(shared.as_bytes().as_ptr(), chunk.as_bytes().as_ptr());
/// ```
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Raw audio bytes.
    pub bytes: Arc<Vec<u8>>,

    /// Position of this chunk in the producer's output, starting at 0.
    pub sequence: u64,

    /// Time since the start of the streaming session.
    pub timestamp: Duration,
}

impl AudioChunk {
    /// Creates a new `AudioChunk`.
    pub fn new(bytes: impl Into<Vec<u8>>, sequence: u64, timestamp: Duration) -> Self {
        Self {
            bytes: Arc::new(bytes.into()),
            sequence,
            timestamp,
        }
    }

    /// Creates a new `AudioChunk` from pre-wrapped bytes.
    pub fn from_arc(bytes: Arc<Vec<u8>>, sequence: u64, timestamp: Duration) -> Self {
        Self {
            bytes,
            sequence,
            timestamp,
        }
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the number of bytes in this chunk.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if this chunk contains no bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns how much audio this chunk holds when interpreted as `format`.
    pub fn duration(&self, format: &PcmFormat) -> Duration {
        format.duration_of(self.bytes.len())
    }
}

/// Encodes 16-bit samples as little-endian PCM bytes.
pub fn samples_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_len() {
        let chunk = AudioChunk::new(vec![1u8, 2, 3], 7, Duration::from_millis(20));
        assert_eq!(chunk.len(), 3);
        assert_eq!(chunk.sequence, 7);
        assert!(!chunk.is_empty());
    }

    #[test]
    fn test_empty_chunk() {
        let chunk = AudioChunk::new(Vec::new(), 0, Duration::ZERO);
        assert!(chunk.is_empty());
        assert_eq!(chunk.duration(&PcmFormat::default()), Duration::ZERO);
    }

    #[test]
    fn test_duration_cd_stereo() {
        // 44100 frames * 4 bytes per frame = one second
        let chunk = AudioChunk::new(vec![0u8; 176_400], 0, Duration::ZERO);
        assert_eq!(chunk.duration(&PcmFormat::default()), Duration::from_secs(1));
    }

    #[test]
    fn test_clone_shares_bytes() {
        let chunk = AudioChunk::new(vec![9u8; 16], 0, Duration::ZERO);
        let clone = chunk.clone();
        assert!(Arc::ptr_eq(&chunk.bytes, &clone.bytes));
    }

    #[test]
    fn test_samples_to_le_bytes() {
        let bytes = samples_to_le_bytes(&[0x1234, -2]);
        assert_eq!(bytes, vec![0x34, 0x12, 0xFE, 0xFF]);
    }
}
