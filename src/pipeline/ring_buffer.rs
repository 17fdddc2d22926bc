//! Ring buffer wrapper for audio capture.

use std::time::Duration;

use ringbuf::traits::{Consumer, Observer};

/// A ring buffer of captured samples with chunk-based reading.
///
/// The audio callback pushes interleaved samples on one side; the capture
/// bridge pops them here in whole-chunk slices.
pub struct AudioBuffer {
    consumer: ringbuf::HeapCons<i16>,
    chunk_size: usize,
}

impl AudioBuffer {
    /// Creates a buffer that cuts `chunk_duration` worth of interleaved
    /// samples per chunk.
    pub fn new(
        consumer: ringbuf::HeapCons<i16>,
        sample_rate: u32,
        channels: u16,
        chunk_duration: Duration,
    ) -> Self {
        let frames_per_chunk = (sample_rate as f64 * chunk_duration.as_secs_f64()) as usize;
        let chunk_size = (frames_per_chunk * channels as usize).max(1);

        Self {
            consumer,
            chunk_size,
        }
    }

    /// Attempts to read a complete chunk of samples.
    ///
    /// Returns `None` if not enough samples are available.
    pub fn try_read_chunk(&mut self) -> Option<Vec<i16>> {
        if self.consumer.occupied_len() < self.chunk_size {
            return None;
        }

        let mut samples = vec![0i16; self.chunk_size];
        let read = self.consumer.pop_slice(&mut samples);
        samples.truncate(read);

        if samples.is_empty() {
            None
        } else {
            Some(samples)
        }
    }

    /// Returns the number of samples currently in the buffer.
    pub fn available(&self) -> usize {
        self.consumer.occupied_len()
    }

    /// Drains all remaining samples from the buffer.
    ///
    /// The last chunk may be smaller than the configured chunk size.
    pub fn drain(&mut self) -> Vec<Vec<i16>> {
        let mut chunks = Vec::new();

        while let Some(chunk) = self.try_read_chunk() {
            chunks.push(chunk);
        }

        let remaining = self.available();
        if remaining > 0 {
            let mut samples = vec![0i16; remaining];
            let read = self.consumer.pop_slice(&mut samples);
            samples.truncate(read);
            if !samples.is_empty() {
                chunks.push(samples);
            }
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FormatPreset, PcmFormat};
    use ringbuf::traits::{Producer, Split};
    use ringbuf::HeapRb;

    fn make_buffer(
        format: PcmFormat,
        chunk_duration: Duration,
    ) -> (ringbuf::HeapProd<i16>, AudioBuffer) {
        // One second of audio
        let capacity = format.sample_rate as usize * format.channels as usize;
        let (producer, consumer) = HeapRb::<i16>::new(capacity).split();
        let buffer = AudioBuffer::new(
            consumer,
            format.sample_rate,
            format.channels,
            chunk_duration,
        );
        (producer, buffer)
    }

    fn speech_buffer() -> (ringbuf::HeapProd<i16>, AudioBuffer) {
        make_buffer(FormatPreset::Speech.format(), Duration::from_millis(100))
    }

    #[test]
    fn test_audio_buffer_read_chunk() {
        let (mut producer, mut buffer) = speech_buffer();

        // 100ms at 16kHz mono
        for i in 0..1600i16 {
            let _ = producer.try_push(i);
        }

        assert_eq!(buffer.available(), 1600);
        let chunk = buffer.try_read_chunk().unwrap();
        assert_eq!(chunk.len(), 1600);
        assert_eq!(chunk[0], 0);
        assert_eq!(chunk[1599], 1599);
    }

    #[test]
    fn test_audio_buffer_not_enough_samples() {
        let (mut producer, mut buffer) = speech_buffer();

        for i in 0..800i16 {
            let _ = producer.try_push(i);
        }

        assert_eq!(buffer.available(), 800);
        assert!(buffer.try_read_chunk().is_none());
    }

    #[test]
    fn test_audio_buffer_drain() {
        let (mut producer, mut buffer) = speech_buffer();

        // 250ms worth (2.5 chunks)
        for i in 0..4000i16 {
            let _ = producer.try_push(i % 1000);
        }

        let chunks = buffer.drain();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 1600);
        assert_eq!(chunks[1].len(), 1600);
        assert_eq!(chunks[2].len(), 800);
    }

    #[test]
    fn test_audio_buffer_stereo_chunk_size() {
        let (mut producer, mut buffer) =
            make_buffer(FormatPreset::CdStereo.format(), Duration::from_millis(10));

        // 10ms at 44.1kHz stereo = 441 frames = 882 samples
        for _ in 0..1000 {
            let _ = producer.try_push(0);
        }

        assert_eq!(buffer.try_read_chunk().unwrap().len(), 882);
        assert!(buffer.try_read_chunk().is_none());
    }
}
