//! Synthetic capture source for running the pipeline without hardware.

use std::f64::consts::TAU;
use std::time::Duration;

use ringbuf::traits::{Producer, Split};
use ringbuf::HeapRb;
use tracing::warn;

use crate::config::PcmFormat;
use crate::pipeline::{spawn_capture_bridge, CaptureConfig, CaptureHandle};
use crate::session::ChunkSender;

/// Generates interleaved 16-bit PCM and feeds it through the capture bridge
/// as a device would.
///
/// # Example
///
/// ```
/// use syncstream::source::MockSource;
///
/// let mut mock = MockSource::new(16000, 1);
/// mock.generate_silence(100).generate_sine(440.0, 100);
///
/// assert_eq!(mock.samples().len(), 3200);
/// ```
pub struct MockSource {
    sample_rate: u32,
    channels: u16,
    samples: Vec<i16>,
}

impl MockSource {
    /// Creates an empty source with the given layout.
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels: channels.max(1),
            samples: Vec::new(),
        }
    }

    /// Creates an empty source with the rate and channel count of `format`.
    pub fn with_format(format: &PcmFormat) -> Self {
        Self::new(format.sample_rate, format.channels)
    }

    /// Returns the sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the channel count.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Appends `duration_ms` of silence.
    pub fn generate_silence(&mut self, duration_ms: u64) -> &mut Self {
        self.push_frames(duration_ms, |_| 0)
    }

    /// Appends `duration_ms` of a full-scale sine at `frequency` Hz on every
    /// channel.
    pub fn generate_sine(&mut self, frequency: f64, duration_ms: u64) -> &mut Self {
        let rate = f64::from(self.sample_rate);
        self.push_frames(duration_ms, |frame| {
            let phase = TAU * frequency * frame as f64 / rate;
            (phase.sin() * f64::from(i16::MAX)) as i16
        })
    }

    /// Appends `duration_ms` of deterministic noise scaled by `amplitude`
    /// (0.0 to 1.0).
    pub fn generate_noise(&mut self, duration_ms: u64, amplitude: f64) -> &mut Self {
        let scale = amplitude.clamp(0.0, 1.0);
        let mut state: u32 = 0x9E37_79B9;
        self.push_frames(duration_ms, move |_| {
            // xorshift32
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let unit = f64::from(state) / f64::from(u32::MAX) * 2.0 - 1.0;
            (unit * scale * f64::from(i16::MAX)) as i16
        })
    }

    /// Appends raw interleaved samples.
    pub fn add_samples(&mut self, samples: &[i16]) -> &mut Self {
        self.samples.extend_from_slice(samples);
        self
    }

    /// Takes all accumulated samples, leaving the source empty.
    pub fn take_samples(&mut self) -> Vec<i16> {
        std::mem::take(&mut self.samples)
    }

    /// Returns the accumulated samples.
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Returns how much audio has been accumulated.
    pub fn duration(&self) -> Duration {
        let frames = self.samples.len() / usize::from(self.channels);
        Duration::from_secs_f64(frames as f64 / f64::from(self.sample_rate))
    }

    /// Moves the accumulated samples into a ring buffer and returns its
    /// consumer side.
    pub fn into_ring_buffer(self) -> ringbuf::HeapCons<i16> {
        let (mut producer, consumer) = HeapRb::<i16>::new(self.samples.len().max(1)).split();
        producer.push_slice(&self.samples);
        consumer
    }

    /// Creates an empty source matching the layout of the session behind
    /// `sender`.
    pub fn for_session(sender: &ChunkSender) -> Self {
        Self::with_format(&sender.format())
    }

    /// Streams the accumulated samples into a session through the capture
    /// bridge, in chunks of the session's
    /// [`chunk_duration`](ChunkSender::chunk_duration).
    ///
    /// The bridge submits whole chunks plus one short tail chunk and then
    /// finishes; await [`CaptureHandle::join`] to wait for that.
    pub fn stream_into(self, sender: ChunkSender) -> CaptureHandle {
        let session_format = sender.format();
        let layout = (session_format.sample_rate, session_format.channels);
        if layout != (self.sample_rate, self.channels) {
            warn!(
                sample_rate = self.sample_rate,
                channels = self.channels,
                session_rate = session_format.sample_rate,
                session_channels = session_format.channels,
                "mock source layout differs from the session format"
            );
        }
        let config = CaptureConfig {
            sample_rate: self.sample_rate,
            channels: self.channels,
            chunk_duration: sender.chunk_duration(),
        };
        spawn_capture_bridge(self.into_ring_buffer(), &config, sender, None)
    }

    fn push_frames(
        &mut self,
        duration_ms: u64,
        mut frame_value: impl FnMut(u64) -> i16,
    ) -> &mut Self {
        let frames = u64::from(self.sample_rate) * duration_ms / 1000;
        let channels = usize::from(self.channels);
        self.samples.reserve(frames as usize * channels);
        for frame in 0..frames {
            let value = frame_value(frame);
            self.samples.extend(std::iter::repeat(value).take(channels));
        }
        self
    }
}
