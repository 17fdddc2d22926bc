//! CPAL input device behind the capture adapter.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    Device, FromSample, Sample, SampleFormat, SizedSample, Stream,
    StreamConfig as CpalStreamConfig,
};
use ringbuf::traits::{Producer, Split};
use ringbuf::HeapRb;
use tracing::{error, info, warn};

use crate::pipeline::{spawn_capture_bridge, CaptureConfig, CaptureHandle};
use crate::session::ChunkSender;
use crate::SyncStreamError;

/// Configuration for audio capture.
///
/// The device always captures at its native rate and channel count; the
/// bytes handed to the session are whatever the device delivers.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Ring buffer capacity in samples.
    ///
    /// Default: 30 seconds of 44.1kHz stereo
    pub buffer_capacity: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 44100 * 2 * 30,
        }
    }
}

fn backend_error(e: impl std::fmt::Display) -> SyncStreamError {
    SyncStreamError::BackendError(e.to_string())
}

/// A CPAL audio input device.
///
/// Samples are converted to 16-bit in the audio callback and pushed into a
/// ring buffer without ever waiting; when the buffer is full the newest
/// samples are lost.
#[must_use]
pub struct AudioDevice {
    device: Device,
    config: DeviceConfig,
}

impl AudioDevice {
    /// Opens the default input device.
    ///
    /// # Errors
    ///
    /// Returns `NoDefaultDevice` if no default input device is configured.
    pub fn open_default() -> Result<Self, SyncStreamError> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or(SyncStreamError::NoDefaultDevice)?;
        Ok(Self::wrap(device))
    }

    /// Opens an input device by exact name.
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` if no device with the given name exists.
    pub fn open_by_name(name: &str) -> Result<Self, SyncStreamError> {
        cpal::default_host()
            .input_devices()
            .map_err(backend_error)?
            .find(|d| d.name().is_ok_and(|n| n == name))
            .map(Self::wrap)
            .ok_or_else(|| SyncStreamError::DeviceNotFound {
                name: name.to_string(),
            })
    }

    fn wrap(device: Device) -> Self {
        Self {
            device,
            config: DeviceConfig::default(),
        }
    }

    /// Sets the device configuration.
    pub fn with_config(mut self, config: DeviceConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the device name.
    pub fn name(&self) -> String {
        self.device.name().unwrap_or_else(|_| "unknown".to_string())
    }

    /// Returns the current configuration.
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Returns the device's native capture format (sample rate, channels).
    pub fn native_config(&self) -> Result<(u32, u16), SyncStreamError> {
        let config = self.device.default_input_config().map_err(backend_error)?;
        Ok((config.sample_rate().0, config.channels()))
    }

    /// Starts capturing into a fresh ring buffer.
    ///
    /// Capture runs while the returned [`CaptureStream`] is held.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be built or started, or the
    /// device delivers a sample format other than i16, u16 or f32.
    pub fn start_capture(
        &self,
    ) -> Result<(CaptureStream, ringbuf::HeapCons<i16>), SyncStreamError> {
        let ring = HeapRb::<i16>::new(self.config.buffer_capacity.max(1));
        let (producer, consumer) = ring.split();

        let supported = self.device.default_input_config().map_err(backend_error)?;
        let sample_format = supported.sample_format();
        let config: CpalStreamConfig = supported.into();

        let stream = match sample_format {
            SampleFormat::I16 => self.build_stream::<i16>(&config, producer)?,
            SampleFormat::U16 => self.build_stream::<u16>(&config, producer)?,
            SampleFormat::F32 => self.build_stream::<f32>(&config, producer)?,
            format => {
                return Err(SyncStreamError::UnsupportedFormat {
                    format: format!("{format:?}"),
                });
            }
        };
        stream.play().map_err(backend_error)?;

        Ok((CaptureStream { _stream: stream }, consumer))
    }

    /// Starts capturing and streams the audio into a session.
    ///
    /// Samples are cut into the session's
    /// [`chunk_duration`](ChunkSender::chunk_duration) at the device's native
    /// rate and submitted through `sender` as little-endian 16-bit PCM. A
    /// native layout that differs from the session's
    /// [`format`](ChunkSender::format) is logged, not converted. The device
    /// stays open until the returned handle is stopped or dropped; the bridge
    /// also ends when the session stops.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be built or started.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let sender = stream.start_session().await?;
    /// let capture = AudioDevice::open_default()?.stream_into(sender)?;
    /// // ...
    /// capture.stop().await;
    /// stream.stop_session().await;
    /// ```
    pub fn stream_into(&self, sender: ChunkSender) -> Result<CaptureHandle, SyncStreamError> {
        let (sample_rate, channels) = self.native_config()?;
        let session_format = sender.format();
        if (session_format.sample_rate, session_format.channels) != (sample_rate, channels) {
            warn!(
                device = %self.name(),
                sample_rate,
                channels,
                session_rate = session_format.sample_rate,
                session_channels = session_format.channels,
                "device layout differs from the session format"
            );
        }

        let (stream, consumer) = self.start_capture()?;
        info!(device = %self.name(), sample_rate, channels, "device capture started");

        let config = CaptureConfig {
            sample_rate,
            channels,
            chunk_duration: sender.chunk_duration(),
        };
        Ok(spawn_capture_bridge(consumer, &config, sender, Some(stream)))
    }

    fn build_stream<T>(
        &self,
        config: &CpalStreamConfig,
        mut producer: ringbuf::HeapProd<i16>,
    ) -> Result<Stream, SyncStreamError>
    where
        T: SizedSample,
        i16: FromSample<T>,
    {
        self.device
            .build_input_stream(
                config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    for &sample in data {
                        // Full buffer: drop rather than block the callback
                        let _ = producer.try_push(i16::from_sample(sample));
                    }
                },
                |err| error!(error = %err, "audio stream error"),
                None,
            )
            .map_err(backend_error)
    }
}

/// A running audio capture stream.
///
/// Capture continues while this is held; dropping it stops the CPAL stream.
pub struct CaptureStream {
    _stream: Stream,
}
