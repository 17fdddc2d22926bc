//! Configuration types for discovery, connection and streaming.

use std::fmt;
use std::time::Duration;

use crate::SyncStreamError;

/// Length of one inquiry timeout unit used by radio stacks.
const INQUIRY_UNIT: Duration = Duration::from_millis(1280);

/// A transport-level service contract two devices must agree on before
/// streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceProfile {
    /// Audio sink (A2DP-style high quality playback).
    AudioSink,
    /// Hands-free (bidirectional voice).
    Handsfree,
    /// Headset.
    Headset,
    /// Serial port emulation.
    SerialPort,
}

impl ServiceProfile {
    /// Returns the 16-bit service class identifier.
    #[must_use]
    pub fn service_class(&self) -> u16 {
        match self {
            Self::AudioSink => 0x110B,
            Self::Handsfree => 0x111E,
            Self::Headset => 0x1108,
            Self::SerialPort => 0x1101,
        }
    }
}

impl fmt::Display for ServiceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AudioSink => "audio-sink",
            Self::Handsfree => "handsfree",
            Self::Headset => "headset",
            Self::SerialPort => "serial-port",
        };
        f.write_str(name)
    }
}

/// Ordered preference list of service profiles to try for each candidate.
///
/// The first profile that connects wins; later profiles are only tried after
/// the earlier ones fail.
///
/// # Example
///
/// ```
/// use syncstream::{ConnectionProfile, ServiceProfile};
///
/// let profiles = ConnectionProfile::new([ServiceProfile::Handsfree]);
/// assert_eq!(profiles.len(), 1);
/// assert_eq!(ConnectionProfile::default().as_slice()[0], ServiceProfile::AudioSink);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionProfile(Vec<ServiceProfile>);

impl ConnectionProfile {
    /// Creates a preference list in the given order.
    pub fn new(profiles: impl IntoIterator<Item = ServiceProfile>) -> Self {
        Self(profiles.into_iter().collect())
    }

    /// Returns the profiles in preference order.
    pub fn as_slice(&self) -> &[ServiceProfile] {
        &self.0
    }

    /// Returns the number of profiles.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no profile is configured.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for ConnectionProfile {
    fn default() -> Self {
        Self(vec![ServiceProfile::AudioSink, ServiceProfile::Handsfree])
    }
}

/// Options handed to every discovery backend.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct DiscoveryOptions {
    /// Inquiry length in radio timeout units (1.28s each).
    ///
    /// Default: 4
    pub timeout_multiplier: u8,
    /// Include devices that completed pairing.
    pub return_authenticated: bool,
    /// Include devices remembered from earlier sessions.
    pub return_remembered: bool,
    /// Include devices never seen before.
    pub return_unknown: bool,
    /// Include devices that are currently connected.
    pub return_connected: bool,
    /// Run a fresh radio inquiry instead of only listing known devices.
    pub issue_inquiry: bool,
}

impl DiscoveryOptions {
    /// Returns the inquiry timeout the radio stack applies.
    #[must_use]
    pub fn inquiry_timeout(&self) -> Duration {
        INQUIRY_UNIT * u32::from(self.timeout_multiplier)
    }
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            timeout_multiplier: 4,
            return_authenticated: true,
            return_remembered: true,
            return_unknown: true,
            return_connected: true,
            issue_inquiry: false,
        }
    }
}

/// Configuration for the [`ConnectionManager`](crate::ConnectionManager).
///
/// # Example
///
/// ```
/// use syncstream::ManagerConfig;
/// use std::time::Duration;
///
/// let config = ManagerConfig {
///     retry_delay: Duration::from_millis(250),
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Profiles to try for each candidate, in order.
    pub profiles: ConnectionProfile,

    /// Passes over the profile list before a candidate is dropped.
    ///
    /// Default: 3
    pub retry_attempts: u32,

    /// Pause between passes.
    ///
    /// Default: zero (the next pass starts as soon as the failure is seen)
    pub retry_delay: Duration,

    /// Options passed to discovery backends.
    pub discovery: DiscoveryOptions,
}

impl ManagerConfig {
    /// Checks the configuration for contract violations.
    pub fn validate(&self) -> Result<(), SyncStreamError> {
        if self.profiles.is_empty() {
            return Err(SyncStreamError::NoProfilesConfigured);
        }
        if self.retry_attempts == 0 {
            return Err(SyncStreamError::InvalidRetryCeiling {
                value: self.retry_attempts,
            });
        }
        Ok(())
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            profiles: ConnectionProfile::default(),
            retry_attempts: 3,
            retry_delay: Duration::ZERO,
            discovery: DiscoveryOptions::default(),
        }
    }
}

/// Layout of the raw PCM bytes flowing through a session.
///
/// The broadcast core never looks inside chunks; the format is used by the
/// device capture adapter and by sinks that need to describe the bytes (WAV).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
    /// Bits per sample.
    pub bits_per_sample: u16,
}

impl PcmFormat {
    /// Bytes in one frame (one sample per channel).
    #[must_use]
    pub fn bytes_per_frame(&self) -> usize {
        usize::from(self.channels) * usize::from(self.bits_per_sample / 8)
    }

    /// Bytes per second of audio.
    #[must_use]
    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * self.bytes_per_frame() as u32
    }

    /// Returns how much audio `len` bytes represent.
    #[must_use]
    pub fn duration_of(&self, len: usize) -> Duration {
        let byte_rate = self.byte_rate();
        if byte_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(len as f64 / f64::from(byte_rate))
    }
}

impl Default for PcmFormat {
    fn default() -> Self {
        FormatPreset::default().format()
    }
}

/// Preset PCM layouts for common capture setups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatPreset {
    /// 44.1kHz stereo, 16-bit - what desktop loopback capture delivers.
    #[default]
    CdStereo,

    /// 16kHz mono, 16-bit - hands-free voice links.
    Speech,
}

impl FormatPreset {
    /// Returns the PCM layout for this preset.
    #[must_use]
    pub fn format(&self) -> PcmFormat {
        match self {
            Self::CdStereo => PcmFormat {
                sample_rate: 44100,
                channels: 2,
                bits_per_sample: 16,
            },
            Self::Speech => PcmFormat {
                sample_rate: 16000,
                channels: 1,
                bits_per_sample: 16,
            },
        }
    }
}

/// Configuration for a streaming session.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Chunks that may wait between the producer and the router.
    ///
    /// A small queue keeps `ChunkSender::send` from waiting longer than one
    /// dispatch cycle.
    /// Default: 8
    pub chunk_queue_capacity: usize,

    /// Layout of the raw bytes.
    pub format: PcmFormat,

    /// Duration of each chunk cut by the device capture adapter.
    ///
    /// Default: 100ms
    pub chunk_duration: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_queue_capacity: 8,
            format: PcmFormat::default(),
            chunk_duration: Duration::from_millis(100),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile_order() {
        let profiles = ConnectionProfile::default();
        assert_eq!(
            profiles.as_slice(),
            &[ServiceProfile::AudioSink, ServiceProfile::Handsfree]
        );
    }

    #[test]
    fn test_service_class_ids() {
        assert_eq!(ServiceProfile::AudioSink.service_class(), 0x110B);
        assert_eq!(ServiceProfile::Handsfree.service_class(), 0x111E);
        assert_eq!(ServiceProfile::Handsfree.to_string(), "handsfree");
    }

    #[test]
    fn test_inquiry_timeout() {
        let options = DiscoveryOptions::default();
        assert_eq!(options.inquiry_timeout(), Duration::from_millis(5120));
    }

    #[test]
    fn test_manager_config_defaults() {
        let config = ManagerConfig::default();
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.retry_delay, Duration::ZERO);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_manager_config_rejects_empty_profiles() {
        let config = ManagerConfig {
            profiles: ConnectionProfile::new([]),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SyncStreamError::NoProfilesConfigured)
        ));
    }

    #[test]
    fn test_manager_config_rejects_zero_retries() {
        let config = ManagerConfig {
            retry_attempts: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SyncStreamError::InvalidRetryCeiling { value: 0 })
        ));
    }

    #[test]
    fn test_pcm_format_presets() {
        let cd = FormatPreset::CdStereo.format();
        assert_eq!(cd.bytes_per_frame(), 4);
        assert_eq!(cd.byte_rate(), 176_400);

        let speech = FormatPreset::Speech.format();
        assert_eq!(speech.duration_of(3200), Duration::from_millis(100));
    }

    #[test]
    fn test_stream_config_defaults() {
        let config = StreamConfig::default();
        assert_eq!(config.chunk_queue_capacity, 8);
        assert_eq!(config.format, FormatPreset::CdStereo.format());
        assert_eq!(config.chunk_duration, Duration::from_millis(100));
    }
}
