//! Capture adapter: CPAL input devices and a synthetic source.
//!
//! Either one feeds a running session through the capture bridge. Neither
//! is required; any producer can submit chunks through
//! [`ChunkSender`](crate::ChunkSender) directly.

mod device;
mod mock;

pub use device::{AudioDevice, CaptureStream, DeviceConfig};
pub use mock::MockSource;

use cpal::traits::{DeviceTrait, HostTrait};

use crate::SyncStreamError;

/// Lists all available input devices.
///
/// # Errors
///
/// Returns an error if the audio host cannot be accessed.
pub fn list_input_devices() -> Result<Vec<String>, SyncStreamError> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| SyncStreamError::BackendError(e.to_string()))?;

    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

/// Gets the name of the default input device, if any.
pub fn default_input_device_name() -> Option<String> {
    cpal::default_host()
        .default_input_device()
        .and_then(|d| d.name().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_devices_doesnt_panic() {
        // May be empty in CI
        let _ = list_input_devices();
    }

    #[test]
    fn test_default_device_doesnt_panic() {
        let _ = default_input_device_name();
    }
}
