//! Input device enumeration and selection
//!
//! Device indices count input-capable devices only, in the order the default
//! host reports them.

use std::fmt;

use cpal::traits::{DeviceTrait, HostTrait};
use serde::Serialize;

use crate::error::RecorderError;

/// An input device as shown to the user for diagnosis
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputDeviceInfo {
    pub index: usize,
    pub name: String,
    /// Channels of the device's default input config (0 when unknown)
    pub channels: u16,
}

impl fmt::Display for InputDeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({} ch)", self.index, self.name, self.channels)
    }
}

/// Input devices of the default host
pub fn list_input_devices() -> Vec<InputDeviceInfo> {
    enumerate(&cpal::default_host())
}

fn enumerate(host: &cpal::Host) -> Vec<InputDeviceInfo> {
    let devices = match host.input_devices() {
        Ok(devices) => devices,
        Err(e) => {
            tracing::warn!("Failed to enumerate input devices: {}", e);
            return Vec::new();
        }
    };

    devices
        .enumerate()
        .map(|(index, device)| InputDeviceInfo {
            index,
            name: device.name().unwrap_or_else(|_| String::from("unknown")),
            channels: device
                .default_input_config()
                .map(|c| c.channels())
                .unwrap_or(0),
        })
        .collect()
}

/// Pick the configured device, or the host default when none is configured
pub(crate) fn select_input_device(
    host: &cpal::Host,
    index: Option<usize>,
) -> Result<cpal::Device, RecorderError> {
    match index {
        None => host
            .default_input_device()
            .ok_or_else(|| unavailable(host, "no input devices present".to_string())),
        Some(index) => host
            .input_devices()
            .ok()
            .and_then(|mut devices| devices.nth(index))
            .ok_or_else(|| unavailable(host, format!("input device index {} not found", index))),
    }
}

/// Build a `DeviceUnavailable` error carrying the current candidates
pub(crate) fn unavailable(host: &cpal::Host, reason: String) -> RecorderError {
    RecorderError::DeviceUnavailable {
        reason,
        candidates: enumerate(host),
    }
}
