//! Endpoint discovery on the default cpal host
//!
//! Output and capture endpoints share one code path keyed by [`Direction`].
//! Lookups by name fall back to the host default when no name is given, which
//! is how `CpalDevice::open` resolves its configuration.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, SupportedStreamConfigRange};
use sonant_core::SampleRate;

use crate::{AudioError, AudioResult};

/// Stream direction of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Output,
    Input,
}

impl Direction {
    pub fn label(self) -> &'static str {
        match self {
            Direction::Output => "output",
            Direction::Input => "input",
        }
    }
}

/// What the host reports about one endpoint
#[derive(Debug, Clone)]
pub struct EndpointInfo {
    pub name: String,
    pub direction: Direction,
    pub is_default: bool,
    /// Widest channel layout across the supported configs
    pub channels: u16,
    /// Engine sample rates the endpoint can run at, ascending
    pub sample_rates: Vec<u32>,
}

fn devices(direction: Direction) -> AudioResult<Vec<Device>> {
    let host = cpal::default_host();
    let devices = match direction {
        Direction::Output => host.output_devices().map(|d| d.collect()),
        Direction::Input => host.input_devices().map(|d| d.collect()),
    };
    devices.map_err(|e| AudioError::BackendError(e.to_string()))
}

/// Host default device for `direction`
pub fn default_device(direction: Direction) -> AudioResult<Device> {
    let host = cpal::default_host();
    match direction {
        Direction::Output => host.default_output_device(),
        Direction::Input => host.default_input_device(),
    }
    .ok_or(AudioError::NoDevice)
}

/// Device called `name`, or the host default when `name` is `None` or empty
pub fn find_device(direction: Direction, name: Option<&str>) -> AudioResult<Device> {
    let Some(name) = name.filter(|n| !n.is_empty()) else {
        return default_device(direction);
    };
    devices(direction)?
        .into_iter()
        .find(|device| device.name().ok().as_deref() == Some(name))
        .ok_or_else(|| AudioError::DeviceNotFound(name.to_string()))
}

/// Supported config ranges of `device` in `direction`
pub(crate) fn config_ranges(
    device: &Device,
    direction: Direction,
) -> AudioResult<Vec<SupportedStreamConfigRange>> {
    match direction {
        Direction::Output => device.supported_output_configs().map(|c| c.collect()),
        Direction::Input => device.supported_input_configs().map(|c| c.collect()),
    }
    .map_err(|e| AudioError::ConfigError(e.to_string()))
}

/// Every endpoint of the default host in `direction`
///
/// Devices whose name or configs cannot be queried are skipped.
pub fn list_endpoints(direction: Direction) -> AudioResult<Vec<EndpointInfo>> {
    let default_name = default_device(direction).ok().and_then(|d| d.name().ok());

    let endpoints = devices(direction)?
        .into_iter()
        .filter_map(|device| {
            let name = device.name().ok()?;
            let ranges = config_ranges(&device, direction).unwrap_or_default();
            Some(EndpointInfo {
                is_default: default_name.as_deref() == Some(name.as_str()),
                channels: ranges.iter().map(|c| c.channels()).max().unwrap_or(0),
                sample_rates: supported_rates(&ranges),
                direction,
                name,
            })
        })
        .collect();
    Ok(endpoints)
}

/// Engine sample rates covered by a set of config ranges, ascending and unique
pub fn supported_rates(ranges: &[SupportedStreamConfigRange]) -> Vec<u32> {
    SampleRate::ALL
        .into_iter()
        .map(|rate| rate.as_u32())
        .filter(|&rate| {
            ranges
                .iter()
                .any(|c| c.min_sample_rate().0 <= rate && rate <= c.max_sample_rate().0)
        })
        .collect()
}

/// Names of the audio hosts compiled into this build
pub fn list_available_hosts() -> Vec<String> {
    cpal::available_hosts()
        .into_iter()
        .map(|h| format!("{:?}", h))
        .collect()
}
