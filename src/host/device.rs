//! Device and stream-format selection for the standalone host

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig, SupportedStreamConfigRange};

use crate::error::AudioError;

/// Sample rate requested when the device supports it
pub const PREFERRED_SAMPLE_RATE: u32 = 48_000;

/// Direction of a device stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

pub fn default_device(direction: Direction) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();
    let device = match direction {
        Direction::Input => host.default_input_device(),
        Direction::Output => host.default_output_device(),
    };
    device.ok_or_else(|| AudioError::DeviceNotFound(format!("No default {:?} device", direction)))
}

pub fn device_name(device: &cpal::Device) -> String {
    device.name().unwrap_or_else(|_| "Unknown".to_string())
}

/// Pick an f32 stream config, preferring stereo at 48 kHz
pub fn stream_config(device: &cpal::Device, direction: Direction) -> Result<StreamConfig, AudioError> {
    let ranges: Vec<SupportedStreamConfigRange> = match direction {
        Direction::Input => device.supported_input_configs().map(|c| c.collect()),
        Direction::Output => device.supported_output_configs().map(|c| c.collect()),
    }
    .map_err(|e| AudioError::DeviceNotFound(e.to_string()))?;

    let best = ranges
        .iter()
        .filter(|range| range.sample_format() == SampleFormat::F32)
        .min_by_key(|range| score(range))
        .ok_or_else(|| {
            AudioError::UnsupportedFormat(format!("{} has no f32 stream format", device_name(device)))
        })?;

    let rate = SampleRate(PREFERRED_SAMPLE_RATE);
    let supported = if best.min_sample_rate() <= rate && rate <= best.max_sample_rate() {
        best.clone().with_sample_rate(rate)
    } else {
        best.clone().with_max_sample_rate()
    };

    Ok(supported.config())
}

/// Lower is better: stereo first, then any rate covering 48 kHz
fn score(range: &SupportedStreamConfigRange) -> (u16, bool) {
    let rate = SampleRate(PREFERRED_SAMPLE_RATE);
    let channel_distance = range.channels().abs_diff(2);
    let covers_rate = range.min_sample_rate() <= rate && rate <= range.max_sample_rate();
    (channel_distance, !covers_rate)
}
