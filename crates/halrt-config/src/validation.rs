//! Consistency checks for driver descriptions.
//!
//! [`validate_config`] reports every problem it finds, not just the first,
//! so a broken file can be fixed in one pass.

use std::collections::HashSet;

use thiserror::Error;

use crate::driver_config::{DeviceConfig, DriverConfig, RateSpec, StreamConfig};

/// Validation error types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// Sample rate is not a positive finite number.
    #[error("device '{device}': invalid sample rate {value}")]
    InvalidSampleRate {
        /// Name of the device.
        device: String,
        /// The offending rate.
        value: f64,
    },

    /// Device or stream has zero channels.
    #[error("device '{device}': channel count must be positive")]
    ZeroChannels {
        /// Name of the device.
        device: String,
    },

    /// Rate range with a non-positive bound or `min > max`.
    #[error("device '{device}': invalid rate range [{min}, {max}]")]
    InvalidRateRange {
        /// Name of the device.
        device: String,
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },

    /// Nominal rate is outside every declared range.
    #[error("device '{device}': sample rate {rate} is not in the available rates")]
    RateNotAvailable {
        /// Name of the device.
        device: String,
        /// Nominal rate.
        rate: f64,
    },

    /// Two devices declare the same UID.
    #[error("duplicate device uid '{0}'")]
    DuplicateUid(String),

    /// A stream entry is inconsistent.
    #[error("device '{device}', stream {index}: {reason}")]
    InvalidStream {
        /// Name of the device.
        device: String,
        /// Position of the stream in the device's list.
        index: usize,
        /// What is wrong.
        reason: String,
    },

    /// Multiple validation errors.
    #[error("multiple validation errors: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

fn valid_rate(rate: f64) -> bool {
    rate.is_finite() && rate > 0.0
}

/// Check a whole driver description.
pub fn validate_config(config: &DriverConfig) -> ValidationResult<()> {
    let mut errors = Vec::new();
    let mut uids = HashSet::new();

    for device in &config.devices {
        errors.extend(device_errors(device));
        if !device.device_uid.is_empty() && !uids.insert(device.device_uid.as_str()) {
            errors.push(ValidationError::DuplicateUid(device.device_uid.clone()));
        }
    }

    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ValidationError::Multiple(errors)),
    }
}

/// Check one device and its streams.
pub fn validate_device(device: &DeviceConfig) -> ValidationResult<()> {
    let mut errors = device_errors(device);
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ValidationError::Multiple(errors)),
    }
}

fn device_errors(device: &DeviceConfig) -> Vec<ValidationError> {
    let name = || device.name.clone();
    let mut errors = Vec::new();

    if !valid_rate(device.sample_rate) {
        errors.push(ValidationError::InvalidSampleRate {
            device: name(),
            value: device.sample_rate,
        });
    }
    if device.channel_count == 0 {
        errors.push(ValidationError::ZeroChannels { device: name() });
    }

    for rate in &device.available_sample_rates {
        let range = rate.range();
        if !valid_rate(range.minimum) || !valid_rate(range.maximum) || range.minimum > range.maximum
        {
            errors.push(ValidationError::InvalidRateRange {
                device: name(),
                min: range.minimum,
                max: range.maximum,
            });
        }
    }
    if valid_rate(device.sample_rate)
        && !device.available_sample_rates.is_empty()
        && !device
            .available_sample_rates
            .iter()
            .any(|rate| rate.range().contains(device.sample_rate))
    {
        errors.push(ValidationError::RateNotAvailable {
            device: name(),
            rate: device.sample_rate,
        });
    }

    for (index, stream) in device.streams.iter().enumerate() {
        if let Some(reason) = stream_problem(stream) {
            errors.push(ValidationError::InvalidStream {
                device: name(),
                index,
                reason,
            });
        }
    }
    errors
}

fn stream_problem(stream: &StreamConfig) -> Option<String> {
    if stream.channels == Some(0) {
        return Some("channel count must be positive".to_string());
    }
    if let Some(rate) = stream.sample_rate.filter(|&rate| !valid_rate(rate)) {
        return Some(format!("invalid sample rate {rate}"));
    }
    if stream.starting_channel == Some(0) {
        return Some("starting channel is 1-based".to_string());
    }
    None
}
