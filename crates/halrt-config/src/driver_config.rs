//! Driver description file format.

use std::path::Path;
use std::sync::Arc;

use halrt_core::{
    Context, Device, DeviceParameters, Direction, Driver, Object, Plugin, PluginParameters,
    StreamFormat, StreamParameters, ValueRange,
};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::validation::{ValidationResult, validate_config};

/// A plugin and its devices, as stored in a TOML file.
///
/// # TOML Format
///
/// ```toml
/// [plugin]
/// manufacturer = "Example Audio"
///
/// [[devices]]
/// name = "Loopback"
/// device_uid = "example:loopback"
/// sample_rate = 48000.0
/// channel_count = 2
/// available_sample_rates = [44100.0, 48000.0, { min = 88200.0, max = 96000.0 }]
///
/// [[devices.streams]]
/// direction = "input"
/// mute = true
///
/// [[devices.streams]]
/// direction = "output"
/// format = "f32"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DriverConfig {
    /// Plugin settings.
    #[serde(default)]
    pub plugin: PluginConfig,

    /// Devices published by the plugin.
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

/// Plugin settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PluginConfig {
    /// Human-readable manufacturer.
    pub manufacturer: String,
    /// Resource bundle path.
    pub resource_bundle_path: String,
}

impl Default for PluginConfig {
    fn default() -> Self {
        let params = PluginParameters::default();
        Self {
            manufacturer: params.manufacturer,
            resource_bundle_path: params.resource_bundle_path,
        }
    }
}

impl From<&PluginConfig> for PluginParameters {
    fn from(config: &PluginConfig) -> Self {
        Self {
            manufacturer: config.manufacturer.clone(),
            resource_bundle_path: config.resource_bundle_path.clone(),
        }
    }
}

/// A supported sample rate: a single value or an inclusive range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RateSpec {
    /// Exactly this rate.
    Exact(f64),
    /// Any rate between the bounds.
    Range {
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },
}

impl RateSpec {
    /// The rate as a value range.
    pub fn range(self) -> ValueRange {
        match self {
            RateSpec::Exact(rate) => ValueRange::exact(rate),
            RateSpec::Range { min, max } => ValueRange::new(min, max),
        }
    }
}

/// Device settings. Missing keys take the runtime defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeviceConfig {
    /// Human-readable name.
    pub name: String,
    /// Human-readable manufacturer.
    pub manufacturer: String,
    /// Persistent UID; generated when empty.
    pub device_uid: String,
    /// Model UID.
    pub model_uid: String,
    /// Serial number.
    pub serial_number: String,
    /// Firmware version.
    pub firmware_version: String,
    /// May be the default device.
    pub can_be_default: bool,
    /// May be the default device for system sounds.
    pub can_be_default_for_system_sounds: bool,
    /// Nominal sample rate.
    pub sample_rate: f64,
    /// Channel count for streams without an explicit count.
    pub channel_count: u32,
    /// Latency in frames.
    pub latency: u32,
    /// Safety offset in frames.
    pub safety_offset: u32,
    /// Frames between zero timestamps; 0 means the sample rate.
    pub zero_timestamp_period: u32,
    /// Whether the clock is stable.
    pub clock_is_stable: bool,
    /// Clock domain.
    pub clock_domain: u32,
    /// Let the host mix client output.
    pub enable_mixing: bool,
    /// Trace real-time calls.
    pub enable_realtime_tracing: bool,
    /// Supported nominal rates. Empty means only the nominal rate.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub available_sample_rates: Vec<RateSpec>,
    /// Streams, in creation order.
    pub streams: Vec<StreamConfig>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        let params = DeviceParameters::default();
        Self {
            name: params.name,
            manufacturer: params.manufacturer,
            device_uid: params.device_uid,
            model_uid: params.model_uid,
            serial_number: params.serial_number,
            firmware_version: params.firmware_version,
            can_be_default: params.can_be_default,
            can_be_default_for_system_sounds: params.can_be_default_for_system_sounds,
            sample_rate: params.sample_rate,
            channel_count: params.channel_count,
            latency: params.latency,
            safety_offset: params.safety_offset,
            zero_timestamp_period: params.zero_timestamp_period,
            clock_is_stable: params.clock_is_stable,
            clock_domain: params.clock_domain,
            enable_mixing: params.enable_mixing,
            enable_realtime_tracing: params.enable_realtime_tracing,
            available_sample_rates: Vec::new(),
            streams: Vec::new(),
        }
    }
}

impl From<&DeviceConfig> for DeviceParameters {
    fn from(config: &DeviceConfig) -> Self {
        Self {
            name: config.name.clone(),
            manufacturer: config.manufacturer.clone(),
            device_uid: config.device_uid.clone(),
            model_uid: config.model_uid.clone(),
            serial_number: config.serial_number.clone(),
            firmware_version: config.firmware_version.clone(),
            can_be_default: config.can_be_default,
            can_be_default_for_system_sounds: config.can_be_default_for_system_sounds,
            sample_rate: config.sample_rate,
            channel_count: config.channel_count,
            latency: config.latency,
            safety_offset: config.safety_offset,
            zero_timestamp_period: config.zero_timestamp_period,
            clock_is_stable: config.clock_is_stable,
            clock_domain: config.clock_domain,
            enable_mixing: config.enable_mixing,
            enable_realtime_tracing: config.enable_realtime_tracing,
        }
    }
}

/// Stream direction in a description file.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StreamDirection {
    /// Clients read from the device.
    Input,
    /// Clients write to the device.
    #[default]
    Output,
}

impl From<StreamDirection> for Direction {
    fn from(direction: StreamDirection) -> Self {
        match direction {
            StreamDirection::Input => Direction::Input,
            StreamDirection::Output => Direction::Output,
        }
    }
}

/// Sample layout of a stream.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// Packed signed 16-bit integers.
    #[default]
    I16,
    /// Packed 32-bit floats.
    F32,
}

/// Stream settings. Unset fields follow the device.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    /// Input or output.
    pub direction: StreamDirection,
    /// Sample layout.
    pub format: SampleFormat,
    /// Channel count; defaults to the device's preferred count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<u32>,
    /// Sample rate; defaults to the device's nominal rate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<f64>,
    /// First device channel (1-based); defaults to after the previous
    /// stream in the same direction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starting_channel: Option<u32>,
    /// Stream latency in frames.
    pub latency: u32,
    /// Attach a volume and a mute control to the stream.
    pub mute: bool,
}

impl StreamConfig {
    /// Whether every field is at its default, so the device can derive the
    /// stream entirely.
    fn is_derived(&self) -> bool {
        self.format == SampleFormat::I16
            && self.channels.is_none()
            && self.sample_rate.is_none()
            && self.starting_channel.is_none()
            && self.latency == 0
    }

    /// Stream parameters for a stream added to `device`.
    pub fn to_params(&self, device: &Device) -> StreamParameters {
        let direction = Direction::from(self.direction);
        let sample_rate = self
            .sample_rate
            .unwrap_or_else(|| device.nominal_sample_rate());
        let channels = self
            .channels
            .unwrap_or_else(|| device.preferred_channel_count());
        let starting_channel = self.starting_channel.unwrap_or_else(|| {
            device
                .streams()
                .iter()
                .filter(|s| s.direction() == direction)
                .map(|s| s.starting_channel() + s.channel_count())
                .fold(1, u32::max)
        });
        let format = match self.format {
            SampleFormat::I16 => StreamFormat::pcm_i16(sample_rate, channels),
            SampleFormat::F32 => StreamFormat::pcm_f32(sample_rate, channels),
        };

        StreamParameters {
            direction,
            starting_channel,
            format,
            latency: self.latency,
        }
    }
}

impl DriverConfig {
    /// Load a description from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        let config: DriverConfig = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), devices = config.devices.len(), "DriverConfig: loaded");
        Ok(config)
    }

    /// Load a description from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Save the description to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        Ok(())
    }

    /// Convert the description to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Add a device.
    pub fn with_device(mut self, device: DeviceConfig) -> Self {
        self.devices.push(device);
        self
    }

    /// Check the description for inconsistencies.
    pub fn validate(&self) -> ValidationResult<()> {
        validate_config(self)
    }

    /// Create the plugin, its devices, and their streams in `context`.
    ///
    /// The description is validated first. Build before attaching a host so
    /// structural changes apply immediately.
    pub fn build(&self, context: &Arc<Context>) -> Result<Arc<Plugin>, ConfigError> {
        self.validate()?;

        let plugin = Plugin::new(context, PluginParameters::from(&self.plugin));
        for config in &self.devices {
            let device = build_device(context, config)?;
            plugin.add_device(device);
        }

        tracing::info!(devices = self.devices.len(), "DriverConfig: plugin built");
        Ok(plugin)
    }

    /// Build into a fresh context and wrap the result in a [`Driver`].
    pub fn build_driver(&self) -> Result<Driver, ConfigError> {
        let context = Context::new();
        let plugin = self.build(&context)?;
        Ok(Driver::new(context, plugin))
    }
}

fn build_device(context: &Arc<Context>, config: &DeviceConfig) -> Result<Arc<Device>, ConfigError> {
    let device = Device::new(context, DeviceParameters::from(config));

    if !config.available_sample_rates.is_empty() {
        device.set_available_sample_rates(
            config
                .available_sample_rates
                .iter()
                .map(|rate| rate.range())
                .collect(),
        );
    }

    for stream in &config.streams {
        if let Some(rate) = stream.sample_rate {
            device
                .check_nominal_sample_rate(rate)
                .map_err(|e| ConfigError::build(config.name.as_str(), e))?;
        }

        let direction = Direction::from(stream.direction);
        let added = match (stream.is_derived(), stream.mute) {
            (true, false) => device.add_stream(direction),
            (true, true) => device.add_stream_with_controls(direction),
            (false, false) => device.add_stream_with_params(stream.to_params(&device)),
            (false, true) => device.add_stream_with_controls_and_params(stream.to_params(&device)),
        };
        tracing::debug!(
            device = %config.name,
            stream_id = %added.id(),
            direction = %direction,
            "DriverConfig: stream built"
        );
    }

    Ok(device)
}
