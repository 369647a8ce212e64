//! Audio streams.
//!
//! A stream belongs to one device, identified by id. Format and latency
//! changes go through that device's configuration-change protocol; a stream
//! created without a device applies them immediately.

use std::fmt;
use std::sync::{Arc, Weak};

use halrt_registry::ObjectId;
use halrt_sync::VersionedCell;

use crate::context::Context;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::format::{Direction, RangedFormat, StreamFormat};
use crate::mute::MuteControl;
use crate::object::{ClassId, Object, ObjectCore, impl_object};
use crate::property::{Property, PropertyValue, Selector};
use crate::volume::VolumeControl;

/// Terminal type reported for input streams.
pub const TERMINAL_TYPE_MICROPHONE: u32 = u32::from_be_bytes(*b"micr");
/// Terminal type reported for output streams.
pub const TERMINAL_TYPE_SPEAKER: u32 = u32::from_be_bytes(*b"spkr");

/// Stream construction parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamParameters {
    /// Input or output.
    pub direction: Direction,
    /// First device channel the stream maps to (1-based).
    pub starting_channel: u32,
    /// Initial physical and virtual format.
    pub format: StreamFormat,
    /// Stream latency in frames.
    pub latency: u32,
}

impl Default for StreamParameters {
    fn default() -> Self {
        Self {
            direction: Direction::Output,
            starting_channel: 1,
            format: StreamFormat::default(),
            latency: 0,
        }
    }
}

/// One direction of audio on a device.
pub struct Stream {
    core: ObjectCore,
    device: ObjectId,
    params: StreamParameters,
    is_active: VersionedCell<bool>,
    latency: VersionedCell<u32>,
    physical_format: VersionedCell<StreamFormat>,
    virtual_format: VersionedCell<StreamFormat>,
    available_physical_formats: VersionedCell<Vec<RangedFormat>>,
    available_virtual_formats: VersionedCell<Vec<RangedFormat>>,
    mute_control: VersionedCell<Option<Arc<MuteControl>>>,
    volume_control: VersionedCell<Option<Arc<VolumeControl>>>,
}

fn expect_format(value: &PropertyValue) -> Result<StreamFormat> {
    match value {
        PropertyValue::Format(format) => Ok(*format),
        _ => Err(Error::IllegalOperation("expected a stream format")),
    }
}

static PROPERTIES: &[Property<Stream>] = &[
    Property::settable(
        Selector::IS_ACTIVE,
        |s, _| Ok(PropertyValue::Bool(s.is_active())),
        |s, _, value| {
            s.set_active(value.as_bool().unwrap_or_default());
            Ok(())
        },
    ),
    Property::read_only(Selector::DIRECTION, |s, _| {
        Ok(PropertyValue::U32(s.direction().raw()))
    }),
    Property::read_only(Selector::TERMINAL_TYPE, |s, _| {
        Ok(PropertyValue::U32(s.terminal_type()))
    }),
    Property::read_only(Selector::STARTING_CHANNEL, |s, _| {
        Ok(PropertyValue::U32(s.starting_channel()))
    }),
    Property::read_only(Selector::LATENCY, |s, _| Ok(PropertyValue::U32(s.latency()))),
    Property::settable(
        Selector::VIRTUAL_FORMAT,
        |s, _| Ok(PropertyValue::Format(s.virtual_format())),
        |s, _, value| s.set_virtual_format(expect_format(&value)?),
    ),
    Property::read_only(Selector::AVAILABLE_VIRTUAL_FORMATS, |s, _| {
        Ok(PropertyValue::RangedFormats(s.available_virtual_formats()))
    }),
    Property::settable(
        Selector::PHYSICAL_FORMAT,
        |s, _| Ok(PropertyValue::Format(s.physical_format())),
        |s, _, value| s.set_physical_format(expect_format(&value)?),
    ),
    Property::read_only(Selector::AVAILABLE_PHYSICAL_FORMATS, |s, _| {
        Ok(PropertyValue::RangedFormats(s.available_physical_formats()))
    }),
];

impl_object!(Stream, ClassId::STREAM, PROPERTIES);

impl Stream {
    /// Create a stream owned by device `device`.
    ///
    /// Pass [`ObjectId::UNKNOWN`] for a detached stream. The available
    /// formats start as the single initial format at its own sample rate.
    pub fn new(context: &Arc<Context>, device: ObjectId, params: StreamParameters) -> Arc<Self> {
        let available = vec![RangedFormat::exact(params.format)];
        Arc::new_cyclic(|this: &Weak<Self>| {
            let this: Weak<dyn Object> = this.clone();
            Self {
                core: ObjectCore::new(context, "Stream", this),
                device,
                params,
                is_active: VersionedCell::new(true),
                latency: VersionedCell::new(params.latency),
                physical_format: VersionedCell::new(params.format),
                virtual_format: VersionedCell::new(params.format),
                available_physical_formats: VersionedCell::new(available.clone()),
                available_virtual_formats: VersionedCell::new(available),
                mute_control: VersionedCell::new(None),
                volume_control: VersionedCell::new(None),
            }
        })
    }

    /// Id of the owning device.
    pub fn device_id(&self) -> ObjectId {
        self.device
    }

    /// The owning device, if it is still alive.
    pub fn device(&self) -> Option<Arc<Device>> {
        if self.device.is_unknown() {
            return None;
        }
        self.core.context().find_as::<Device>(self.device)
    }

    /// Construction parameters.
    pub fn params(&self) -> &StreamParameters {
        &self.params
    }

    /// Input or output.
    pub fn direction(&self) -> Direction {
        self.params.direction
    }

    /// Microphone for input streams, speaker for output streams.
    pub fn terminal_type(&self) -> u32 {
        match self.params.direction {
            Direction::Input => TERMINAL_TYPE_MICROPHONE,
            Direction::Output => TERMINAL_TYPE_SPEAKER,
        }
    }

    /// First device channel (1-based).
    pub fn starting_channel(&self) -> u32 {
        self.params.starting_channel
    }

    /// Channels in the physical format.
    pub fn channel_count(&self) -> u32 {
        self.physical_format().channels_per_frame
    }

    /// Sample rate of the physical format.
    pub fn sample_rate(&self) -> f64 {
        self.physical_format().sample_rate
    }

    /// Whether the stream takes part in I/O.
    pub fn is_active(&self) -> bool {
        *self.is_active.read()
    }

    /// Enable or disable the stream.
    pub fn set_active(&self, active: bool) {
        if self.is_active() == active {
            return;
        }
        self.is_active.write(active);
        self.core.notify_property_changed(Selector::IS_ACTIVE);
    }

    /// Latency in frames.
    pub fn latency(&self) -> u32 {
        *self.latency.read()
    }

    /// Change latency through the configuration-change protocol.
    pub fn set_latency(&self, latency: u32) {
        if latency == self.latency() {
            return;
        }
        self.request_change(move |stream| {
            if latency != stream.latency() {
                stream.latency.write(latency);
            }
        });
    }

    /// Current physical format.
    pub fn physical_format(&self) -> StreamFormat {
        *self.physical_format.read()
    }

    /// Change the physical format.
    ///
    /// The format must match one of the available physical formats (any
    /// format is accepted if the list is empty). A format with a new sample
    /// rate also changes the device's nominal rate.
    pub fn set_physical_format(&self, format: StreamFormat) -> Result<()> {
        if format == self.physical_format() {
            return Ok(());
        }
        check_format(&self.available_physical_formats.read(), &format)?;

        self.request_change(move |stream| {
            if format == stream.physical_format() {
                return;
            }
            stream.physical_format.write(format);
            stream.forward_sample_rate(format.sample_rate);
        });
        Ok(())
    }

    /// Change only the sample rate of the physical format.
    pub fn set_physical_sample_rate(&self, rate: f64) -> Result<()> {
        self.set_physical_format(self.physical_format().with_sample_rate(rate))
    }

    /// Formats the physical format may take.
    pub fn available_physical_formats(&self) -> Vec<RangedFormat> {
        self.available_physical_formats.read_copy()
    }

    /// Replace the available physical formats.
    pub fn set_available_physical_formats(&self, formats: Vec<RangedFormat>) {
        self.request_change(move |stream| stream.available_physical_formats.write(formats));
    }

    /// Current virtual format.
    pub fn virtual_format(&self) -> StreamFormat {
        *self.virtual_format.read()
    }

    /// Change the virtual format. Same rules as
    /// [`set_physical_format`](Self::set_physical_format).
    pub fn set_virtual_format(&self, format: StreamFormat) -> Result<()> {
        if format == self.virtual_format() {
            return Ok(());
        }
        check_format(&self.available_virtual_formats.read(), &format)?;

        self.request_change(move |stream| {
            if format == stream.virtual_format() {
                return;
            }
            stream.virtual_format.write(format);
            stream.forward_sample_rate(format.sample_rate);
        });
        Ok(())
    }

    /// Change only the sample rate of the virtual format.
    pub fn set_virtual_sample_rate(&self, rate: f64) -> Result<()> {
        self.set_virtual_format(self.virtual_format().with_sample_rate(rate))
    }

    /// Formats the virtual format may take.
    pub fn available_virtual_formats(&self) -> Vec<RangedFormat> {
        self.available_virtual_formats.read_copy()
    }

    /// Replace the available virtual formats.
    pub fn set_available_virtual_formats(&self, formats: Vec<RangedFormat>) {
        self.request_change(move |stream| stream.available_virtual_formats.write(formats));
    }

    /// Bytes occupied by `frames` frames of the physical format, saturating
    /// at `u32::MAX`.
    pub fn frames_to_bytes(&self, frames: u32) -> u32 {
        frames.saturating_mul(self.physical_format().bytes_per_frame)
    }

    /// Whole frames that fit in `bytes` bytes of the physical format.
    pub fn bytes_to_frames(&self, bytes: u32) -> u32 {
        match self.physical_format().bytes_per_frame {
            0 => 0,
            bytes_per_frame => bytes / bytes_per_frame,
        }
    }

    /// Attach (or with `None`, detach) a mute control.
    pub fn attach_mute_control(&self, control: Option<Arc<MuteControl>>) {
        self.mute_control.write(control);
    }

    /// The attached mute control.
    pub fn mute_control(&self) -> Option<Arc<MuteControl>> {
        self.mute_control.read().clone()
    }

    /// Attach (or with `None`, detach) a volume control.
    pub fn attach_volume_control(&self, control: Option<Arc<VolumeControl>>) {
        self.volume_control.write(control);
    }

    /// The attached volume control.
    pub fn volume_control(&self) -> Option<Arc<VolumeControl>> {
        self.volume_control.read().clone()
    }

    /// Run attached controls over interleaved `frames`: volume, then mute.
    pub fn apply_processing(&self, frames: &mut [f32]) {
        if let Some(volume) = self.volume_control.read().as_ref() {
            volume.apply_processing(frames);
        }
        if let Some(mute) = self.mute_control.read().as_ref() {
            mute.apply_processing(frames);
        }
    }

    fn forward_sample_rate(&self, rate: f64) {
        if let Some(device) = self.device() {
            if let Err(err) = device.set_nominal_sample_rate(rate) {
                tracing::warn!(object_id = %self.core.id(), "Stream: device rejected {rate} Hz: {err}");
            }
        }
    }

    /// Run `change` via the owning device, or now if there is none.
    fn request_change(&self, change: impl FnOnce(&Stream) + Send + 'static) {
        let Some(device) = self.device() else {
            change(self);
            return;
        };

        let context = Arc::clone(self.core.context());
        let id = self.core.id();
        device.request_configuration_change(move |_| match context.find_as::<Stream>(id) {
            Some(stream) => change(&stream),
            None => tracing::warn!(object_id = %id, "Stream: gone before change was applied"),
        });
    }
}

fn check_format(available: &[RangedFormat], format: &StreamFormat) -> Result<()> {
    if available.is_empty() || available.iter().any(|r| r.format == *format) {
        Ok(())
    } else {
        Err(Error::UnsupportedValue(format!(
            "format {} Hz / {} ch is not available",
            format.sample_rate, format.channels_per_frame
        )))
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.core.id())
            .field("device", &self.device)
            .field("direction", &self.params.direction)
            .field("starting_channel", &self.params.starting_channel)
            .field("format", &self.physical_format())
            .finish_non_exhaustive()
    }
}
