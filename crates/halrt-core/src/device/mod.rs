//! Audio device: streams, controls, clients, and the I/O coordinator.
//!
//! A device splits its state by who touches it:
//!
//! - Attributes, stream and client lists live in [`VersionedCell`]s so the
//!   real-time thread reads them without waiting on control-thread writes.
//! - Structural changes (streams, controls, rates, formats) go through the
//!   configuration-change queue; see [`Device::request_configuration_change`].
//! - The start/stop count and the zero-timestamp model sit behind their own
//!   locks.

mod clock_model;
mod config_change;
mod io;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use halrt_registry::ObjectId;
use halrt_sync::VersionedCell;
use parking_lot::Mutex;
use rand::Rng;

pub use clock_model::ZeroTimestamp;
pub use io::{IoCycle, IoOperation, WillDo};

use crate::client::{Client, ClientInfo};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::format::{CHANNEL_LABEL_LEFT, ChannelDescription, Direction, ValueRange};
use crate::handler::{
    ControlRequestHandler, DefaultControlHandler, DefaultIoHandler, IoRequestHandler,
};
use crate::mute::{MuteControl, MuteControlParameters};
use crate::object::{ClassId, Object, ObjectCore, impl_object};
use crate::property::{Property, PropertyValue, Scope, Selector};
use crate::stream::{Stream, StreamParameters};
use crate::volume::{VolumeControl, VolumeControlParameters};

use clock_model::ClockModel;
use config_change::ConfigChangeQueue;

/// Transport type reported by every device.
pub const TRANSPORT_TYPE_VIRTUAL: u32 = u32::from_be_bytes(*b"virt");

/// Device construction parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceParameters {
    /// Human-readable name.
    pub name: String,
    /// Human-readable manufacturer.
    pub manufacturer: String,
    /// Persistent UID. Generated from `model_uid` when empty.
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
    /// Initial nominal sample rate.
    pub sample_rate: f64,
    /// Channel count used for new streams.
    pub channel_count: u32,
    /// Latency in frames.
    pub latency: u32,
    /// Safety offset in frames.
    pub safety_offset: u32,
    /// Frames between zero timestamps. 0 means one second of audio.
    pub zero_timestamp_period: u32,
    /// Whether the device clock is stable.
    pub clock_is_stable: bool,
    /// Clock domain; 0 means none.
    pub clock_domain: u32,
    /// Let the host mix client output before delivering it.
    pub enable_mixing: bool,
    /// Emit trace events from real-time entry points.
    pub enable_realtime_tracing: bool,
}

impl Default for DeviceParameters {
    fn default() -> Self {
        Self {
            name: "halrt Device".to_string(),
            manufacturer: "halrt".to_string(),
            device_uid: String::new(),
            model_uid: "halrt".to_string(),
            serial_number: String::new(),
            firmware_version: String::new(),
            can_be_default: true,
            can_be_default_for_system_sounds: true,
            sample_rate: 44100.0,
            channel_count: 2,
            latency: 0,
            safety_offset: 0,
            zero_timestamp_period: 0,
            clock_is_stable: true,
            clock_domain: 0,
            enable_mixing: true,
            enable_realtime_tracing: false,
        }
    }
}

/// Random UID suffix in `xxxx-xxxx-xxxx-xxxx` form.
fn generate_uid() -> String {
    let mut rng = rand::thread_rng();
    (0..4)
        .map(|_| format!("{:04x}", rng.r#gen::<u16>()))
        .collect::<Vec<_>>()
        .join("-")
}

/// An audio device.
pub struct Device {
    core: ObjectCore,
    params: DeviceParameters,
    device_uid: String,

    can_be_default: VersionedCell<bool>,
    can_be_default_for_system_sounds: VersionedCell<bool>,
    is_alive: VersionedCell<bool>,
    is_hidden: VersionedCell<bool>,
    is_running: VersionedCell<bool>,
    latency: VersionedCell<u32>,
    safety_offset: VersionedCell<u32>,
    zero_timestamp_period: VersionedCell<u32>,
    nominal_sample_rate: VersionedCell<f64>,
    available_sample_rates: VersionedCell<Option<Vec<ValueRange>>>,
    preferred_channel_count: VersionedCell<Option<u32>>,
    preferred_channels: VersionedCell<Option<Vec<ChannelDescription>>>,
    preferred_channels_for_stereo: VersionedCell<[u32; 2]>,

    control_handler: VersionedCell<Arc<dyn ControlRequestHandler>>,
    io_handler: VersionedCell<Arc<dyn IoRequestHandler>>,

    clients: VersionedCell<BTreeMap<u32, Arc<Client>>>,
    streams: VersionedCell<Vec<Arc<Stream>>>,
    mute_controls: VersionedCell<Vec<Arc<MuteControl>>>,
    volume_controls: VersionedCell<Vec<Arc<VolumeControl>>>,

    /// Streams per direction, counted once their deferred add has run.
    input_streams: AtomicU32,
    output_streams: AtomicU32,

    start_count: Mutex<u32>,
    clock: Mutex<ClockModel>,
    changes: ConfigChangeQueue,
}

fn require<T>(value: Option<T>, what: &'static str) -> Result<T> {
    value.ok_or(Error::IllegalOperation(what))
}

static PROPERTIES: &[Property<Device>] = &[
    Property::read_only(Selector::NAME, |d, _| Ok(PropertyValue::String(d.name().to_string()))),
    Property::read_only(Selector::MANUFACTURER, |d, _| {
        Ok(PropertyValue::String(d.manufacturer().to_string()))
    }),
    Property::read_only(Selector::DEVICE_UID, |d, _| {
        Ok(PropertyValue::String(d.device_uid().to_string()))
    }),
    Property::read_only(Selector::MODEL_UID, |d, _| {
        Ok(PropertyValue::String(d.model_uid().to_string()))
    }),
    Property::read_only(Selector::SERIAL_NUMBER, |d, _| {
        Ok(PropertyValue::String(d.params.serial_number.clone()))
    }),
    Property::read_only(Selector::FIRMWARE_VERSION, |d, _| {
        Ok(PropertyValue::String(d.params.firmware_version.clone()))
    }),
    Property::read_only(Selector::TRANSPORT_TYPE, |_, _| {
        Ok(PropertyValue::U32(TRANSPORT_TYPE_VIRTUAL))
    }),
    Property::read_only(Selector::CLOCK_DOMAIN, |d, _| {
        Ok(PropertyValue::U32(d.params.clock_domain))
    }),
    Property::read_only(Selector::CLOCK_IS_STABLE, |d, _| {
        Ok(PropertyValue::Bool(d.params.clock_is_stable))
    }),
    Property::read_only(Selector::DEVICE_IS_ALIVE, |d, _| Ok(PropertyValue::Bool(d.is_alive()))),
    Property::read_only(Selector::DEVICE_IS_RUNNING, |d, _| {
        Ok(PropertyValue::Bool(d.is_running()))
    }),
    Property::read_only(Selector::IS_HIDDEN, |d, _| Ok(PropertyValue::Bool(d.is_hidden()))),
    Property::read_only(Selector::CAN_BE_DEFAULT_DEVICE, |d, _| {
        Ok(PropertyValue::Bool(d.can_be_default()))
    }),
    Property::read_only(Selector::CAN_BE_DEFAULT_SYSTEM_DEVICE, |d, _| {
        Ok(PropertyValue::Bool(d.can_be_default_for_system_sounds()))
    }),
    Property::read_only(Selector::LATENCY, |d, _| Ok(PropertyValue::U32(d.latency()))),
    Property::read_only(Selector::SAFETY_OFFSET, |d, _| {
        Ok(PropertyValue::U32(d.safety_offset()))
    }),
    Property::read_only(Selector::ZERO_TIMESTAMP_PERIOD, |d, _| {
        Ok(PropertyValue::U32(d.zero_timestamp_period()))
    }),
    Property::settable(
        Selector::NOMINAL_SAMPLE_RATE,
        |d, _| Ok(PropertyValue::F64(d.nominal_sample_rate())),
        |d, _, value| d.set_nominal_sample_rate(require(value.as_f64(), "expected a rate")?),
    ),
    Property::read_only(Selector::AVAILABLE_NOMINAL_SAMPLE_RATES, |d, _| {
        Ok(PropertyValue::ValueRanges(d.available_sample_rates()))
    }),
    Property::read_only(Selector::STREAMS, |d, address| {
        Ok(PropertyValue::ObjectIds(
            d.core.owned_object_ids(address.scope, Some(ClassId::STREAM)),
        ))
    }),
    Property::read_only(Selector::CONTROL_LIST, |d, address| {
        Ok(PropertyValue::ObjectIds(
            d.core.owned_object_ids(address.scope, Some(ClassId::CONTROL)),
        ))
    }),
    Property::settable(
        Selector::PREFERRED_CHANNELS_FOR_STEREO,
        |d, _| Ok(PropertyValue::ChannelPair(d.preferred_channels_for_stereo())),
        |d, _, value| match value {
            PropertyValue::ChannelPair(pair) => {
                d.set_preferred_channels_for_stereo(pair);
                Ok(())
            }
            _ => Err(Error::IllegalOperation("expected a channel pair")),
        },
    ),
    Property::settable(
        Selector::PREFERRED_CHANNEL_LAYOUT,
        |d, _| Ok(PropertyValue::Channels(d.preferred_channels())),
        |d, _, value| match value {
            PropertyValue::Channels(channels) => {
                d.set_preferred_channels(channels);
                Ok(())
            }
            _ => Err(Error::IllegalOperation("expected channel descriptions")),
        },
    ),
];

impl_object!(Device, ClassId::DEVICE, PROPERTIES);

impl Device {
    /// Create a device with default handlers.
    pub fn new(context: &Arc<Context>, params: DeviceParameters) -> Arc<Self> {
        let device_uid = if params.device_uid.is_empty() {
            format!("{}:{}", params.model_uid, generate_uid())
        } else {
            params.device_uid.clone()
        };
        let zero_timestamp_period = match params.zero_timestamp_period {
            0 => params.sample_rate as u32,
            period => period,
        };

        Arc::new_cyclic(|this: &Weak<Self>| {
            let this: Weak<dyn Object> = this.clone();
            Self {
                core: ObjectCore::new(context, "Device", this),
                device_uid,
                can_be_default: VersionedCell::new(params.can_be_default),
                can_be_default_for_system_sounds: VersionedCell::new(
                    params.can_be_default_for_system_sounds,
                ),
                is_alive: VersionedCell::new(true),
                is_hidden: VersionedCell::new(false),
                is_running: VersionedCell::new(false),
                latency: VersionedCell::new(params.latency),
                safety_offset: VersionedCell::new(params.safety_offset),
                zero_timestamp_period: VersionedCell::new(zero_timestamp_period),
                nominal_sample_rate: VersionedCell::new(params.sample_rate),
                available_sample_rates: VersionedCell::new(None),
                preferred_channel_count: VersionedCell::new(None),
                preferred_channels: VersionedCell::new(None),
                preferred_channels_for_stereo: VersionedCell::new([1, 2]),
                control_handler: VersionedCell::new(Arc::new(DefaultControlHandler)),
                io_handler: VersionedCell::new(Arc::new(DefaultIoHandler)),
                clients: VersionedCell::new(BTreeMap::new()),
                streams: VersionedCell::new(Vec::new()),
                mute_controls: VersionedCell::new(Vec::new()),
                volume_controls: VersionedCell::new(Vec::new()),
                input_streams: AtomicU32::new(0),
                output_streams: AtomicU32::new(0),
                start_count: Mutex::new(0),
                clock: Mutex::new(ClockModel::default()),
                changes: ConfigChangeQueue::default(),
                params,
            }
        })
    }

    /// Construction parameters.
    pub fn params(&self) -> &DeviceParameters {
        &self.params
    }

    // ------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------

    /// Human-readable name.
    pub fn name(&self) -> &str {
        &self.params.name
    }

    /// Human-readable manufacturer.
    pub fn manufacturer(&self) -> &str {
        &self.params.manufacturer
    }

    /// Persistent UID.
    pub fn device_uid(&self) -> &str {
        &self.device_uid
    }

    /// Model UID.
    pub fn model_uid(&self) -> &str {
        &self.params.model_uid
    }

    /// Whether the device is usable.
    pub fn is_alive(&self) -> bool {
        *self.is_alive.read()
    }

    /// Mark the device alive or dead.
    pub fn set_alive(&self, alive: bool) {
        self.set_flag(&self.is_alive, alive, Selector::DEVICE_IS_ALIVE);
    }

    /// Whether the device is hidden from device lists.
    pub fn is_hidden(&self) -> bool {
        *self.is_hidden.read()
    }

    /// Hide or show the device.
    pub fn set_hidden(&self, hidden: bool) {
        self.set_flag(&self.is_hidden, hidden, Selector::IS_HIDDEN);
    }

    /// Whether the device may be the default device.
    pub fn can_be_default(&self) -> bool {
        *self.can_be_default.read()
    }

    /// Allow or forbid being the default device.
    pub fn set_can_be_default(&self, value: bool) {
        self.set_flag(&self.can_be_default, value, Selector::CAN_BE_DEFAULT_DEVICE);
    }

    /// Whether the device may be the default device for system sounds.
    pub fn can_be_default_for_system_sounds(&self) -> bool {
        *self.can_be_default_for_system_sounds.read()
    }

    /// Allow or forbid being the default device for system sounds.
    pub fn set_can_be_default_for_system_sounds(&self, value: bool) {
        self.set_flag(
            &self.can_be_default_for_system_sounds,
            value,
            Selector::CAN_BE_DEFAULT_SYSTEM_DEVICE,
        );
    }

    fn set_flag(&self, cell: &VersionedCell<bool>, value: bool, selector: Selector) {
        if *cell.read() == value {
            return;
        }
        cell.write(value);
        self.core.notify_property_changed(selector);
    }

    // ------------------------------------------------------------------
    // Timing
    // ------------------------------------------------------------------

    /// Latency in frames.
    pub fn latency(&self) -> u32 {
        *self.latency.read()
    }

    /// Change latency through the configuration-change protocol.
    pub fn set_latency(&self, latency: u32) {
        if latency == self.latency() {
            return;
        }
        self.request_configuration_change(move |device| device.latency.write(latency));
    }

    /// Safety offset in frames.
    pub fn safety_offset(&self) -> u32 {
        *self.safety_offset.read()
    }

    /// Change safety offset through the configuration-change protocol.
    pub fn set_safety_offset(&self, offset: u32) {
        if offset == self.safety_offset() {
            return;
        }
        self.request_configuration_change(move |device| device.safety_offset.write(offset));
    }

    /// Frames between zero timestamps.
    pub fn zero_timestamp_period(&self) -> u32 {
        *self.zero_timestamp_period.read()
    }

    /// Change the zero-timestamp period through the configuration-change
    /// protocol. Zero is rejected.
    pub fn set_zero_timestamp_period(&self, period: u32) -> Result<()> {
        if period == 0 {
            return Err(Error::UnsupportedValue(
                "zero timestamp period must be positive".to_string(),
            ));
        }
        if period == self.zero_timestamp_period() {
            return Ok(());
        }
        self.request_configuration_change(move |device| {
            device.zero_timestamp_period.write(period);
        });
        Ok(())
    }

    /// Nominal sample rate.
    pub fn nominal_sample_rate(&self) -> f64 {
        *self.nominal_sample_rate.read()
    }

    /// Change the nominal sample rate.
    ///
    /// Setting the current rate succeeds without a change. A rate outside
    /// every available range fails with [`Error::UnsupportedValue`].
    /// Otherwise the change is applied through the configuration-change
    /// protocol.
    pub fn set_nominal_sample_rate(&self, rate: f64) -> Result<()> {
        if rate == self.nominal_sample_rate() {
            return Ok(());
        }
        self.check_nominal_sample_rate(rate)?;

        self.request_configuration_change(move |device| {
            if rate != device.nominal_sample_rate() {
                tracing::info!(object_id = %device.id(), "Device: nominal rate now {rate} Hz");
                device.nominal_sample_rate.write(rate);
            }
        });
        Ok(())
    }

    /// Whether `rate` lies within an available range. An empty range list
    /// accepts any rate.
    pub fn check_nominal_sample_rate(&self, rate: f64) -> Result<()> {
        let ranges = self.available_sample_rates();
        if ranges.is_empty() || ranges.iter().any(|range| range.contains(rate)) {
            Ok(())
        } else {
            Err(Error::UnsupportedValue(format!(
                "sample rate {rate} Hz is not available"
            )))
        }
    }

    /// Available nominal sample rates. Defaults to exactly the nominal rate.
    pub fn available_sample_rates(&self) -> Vec<ValueRange> {
        match &*self.available_sample_rates.read() {
            Some(ranges) => ranges.clone(),
            None => vec![ValueRange::exact(self.nominal_sample_rate())],
        }
    }

    /// Replace the available sample rates.
    pub fn set_available_sample_rates(&self, ranges: Vec<ValueRange>) {
        self.request_configuration_change(move |device| {
            device.available_sample_rates.write(Some(ranges));
        });
    }

    // ------------------------------------------------------------------
    // Channels
    // ------------------------------------------------------------------

    /// Channel count for new streams.
    ///
    /// An explicit count wins, then the length of explicitly set preferred
    /// channels, then the construction parameter.
    pub fn preferred_channel_count(&self) -> u32 {
        if let Some(count) = *self.preferred_channel_count.read() {
            return count;
        }
        if let Some(channels) = &*self.preferred_channels.read() {
            if !channels.is_empty() {
                return channels.len() as u32;
            }
        }
        self.params.channel_count
    }

    /// Set the channel count for new streams.
    pub fn set_preferred_channel_count(&self, count: u32) {
        if *self.preferred_channel_count.read() == Some(count) {
            return;
        }
        self.request_configuration_change(move |device| {
            device.preferred_channel_count.write(Some(count));
        });
    }

    /// Preferred channel layout.
    ///
    /// Defaults to consecutive labels starting at left, one per preferred
    /// channel.
    pub fn preferred_channels(&self) -> Vec<ChannelDescription> {
        if let Some(channels) = &*self.preferred_channels.read() {
            return channels.clone();
        }
        (0..self.preferred_channel_count())
            .map(|n| ChannelDescription::labeled(CHANNEL_LABEL_LEFT + n))
            .collect()
    }

    /// Set the preferred channel layout. An equal layout is a no-op.
    pub fn set_preferred_channels(&self, channels: Vec<ChannelDescription>) {
        if self.preferred_channels() == channels {
            return;
        }
        self.request_configuration_change(move |device| {
            device.preferred_channels.write(Some(channels));
        });
    }

    /// Preferred stereo pair (1-based channel numbers).
    pub fn preferred_channels_for_stereo(&self) -> [u32; 2] {
        *self.preferred_channels_for_stereo.read()
    }

    /// Set the preferred stereo pair.
    pub fn set_preferred_channels_for_stereo(&self, pair: [u32; 2]) {
        if pair == self.preferred_channels_for_stereo() {
            return;
        }
        self.request_configuration_change(move |device| {
            device.preferred_channels_for_stereo.write(pair);
        });
    }

    // ------------------------------------------------------------------
    // Handlers
    // ------------------------------------------------------------------

    /// Install the control handler.
    pub fn set_control_handler(&self, handler: Arc<dyn ControlRequestHandler>) {
        self.control_handler.write(handler);
    }

    /// Current control handler.
    pub fn control_handler(&self) -> Arc<dyn ControlRequestHandler> {
        Arc::clone(&self.control_handler.read())
    }

    /// Install the I/O handler.
    pub fn set_io_handler(&self, handler: Arc<dyn IoRequestHandler>) {
        self.io_handler.write(handler);
    }

    /// Current I/O handler.
    pub fn io_handler(&self) -> Arc<dyn IoRequestHandler> {
        Arc::clone(&self.io_handler.read())
    }

    // ------------------------------------------------------------------
    // Clients
    // ------------------------------------------------------------------

    /// Attach a client.
    ///
    /// The control handler creates the tracked [`Client`]; if it fails the
    /// client is not added.
    pub fn add_client(&self, info: &ClientInfo) -> Result<Arc<Client>> {
        let client = self.control_handler().on_add_client(info).map_err(|err| {
            tracing::warn!(object_id = %self.id(), client_id = info.client_id, "Device: client rejected: {err}");
            Error::from(err)
        })?;

        self.clients
            .update(|clients| clients.insert(info.client_id, Arc::clone(&client)));
        tracing::info!(
            object_id = %self.id(),
            client_id = info.client_id,
            process_id = info.process_id,
            "Device: client added"
        );
        Ok(client)
    }

    /// Detach a client. Unknown ids fail with [`Error::IllegalOperation`].
    pub fn remove_client(&self, client_id: u32) -> Result<()> {
        let client = self
            .clients
            .update(|clients| clients.remove(&client_id))
            .ok_or_else(|| {
                tracing::warn!(object_id = %self.id(), client_id, "Device: unknown client");
                Error::IllegalOperation("client not found")
            })?;

        self.control_handler().on_remove_client(&client);
        tracing::info!(object_id = %self.id(), client_id, "Device: client removed");
        Ok(())
    }

    /// Number of attached clients.
    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Attached clients, ordered by id.
    pub fn clients(&self) -> Vec<Arc<Client>> {
        self.clients.read().values().cloned().collect()
    }

    /// Look up an attached client.
    pub fn client_by_id(&self, client_id: u32) -> Option<Arc<Client>> {
        self.clients.read().get(&client_id).cloned()
    }

    // ------------------------------------------------------------------
    // Streams
    // ------------------------------------------------------------------

    /// Add a stream with parameters derived from the device.
    ///
    /// The format uses the nominal rate and preferred channel count; the
    /// starting channel follows the last channel of existing streams in the
    /// same direction.
    pub fn add_stream(&self, direction: Direction) -> Arc<Stream> {
        let sample_rate = self.nominal_sample_rate();
        let channels = self.preferred_channel_count();

        self.insert_stream(|streams| {
            let starting_channel = streams
                .iter()
                .filter(|s| s.direction() == direction)
                .map(|s| s.starting_channel() + s.channel_count())
                .fold(1, u32::max);

            let defaults = StreamParameters::default();
            StreamParameters {
                direction,
                starting_channel,
                format: defaults
                    .format
                    .with_sample_rate(sample_rate)
                    .with_channels(channels),
                ..defaults
            }
        })
    }

    /// Add a stream with explicit parameters.
    pub fn add_stream_with_params(&self, params: StreamParameters) -> Arc<Stream> {
        self.insert_stream(|_| params)
    }

    /// Add a stream plus a volume and a mute control in the stream's scope,
    /// both attached to the stream.
    pub fn add_stream_with_controls(&self, direction: Direction) -> Arc<Stream> {
        let stream = self.add_stream(direction);
        self.attach_new_controls(&stream);
        stream
    }

    /// Same as [`add_stream_with_controls`](Self::add_stream_with_controls)
    /// with explicit stream parameters.
    pub fn add_stream_with_controls_and_params(&self, params: StreamParameters) -> Arc<Stream> {
        let stream = self.add_stream_with_params(params);
        self.attach_new_controls(&stream);
        stream
    }

    fn attach_new_controls(&self, stream: &Stream) {
        let scope = stream.direction().scope();
        let volume = self.add_volume_control(scope);
        let mute = self.add_mute_control(scope);
        stream.attach_volume_control(Some(volume));
        stream.attach_mute_control(Some(mute));
    }

    /// Create a stream, publish it to the synchronous list, and defer
    /// registering it as an owned object.
    fn insert_stream(&self, params: impl FnOnce(&[Arc<Stream>]) -> StreamParameters) -> Arc<Stream> {
        let context = self.core.context();
        let device = self.id();

        let stream = self.streams.update(|streams| {
            let stream = Stream::new(context, device, params(streams));
            streams.push(Arc::clone(&stream));
            stream
        });
        tracing::info!(
            object_id = %device,
            stream_id = %stream.id(),
            direction = %stream.direction(),
            "Device: stream added"
        );

        let owned = Arc::clone(&stream);
        self.request_configuration_change(move |device| {
            let direction = owned.direction();
            device.stream_counter(direction).fetch_add(1, Ordering::SeqCst);
            device.core.add_owned_object(owned, direction.scope());
        });
        stream
    }

    /// Remove a stream. Returns `false` if the stream is not on this device.
    pub fn remove_stream(&self, stream_id: ObjectId) -> bool {
        let removed = self.streams.update(|streams| {
            let index = streams.iter().position(|s| s.id() == stream_id)?;
            Some(streams.remove(index))
        });
        let Some(stream) = removed else {
            tracing::warn!(object_id = %self.id(), stream_id = %stream_id, "Device: no such stream");
            return false;
        };
        tracing::info!(object_id = %self.id(), stream_id = %stream_id, "Device: stream removed");

        self.request_configuration_change(move |device| {
            // An aborted add never counted the stream.
            if device.core.remove_owned_object(stream.id()) {
                device
                    .stream_counter(stream.direction())
                    .fetch_sub(1, Ordering::SeqCst);
            }
        });
        true
    }

    fn stream_counter(&self, direction: Direction) -> &AtomicU32 {
        match direction {
            Direction::Input => &self.input_streams,
            Direction::Output => &self.output_streams,
        }
    }

    /// Number of streams in `direction`.
    pub fn stream_count(&self, direction: Direction) -> usize {
        self.streams
            .read()
            .iter()
            .filter(|s| s.direction() == direction)
            .count()
    }

    /// The `index`-th stream in `direction`, in insertion order.
    pub fn stream_by_index(&self, direction: Direction, index: usize) -> Option<Arc<Stream>> {
        self.streams
            .read()
            .iter()
            .filter(|s| s.direction() == direction)
            .nth(index)
            .cloned()
    }

    /// Look up a stream of this device.
    pub fn stream_by_id(&self, stream_id: ObjectId) -> Option<Arc<Stream>> {
        self.streams
            .read()
            .iter()
            .find(|s| s.id() == stream_id)
            .cloned()
    }

    /// All streams, in insertion order.
    pub fn streams(&self) -> Vec<Arc<Stream>> {
        self.streams.read_copy()
    }

    // ------------------------------------------------------------------
    // Controls
    // ------------------------------------------------------------------

    /// Add an unmuted mute control in `scope`.
    pub fn add_mute_control(&self, scope: Scope) -> Arc<MuteControl> {
        self.add_mute_control_with_params(MuteControlParameters {
            scope,
            ..MuteControlParameters::default()
        })
    }

    /// Add a mute control with explicit parameters.
    pub fn add_mute_control_with_params(&self, params: MuteControlParameters) -> Arc<MuteControl> {
        let control = MuteControl::with_params(self.core.context(), params);
        self.mute_controls
            .update(|controls| controls.push(Arc::clone(&control)));
        tracing::info!(object_id = %self.id(), control_id = %control.id(), "Device: mute control added");

        let owned = Arc::clone(&control);
        self.request_configuration_change(move |device| {
            let scope = owned.scope();
            device.core.add_owned_object(owned, scope);
        });
        control
    }

    /// Remove a mute control. Returns `false` if it is not on this device.
    pub fn remove_mute_control(&self, control_id: ObjectId) -> bool {
        let removed = self.mute_controls.update(|controls| {
            let index = controls.iter().position(|c| c.id() == control_id)?;
            Some(controls.remove(index))
        });
        if removed.is_none() {
            return false;
        }
        tracing::info!(object_id = %self.id(), control_id = %control_id, "Device: mute control removed");

        self.request_configuration_change(move |device| {
            device.core.remove_owned_object(control_id);
        });
        true
    }

    /// Number of mute controls in `scope`. Global counts every scope.
    pub fn mute_control_count(&self, scope: Scope) -> usize {
        self.mute_controls
            .read()
            .iter()
            .filter(|c| scope.matches(c.scope()))
            .count()
    }

    /// The `index`-th mute control in `scope`.
    pub fn mute_control_by_index(&self, scope: Scope, index: usize) -> Option<Arc<MuteControl>> {
        self.mute_controls
            .read()
            .iter()
            .filter(|c| scope.matches(c.scope()))
            .nth(index)
            .cloned()
    }

    /// Add a full-volume control in `scope`.
    pub fn add_volume_control(&self, scope: Scope) -> Arc<VolumeControl> {
        self.add_volume_control_with_params(VolumeControlParameters {
            scope,
            ..VolumeControlParameters::default()
        })
    }

    /// Add a volume control with explicit parameters.
    pub fn add_volume_control_with_params(
        &self,
        params: VolumeControlParameters,
    ) -> Arc<VolumeControl> {
        let control = VolumeControl::with_params(self.core.context(), params);
        self.volume_controls
            .update(|controls| controls.push(Arc::clone(&control)));
        tracing::info!(object_id = %self.id(), control_id = %control.id(), "Device: volume control added");

        let owned = Arc::clone(&control);
        self.request_configuration_change(move |device| {
            let scope = owned.scope();
            device.core.add_owned_object(owned, scope);
        });
        control
    }

    /// Remove a volume control. Returns `false` if it is not on this device.
    pub fn remove_volume_control(&self, control_id: ObjectId) -> bool {
        let removed = self.volume_controls.update(|controls| {
            let index = controls.iter().position(|c| c.id() == control_id)?;
            Some(controls.remove(index))
        });
        if removed.is_none() {
            return false;
        }
        tracing::info!(object_id = %self.id(), control_id = %control_id, "Device: volume control removed");

        self.request_configuration_change(move |device| {
            device.core.remove_owned_object(control_id);
        });
        true
    }

    /// Number of volume controls in `scope`. Global counts every scope.
    pub fn volume_control_count(&self, scope: Scope) -> usize {
        self.volume_controls
            .read()
            .iter()
            .filter(|c| scope.matches(c.scope()))
            .count()
    }

    /// The `index`-th volume control in `scope`.
    pub fn volume_control_by_index(&self, scope: Scope, index: usize) -> Option<Arc<VolumeControl>> {
        self.volume_controls
            .read()
            .iter()
            .filter(|c| scope.matches(c.scope()))
            .nth(index)
            .cloned()
    }

    // ------------------------------------------------------------------
    // Configuration changes
    // ------------------------------------------------------------------

    /// Run `change` in a window the host grants.
    ///
    /// Without an attached host, or when called from inside a running
    /// change, `change` runs before this returns. Otherwise it is queued
    /// and the host is asked to schedule it.
    pub fn request_configuration_change(&self, change: impl FnOnce(&Device) + Send + 'static) {
        self.changes.request(self, Box::new(change));
    }

    /// Run queued change `request_id`. Unknown ids are logged and ignored.
    pub fn perform_configuration_change(&self, request_id: u64) {
        self.changes.perform(self, request_id);
    }

    /// Discard queued change `request_id` without running it.
    pub fn abort_configuration_change(&self, request_id: u64) {
        self.changes.abort(self, request_id);
    }

    /// Number of changes waiting for the host.
    pub fn pending_configuration_changes(&self) -> usize {
        self.changes.pending_count()
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.core.id())
            .field("uid", &self.device_uid)
            .field("sample_rate", &self.nominal_sample_rate())
            .field("streams", &self.streams.read().len())
            .field("clients", &self.client_count())
            .field("is_running", &self.is_running())
            .finish_non_exhaustive()
    }
}
