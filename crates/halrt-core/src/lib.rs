//! halrt Core - object model and I/O coordination for HAL audio plugins
//!
//! This crate is the runtime a user-space audio driver is built on: a tree
//! of host-addressable objects (plugin, devices, streams, controls), a
//! declarative property model, and the device-side machinery the host's
//! real-time I/O cycle talks to.
//!
//! # Core Abstractions
//!
//! ## Objects and properties
//!
//! - [`Object`] - Host-addressable object with a class and properties
//! - [`ObjectCore`] - State every object embeds (id, owner, owned objects)
//! - [`PropertyAddress`] / [`PropertyValue`] - Typed property access
//! - [`Context`] - Registry, host, and clock shared by one plugin instance
//!
//! ## Object tree
//!
//! - [`Plugin`] - Root object, always [`ObjectId::PLUGIN`]
//! - [`Device`] - Streams, controls, clients, start/stop, zero timestamps,
//!   and deferred configuration changes
//! - [`Stream`] - One direction of audio with physical and virtual formats
//! - [`MuteControl`] - Boolean control that silences a stream
//! - [`VolumeControl`] - Level control that scales a stream along a [`VolumeCurve`]
//!
//! ## Seams
//!
//! - [`Host`] - Calls back into the host
//! - [`HostClock`] - Host time source ([`MonotonicClock`], [`ManualClock`])
//! - [`DriverRequestHandler`] / [`ControlRequestHandler`] / [`IoRequestHandler`] - User hooks
//! - [`Driver`] - Routes host calls by object id
//!
//! # Threading
//!
//! Real-time entry points (`get_zero_timestamp`, `will_do_io_operation`,
//! `do_io_operation`) read state through [`halrt_sync::VersionedCell`] and
//! never wait on a control-thread writer. Structural changes are deferred
//! until the host grants a window.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use halrt_core::{
//!     Context, Device, DeviceParameters, Direction, Driver, Object, Plugin, PluginParameters,
//! };
//!
//! let context = Context::new();
//! let plugin = Plugin::new(&context, PluginParameters::default());
//! let device = Device::new(&context, DeviceParameters::default());
//! device.add_stream_with_controls(Direction::Output);
//! plugin.add_device(Arc::clone(&device));
//!
//! let driver = Driver::new(Arc::clone(&context), plugin);
//! driver.start_io(device.id(), 1).unwrap();
//! assert!(device.is_running());
//! ```

mod client;
mod clock;
mod context;
mod device;
pub mod dispatch;
mod driver;
mod error;
mod format;
mod handler;
mod host;
mod mute;
mod object;
mod plugin;
pub mod property;
mod stream;
mod volume;

pub use client::{Client, ClientInfo};
pub use clock::{HostClock, ManualClock, MonotonicClock};
pub use context::{Context, ContextBuilder};
pub use device::{
    Device, DeviceParameters, IoCycle, IoOperation, TRANSPORT_TYPE_VIRTUAL, WillDo, ZeroTimestamp,
};
pub use driver::Driver;
pub use error::{Error, HandlerError, Result, Status};
pub use format::{
    CHANNEL_LABEL_LEFT, ChannelDescription, Direction, FORMAT_FLAG_IS_BIG_ENDIAN,
    FORMAT_FLAG_IS_FLOAT, FORMAT_FLAG_IS_PACKED, FORMAT_FLAG_IS_SIGNED_INTEGER, FORMAT_LINEAR_PCM,
    RangedFormat, StreamFormat, ValueRange,
};
pub use handler::{
    ControlRequestHandler, DefaultControlHandler, DefaultDriverHandler, DefaultIoHandler,
    DriverRequestHandler, IoRequestHandler, IoTime,
};
pub use host::Host;
pub use mute::{MuteControl, MuteControlParameters};
pub use object::{ClassId, Object, ObjectCore};
pub use plugin::{Plugin, PluginParameters};
pub use property::{
    CustomPropertyInfo, CustomPropertyKind, ELEMENT_MAIN, PropertyAddress, PropertyValue, Scope,
    Selector,
};
pub use stream::{Stream, StreamParameters, TERMINAL_TYPE_MICROPHONE, TERMINAL_TYPE_SPEAKER};
pub use volume::{VolumeControl, VolumeControlParameters, VolumeCurve};

pub use halrt_registry::{ObjectId, RegistryOptions};
pub use halrt_sync::VersionedCell;
