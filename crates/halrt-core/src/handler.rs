//! User hooks invoked by the driver and by devices.
//!
//! The driver asks a [`DriverRequestHandler`] before it accepts a host. A
//! device forwards control requests (start/stop, client attach/detach) to
//! a [`ControlRequestHandler`] and real-time I/O to an [`IoRequestHandler`].
//! Every trait has working defaults, so a device with no handlers installed
//! runs a silent cycle.

use std::sync::Arc;

use crate::client::{Client, ClientInfo};
use crate::error::HandlerError;
use crate::stream::Stream;

/// Driver-level hooks.
pub trait DriverRequestHandler: Send + Sync {
    /// The host is initializing the driver. Failing rejects the host.
    fn on_initialize(&self) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// Control-thread hooks.
pub trait ControlRequestHandler: Send + Sync {
    /// First client started I/O. Failing leaves the device stopped.
    fn on_start_io(&self) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Last client stopped I/O.
    fn on_stop_io(&self) {}

    /// A client attached. Return the client object to track.
    fn on_add_client(&self, info: &ClientInfo) -> Result<Arc<Client>, HandlerError> {
        Ok(Arc::new(Client::new(info.clone())))
    }

    /// A client detached.
    fn on_remove_client(&self, _client: &Arc<Client>) {}
}

/// Timing of one I/O operation, in device samples.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IoTime {
    /// Sample time of the current zero timestamp.
    pub zero_timestamp: f64,
    /// Sample time the buffer corresponds to.
    pub timestamp: f64,
}

/// Real-time hooks.
///
/// Buffers are interleaved `f32` frames, `frames.len() ==
/// frame_count * channel_count`, whatever the stream's physical format.
/// Converting between `f32` and an integer physical format is left to the
/// handler. Implementations must not block.
#[allow(unused_variables)]
pub trait IoRequestHandler: Send + Sync {
    /// Fill `frames` with input for `client`. Defaults to silence.
    fn on_read_client_input(
        &self,
        client: Option<&Arc<Client>>,
        stream: &Arc<Stream>,
        time: IoTime,
        frames: &mut [f32],
    ) {
        frames.fill(0.0);
    }

    /// Post-process input before it reaches `client`.
    fn on_process_client_input(
        &self,
        client: Option<&Arc<Client>>,
        stream: &Arc<Stream>,
        time: IoTime,
        frames: &mut [f32],
        channel_count: u32,
    ) {
        stream.apply_processing(frames);
    }

    /// Pre-process output from `client` before it is written.
    fn on_process_client_output(
        &self,
        client: Option<&Arc<Client>>,
        stream: &Arc<Stream>,
        time: IoTime,
        frames: &mut [f32],
        channel_count: u32,
    ) {
        stream.apply_processing(frames);
    }

    /// Consume output from `client`. Used when mixing is disabled.
    fn on_write_client_output(
        &self,
        client: Option<&Arc<Client>>,
        stream: &Arc<Stream>,
        time: IoTime,
        frames: &[f32],
        channel_count: u32,
    ) {
    }

    /// Process the mix of all clients.
    fn on_process_mixed_output(
        &self,
        stream: &Arc<Stream>,
        time: IoTime,
        frames: &mut [f32],
        channel_count: u32,
    ) {
        stream.apply_processing(frames);
    }

    /// Consume the mix of all clients. Used when mixing is enabled.
    fn on_write_mixed_output(&self, stream: &Arc<Stream>, time: IoTime, frames: &[f32]) {}
}

/// Driver handler that accepts every host.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDriverHandler;

impl DriverRequestHandler for DefaultDriverHandler {}

/// Control handler that accepts every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultControlHandler;

impl ControlRequestHandler for DefaultControlHandler {}

/// I/O handler with the default behavior for every hook.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultIoHandler;

impl IoRequestHandler for DefaultIoHandler {}
