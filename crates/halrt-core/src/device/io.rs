//! Start/stop reference counting and the real-time I/O entry points.
//!
//! Two locks guard this part of a device:
//!
//! - `start_count` (a plain mutex) serializes start/stop and is held across
//!   the control handler's start/stop hooks, so a second client never sees a
//!   half-started device.
//! - `clock` guards the zero-timestamp model. It is taken only for the few
//!   instructions that touch the model and never across a handler call.

use std::fmt;
use std::sync::atomic::Ordering;

use halrt_registry::ObjectId;

use super::{Device, ZeroTimestamp};
use crate::error::{Error, Result};
use crate::format::Direction;
use crate::handler::IoTime;
use crate::object::Object;
use crate::property::Selector;

/// Stage of the host's I/O cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoOperation {
    /// The I/O thread started or stopped.
    ThreadStateChange,
    /// A cycle is starting.
    CycleBegin,
    /// Read input from the device.
    ReadInput,
    /// Convert input to the client format.
    ConvertInput,
    /// Process input for one client.
    ProcessInput,
    /// Process output of one client.
    ProcessOutput,
    /// Mix or write output of one client.
    MixOutput,
    /// Process the mix of all clients.
    ProcessMix,
    /// Convert the mix to the device format.
    ConvertMix,
    /// Write the mix to the device.
    WriteMix,
    /// A cycle finished.
    CycleEnd,
}

impl IoOperation {
    /// Every operation, in cycle order.
    pub const ALL: [IoOperation; 11] = [
        IoOperation::ThreadStateChange,
        IoOperation::CycleBegin,
        IoOperation::ReadInput,
        IoOperation::ConvertInput,
        IoOperation::ProcessInput,
        IoOperation::ProcessOutput,
        IoOperation::MixOutput,
        IoOperation::ProcessMix,
        IoOperation::ConvertMix,
        IoOperation::WriteMix,
        IoOperation::CycleEnd,
    ];

    /// Four-character host code.
    pub const fn code(self) -> u32 {
        let code = match self {
            IoOperation::ThreadStateChange => b"thrd",
            IoOperation::CycleBegin => b"cycl",
            IoOperation::ReadInput => b"read",
            IoOperation::ConvertInput => b"cinp",
            IoOperation::ProcessInput => b"pinp",
            IoOperation::ProcessOutput => b"pout",
            IoOperation::MixOutput => b"mixo",
            IoOperation::ProcessMix => b"pmix",
            IoOperation::ConvertMix => b"cmix",
            IoOperation::WriteMix => b"rite",
            IoOperation::CycleEnd => b"cend",
        };
        u32::from_be_bytes(*code)
    }

    /// Operation for a host code, if recognized.
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.code() == code)
    }

    /// Whether the operation works on the input side.
    pub fn is_input(self) -> bool {
        matches!(
            self,
            IoOperation::ReadInput | IoOperation::ConvertInput | IoOperation::ProcessInput
        )
    }
}

impl fmt::Display for IoOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Sample times of the current cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IoCycle {
    /// Sample time input buffers correspond to.
    pub input_time: f64,
    /// Sample time output buffers correspond to.
    pub output_time: f64,
}

/// Answer to [`Device::will_do_io_operation`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WillDo {
    /// The device takes part in the operation.
    pub will_do: bool,
    /// The operation works on the buffer in place.
    pub in_place: bool,
}

impl WillDo {
    const fn yes() -> Self {
        Self {
            will_do: true,
            in_place: true,
        }
    }
}

impl Device {
    /// Whether at least one client has I/O running.
    pub fn is_running(&self) -> bool {
        *self.is_running.read()
    }

    /// Number of overlapping start requests.
    pub fn start_count(&self) -> u32 {
        *self.start_count.lock()
    }

    /// Start I/O for one client.
    ///
    /// Only the first start calls the control handler. If the handler fails
    /// the count stays unchanged and its error is returned. On success the
    /// clock restarts at the current host time.
    pub fn start_io(&self, client_id: u32) -> Result<()> {
        let mut count = self.start_count.lock();

        if *count > 0 {
            *count += 1;
            tracing::debug!(object_id = %self.id(), client_id, count = *count, "Device: start nested");
            return Ok(());
        }

        self.control_handler().on_start_io().map_err(|err| {
            tracing::warn!(object_id = %self.id(), client_id, "Device: start hook failed: {err}");
            Error::from(err)
        })?;

        let now = self.core.context().clock().now();
        self.clock.lock().reset(now);
        *count = 1;
        self.is_running.write(true);
        drop(count);

        tracing::info!(object_id = %self.id(), client_id, "Device: I/O started");
        self.core.notify_property_changed(Selector::DEVICE_IS_RUNNING);
        Ok(())
    }

    /// Stop I/O for one client.
    ///
    /// Only the last stop calls the control handler. A stop with nothing
    /// running is logged and ignored.
    pub fn stop_io(&self, client_id: u32) -> Result<()> {
        let mut count = self.start_count.lock();

        match *count {
            0 => {
                tracing::warn!(object_id = %self.id(), client_id, "Device: stop without start");
                Ok(())
            }
            1 => {
                self.control_handler().on_stop_io();
                *count = 0;
                self.is_running.write(false);
                drop(count);

                tracing::info!(object_id = %self.id(), client_id, "Device: I/O stopped");
                self.core.notify_property_changed(Selector::DEVICE_IS_RUNNING);
                Ok(())
            }
            _ => {
                *count -= 1;
                tracing::debug!(object_id = %self.id(), client_id, count = *count, "Device: stop nested");
                Ok(())
            }
        }
    }

    /// Advance the clock model to now and return the zero timestamp.
    pub fn get_zero_timestamp(&self) -> ZeroTimestamp {
        let clock = self.core.context().clock();
        let now = clock.now();
        let sample_rate = self.nominal_sample_rate();
        let period = self.zero_timestamp_period();

        let ts = self
            .clock
            .lock()
            .advance(now, sample_rate, period, clock.ticks_per_second());

        if self.params.enable_realtime_tracing {
            tracing::trace!(
                object_id = %self.id(),
                sample_time = ts.sample_time,
                host_time = ts.host_time,
                "Device: zero timestamp"
            );
        }
        ts
    }

    /// Whether the device takes part in `operation`.
    ///
    /// Input operations need an input stream. Client output goes through
    /// `MixOutput` when mixing is off; the mix goes through `ProcessMix`
    /// and `WriteMix` when it is on.
    pub fn will_do_io_operation(&self, operation: IoOperation) -> WillDo {
        let inputs = self.input_streams.load(Ordering::SeqCst);
        let outputs = self.output_streams.load(Ordering::SeqCst);
        let mixing = self.params.enable_mixing;

        let answer = match operation {
            IoOperation::ReadInput | IoOperation::ProcessInput if inputs > 0 => WillDo::yes(),
            IoOperation::MixOutput if outputs > 0 && !mixing => WillDo::yes(),
            IoOperation::ProcessMix | IoOperation::WriteMix if outputs > 0 && mixing => {
                WillDo::yes()
            }
            _ => WillDo::default(),
        };

        if self.params.enable_realtime_tracing {
            tracing::trace!(
                object_id = %self.id(),
                %operation,
                will_do = answer.will_do,
                in_place = answer.in_place,
                "Device: will do"
            );
        }
        answer
    }

    /// Host is about to perform `operation`. Nothing to prepare.
    pub fn begin_io_operation(&self, client_id: u32, operation: IoOperation, frame_count: u32) {
        if self.params.enable_realtime_tracing {
            tracing::trace!(object_id = %self.id(), client_id, %operation, frame_count, "Device: begin");
        }
    }

    /// Perform one I/O operation on `frames`.
    ///
    /// `client_id` may name no attached client; the handler then receives
    /// `None`. The stream must belong to this device. `frames` holds
    /// `frame_count` interleaved `f32` frames of the stream's channel count.
    /// The length is counted in samples, not in bytes of the physical
    /// format, so a 16-bit stream still takes an `f32` buffer.
    pub fn do_io_operation(
        &self,
        client_id: u32,
        stream_id: ObjectId,
        operation: IoOperation,
        frame_count: u32,
        cycle: &IoCycle,
        frames: &mut [f32],
    ) -> Result<()> {
        let tracing_enabled = self.params.enable_realtime_tracing;
        let zero_timestamp = self.clock.lock().current().sample_time;

        if tracing_enabled {
            tracing::trace!(
                object_id = %self.id(),
                %stream_id,
                client_id,
                %operation,
                frame_count,
                input_time = cycle.input_time,
                output_time = cycle.output_time,
                zero_timestamp,
                "Device: do"
            );
        }

        let client = self.client_by_id(client_id);
        if client.is_none() && tracing_enabled {
            tracing::trace!(object_id = %self.id(), client_id, "Device: client not found");
        }

        let Some(stream) = self.stream_by_id(stream_id) else {
            if tracing_enabled {
                tracing::trace!(object_id = %self.id(), %stream_id, "Device: stream not found");
            }
            return Err(Error::IllegalOperation("stream not found"));
        };

        let channel_count = stream.channel_count();
        let expected = frame_count as usize * channel_count as usize;
        if frames.len() != expected {
            return Err(Error::SizeMismatch {
                expected,
                actual: frames.len(),
            });
        }

        let time = IoTime {
            zero_timestamp,
            timestamp: match stream.direction() {
                Direction::Input => cycle.input_time,
                Direction::Output => cycle.output_time,
            },
        };
        let handler = self.io_handler();
        let client = client.as_ref();

        match operation {
            IoOperation::ReadInput => {
                handler.on_read_client_input(client, &stream, time, frames);
            }
            IoOperation::ProcessInput => {
                handler.on_process_client_input(client, &stream, time, frames, channel_count);
            }
            IoOperation::MixOutput => {
                handler.on_process_client_output(client, &stream, time, frames, channel_count);
                handler.on_write_client_output(client, &stream, time, frames, channel_count);
            }
            IoOperation::ProcessMix => {
                handler.on_process_mixed_output(&stream, time, frames, channel_count);
            }
            IoOperation::WriteMix => {
                handler.on_write_mixed_output(&stream, time, frames);
            }
            _ => {}
        }
        Ok(())
    }

    /// Host finished `operation`. Nothing to clean up.
    pub fn end_io_operation(&self, client_id: u32, operation: IoOperation, frame_count: u32) {
        if self.params.enable_realtime_tracing {
            tracing::trace!(object_id = %self.id(), client_id, %operation, frame_count, "Device: end");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_codes_round_trip() {
        for op in IoOperation::ALL {
            assert_eq!(IoOperation::from_code(op.code()), Some(op));
        }
        assert_eq!(IoOperation::from_code(0), None);
        assert_eq!(IoOperation::WriteMix.code(), u32::from_be_bytes(*b"rite"));
    }

    #[test]
    fn input_side() {
        assert!(IoOperation::ReadInput.is_input());
        assert!(IoOperation::ProcessInput.is_input());
        assert!(!IoOperation::MixOutput.is_input());
        assert!(!IoOperation::CycleBegin.is_input());
    }
}
