//! Integration tests for devices, the configuration-change protocol, and the
//! driver entry points.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use halrt_core::{
    CHANNEL_LABEL_LEFT, ChannelDescription, ClassId, Client, ClientInfo, Context,
    ControlRequestHandler, CustomPropertyKind, DefaultDriverHandler, Device, DeviceParameters,
    Direction, Driver, DriverRequestHandler, Error, HandlerError, Host, IoCycle, IoOperation,
    IoRequestHandler, IoTime, ManualClock, Object, ObjectId, Plugin, PluginParameters,
    PropertyAddress, PropertyValue, RangedFormat, Scope, Selector, Stream, StreamFormat,
    ValueRange, WillDo,
};
use parking_lot::Mutex;

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Host that records every callback and never answers on its own.
#[derive(Default)]
struct RecordingHost {
    requests: Mutex<Vec<(ObjectId, u64)>>,
    notifications: Mutex<Vec<(ObjectId, Selector)>>,
}

impl RecordingHost {
    fn requests(&self) -> Vec<(ObjectId, u64)> {
        self.requests.lock().clone()
    }

    fn notified(&self, object_id: ObjectId, selector: Selector) -> bool {
        self.notifications
            .lock()
            .iter()
            .any(|&(id, s)| id == object_id && s == selector)
    }
}

impl Host for RecordingHost {
    fn properties_changed(&self, object_id: ObjectId, addresses: &[PropertyAddress]) {
        let mut notifications = self.notifications.lock();
        for address in addresses {
            notifications.push((object_id, address.selector));
        }
    }

    fn request_device_configuration_change(&self, device_id: ObjectId, request_id: u64) {
        self.requests.lock().push((device_id, request_id));
    }
}

#[derive(Default)]
struct CountingControl {
    starts: AtomicUsize,
    stops: AtomicUsize,
    fail_start: AtomicBool,
    removed_clients: Mutex<Vec<u32>>,
}

impl ControlRequestHandler for CountingControl {
    fn on_start_io(&self) -> Result<(), HandlerError> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(HandlerError::new("hardware unavailable"));
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_stop_io(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn on_add_client(&self, info: &ClientInfo) -> Result<Arc<Client>, HandlerError> {
        if info.process_id < 0 {
            return Err(HandlerError::new("bad process"));
        }
        Ok(Arc::new(Client::new(info.clone())))
    }

    fn on_remove_client(&self, client: &Arc<Client>) {
        self.removed_clients.lock().push(client.id());
    }
}

struct RejectingDriver;

impl DriverRequestHandler for RejectingDriver {
    fn on_initialize(&self) -> Result<(), HandlerError> {
        Err(HandlerError::new("license check failed"))
    }
}

#[derive(Debug, Clone, PartialEq)]
struct IoCall {
    hook: &'static str,
    has_client: bool,
    time: IoTime,
    len: usize,
}

#[derive(Default)]
struct RecordingIo {
    calls: Mutex<Vec<IoCall>>,
}

impl RecordingIo {
    fn record(&self, hook: &'static str, client: Option<&Arc<Client>>, time: IoTime, len: usize) {
        self.calls.lock().push(IoCall {
            hook,
            has_client: client.is_some(),
            time,
            len,
        });
    }

    fn hooks(&self) -> Vec<&'static str> {
        self.calls.lock().iter().map(|c| c.hook).collect()
    }
}

impl IoRequestHandler for RecordingIo {
    fn on_read_client_input(
        &self,
        client: Option<&Arc<Client>>,
        _stream: &Arc<Stream>,
        time: IoTime,
        frames: &mut [f32],
    ) {
        self.record("read_client_input", client, time, frames.len());
        frames.fill(0.25);
    }

    fn on_process_client_output(
        &self,
        client: Option<&Arc<Client>>,
        _stream: &Arc<Stream>,
        time: IoTime,
        frames: &mut [f32],
        _channel_count: u32,
    ) {
        self.record("process_client_output", client, time, frames.len());
    }

    fn on_write_client_output(
        &self,
        client: Option<&Arc<Client>>,
        _stream: &Arc<Stream>,
        time: IoTime,
        frames: &[f32],
        _channel_count: u32,
    ) {
        self.record("write_client_output", client, time, frames.len());
    }

    fn on_write_mixed_output(&self, _stream: &Arc<Stream>, time: IoTime, frames: &[f32]) {
        self.record("write_mixed_output", None, time, frames.len());
    }
}

fn device_with(params: DeviceParameters) -> (Arc<Context>, Arc<Device>) {
    let context = Context::new();
    let device = Device::new(&context, params);
    (context, device)
}

fn default_device() -> (Arc<Context>, Arc<Device>) {
    device_with(DeviceParameters::default())
}

fn global(selector: Selector) -> PropertyAddress {
    PropertyAddress::global(selector)
}

// ---------------------------------------------------------------------------
// Start / stop
// ---------------------------------------------------------------------------

#[test]
fn start_stop_hooks_run_on_edges_only() {
    let (_context, device) = default_device();
    let control = Arc::new(CountingControl::default());
    device.set_control_handler(control.clone());

    for client in 1..=3 {
        device.start_io(client).unwrap();
    }
    assert_eq!(control.starts.load(Ordering::SeqCst), 1);
    assert_eq!(device.start_count(), 3);
    assert!(device.is_running());

    device.stop_io(1).unwrap();
    device.stop_io(2).unwrap();
    assert_eq!(control.stops.load(Ordering::SeqCst), 0);
    assert!(device.is_running());

    device.stop_io(3).unwrap();
    assert_eq!(control.stops.load(Ordering::SeqCst), 1);
    assert_eq!(device.start_count(), 0);
    assert!(!device.is_running());
}

#[test]
fn failed_start_leaves_device_stopped() {
    let (_context, device) = default_device();
    let control = Arc::new(CountingControl::default());
    control.fail_start.store(true, Ordering::SeqCst);
    device.set_control_handler(control.clone());

    let err = device.start_io(1).unwrap_err();
    assert!(matches!(err, Error::Handler(_)));
    assert_eq!(device.start_count(), 0);
    assert!(!device.is_running());

    control.fail_start.store(false, Ordering::SeqCst);
    device.start_io(1).unwrap();
    assert_eq!(device.start_count(), 1);
    assert_eq!(control.starts.load(Ordering::SeqCst), 1);
}

#[test]
fn unpaired_stop_is_ignored() {
    let (_context, device) = default_device();
    let control = Arc::new(CountingControl::default());
    device.set_control_handler(control.clone());

    device.stop_io(7).unwrap();
    assert_eq!(control.stops.load(Ordering::SeqCst), 0);
    assert_eq!(device.start_count(), 0);
}

#[test]
fn running_flag_is_reported_to_host() {
    let (context, device) = default_device();
    let host = Arc::new(RecordingHost::default());
    context.attach_host(host.clone());

    device.start_io(1).unwrap();
    assert!(host.notified(device.id(), Selector::DEVICE_IS_RUNNING));
    assert_eq!(
        device
            .get_property(&global(Selector::DEVICE_IS_RUNNING), 4)
            .unwrap(),
        PropertyValue::Bool(true)
    );
}

#[test]
fn concurrent_start_stop_balances_hooks() {
    let (_context, device) = default_device();
    let control = Arc::new(CountingControl::default());
    device.set_control_handler(control.clone());

    thread::scope(|s| {
        for client in 0..8 {
            let device = &device;
            s.spawn(move || {
                for _ in 0..100 {
                    device.start_io(client).unwrap();
                    device.stop_io(client).unwrap();
                }
            });
        }
    });

    assert!(!device.is_running());
    assert_eq!(device.start_count(), 0);
    assert_eq!(
        control.starts.load(Ordering::SeqCst),
        control.stops.load(Ordering::SeqCst)
    );
    assert!(control.starts.load(Ordering::SeqCst) >= 1);
}

// ---------------------------------------------------------------------------
// Zero timestamps
// ---------------------------------------------------------------------------

/// 48 MHz host clock: 1000 ticks per frame at 48 kHz.
fn clocked_device(period: u32) -> (Arc<ManualClock>, Arc<Device>) {
    let clock = Arc::new(ManualClock::new(48_000_000.0));
    let context = Context::builder().clock(clock.clone()).build();
    let device = Device::new(
        &context,
        DeviceParameters {
            sample_rate: 48000.0,
            zero_timestamp_period: period,
            ..DeviceParameters::default()
        },
    );
    // The device keeps its context alive.
    (clock, device)
}

#[test]
fn zero_timestamp_period_defaults_to_sample_rate() {
    let (_context, device) = default_device();
    assert_eq!(device.zero_timestamp_period(), 44100);

    let (_clock, device) = clocked_device(512);
    assert_eq!(device.zero_timestamp_period(), 512);
}

#[test]
fn zero_timestamp_advances_in_whole_periods() {
    let (clock, device) = clocked_device(480);
    clock.set(1_000);
    device.start_io(1).unwrap();

    let ts = device.get_zero_timestamp();
    assert_eq!(ts.sample_time, 0.0);
    assert_eq!(ts.host_time, 1_000);
    assert_eq!(ts.seed, 1);

    clock.advance(479_999);
    assert_eq!(device.get_zero_timestamp().sample_time, 0.0);

    clock.advance(1);
    let ts = device.get_zero_timestamp();
    assert_eq!(ts.sample_time, 480.0);
    assert_eq!(ts.host_time, 481_000);
}

#[test]
fn zero_timestamp_is_monotonic_under_jitter() {
    let (clock, device) = clocked_device(256);
    device.start_io(1).unwrap();

    let mut last = device.get_zero_timestamp();
    for step in [3_000_u64, 250_000, 7, 1_000_000, 0, 256_000, 999] {
        clock.advance(step);
        let ts = device.get_zero_timestamp();
        assert!(ts.sample_time >= last.sample_time);
        assert!(ts.host_time >= last.host_time);
        assert!(ts.sample_time - last.sample_time <= 256.0);
        assert_eq!(ts.sample_time % 256.0, 0.0);
        last = ts;
    }
}

#[test]
fn restart_resets_anchor() {
    let (clock, device) = clocked_device(480);
    device.start_io(1).unwrap();
    clock.advance(480_000);
    assert_eq!(device.get_zero_timestamp().sample_time, 480.0);
    device.stop_io(1).unwrap();

    clock.advance(5_000_000);
    device.start_io(1).unwrap();
    let ts = device.get_zero_timestamp();
    assert_eq!(ts.sample_time, 0.0);
    assert_eq!(ts.host_time, 5_480_000);
}

// ---------------------------------------------------------------------------
// Configuration changes
// ---------------------------------------------------------------------------

fn hosted_device() -> (Arc<Context>, Arc<RecordingHost>, Arc<Device>) {
    let (context, device) = default_device();
    let host = Arc::new(RecordingHost::default());
    context.attach_host(host.clone());
    (context, host, device)
}

#[test]
fn changes_run_in_place_without_host() {
    let (_context, device) = default_device();
    device.set_latency(64);
    assert_eq!(device.latency(), 64);
    assert_eq!(device.pending_configuration_changes(), 0);

    let stream = device.add_stream(Direction::Output);
    assert_eq!(
        device.core().owned_object_ids(Scope::Output, None),
        vec![stream.id()]
    );
    assert!(device.will_do_io_operation(IoOperation::WriteMix).will_do);
}

#[test]
fn changes_wait_for_host() {
    let (_context, host, device) = hosted_device();

    device.set_latency(64);
    assert_eq!(device.latency(), 0);
    assert_eq!(device.pending_configuration_changes(), 1);
    assert_eq!(host.requests(), vec![(device.id(), 0)]);

    device.perform_configuration_change(0);
    assert_eq!(device.latency(), 64);
    assert_eq!(device.pending_configuration_changes(), 0);
}

#[test]
fn request_ids_are_fresh_and_performed_in_any_order() {
    let (_context, host, device) = hosted_device();

    device.set_latency(10);
    device.set_safety_offset(20);
    device.set_preferred_channels_for_stereo([3, 4]);
    let ids: Vec<u64> = host.requests().iter().map(|&(_, id)| id).collect();
    assert_eq!(ids, vec![0, 1, 2]);

    device.perform_configuration_change(2);
    assert_eq!(device.preferred_channels_for_stereo(), [3, 4]);
    assert_eq!(device.latency(), 0);

    device.perform_configuration_change(0);
    device.perform_configuration_change(1);
    assert_eq!(device.latency(), 10);
    assert_eq!(device.safety_offset(), 20);
}

#[test]
fn aborted_change_never_runs() {
    let (_context, host, device) = hosted_device();

    device.set_latency(99);
    let (_, request_id) = host.requests()[0];
    device.abort_configuration_change(request_id);
    assert_eq!(device.pending_configuration_changes(), 0);

    device.perform_configuration_change(request_id);
    assert_eq!(device.latency(), 0);
}

#[test]
fn unknown_and_repeated_performs_are_tolerated() {
    let (_context, _host, device) = hosted_device();

    device.perform_configuration_change(12345);
    device.set_latency(5);
    device.perform_configuration_change(0);
    device.perform_configuration_change(0);
    assert_eq!(device.latency(), 5);
}

#[test]
fn nested_request_runs_inside_callback() {
    let (_context, host, device) = hosted_device();

    device.request_configuration_change(|device| {
        device.set_latency(32);
        assert_eq!(device.latency(), 32);
    });
    assert_eq!(host.requests().len(), 1);

    device.perform_configuration_change(0);
    assert_eq!(device.latency(), 32);
    assert_eq!(host.requests().len(), 1);
    assert_eq!(device.pending_configuration_changes(), 0);

    device.set_latency(48);
    assert_eq!(host.requests().len(), 2);
}

#[test]
fn added_stream_is_visible_before_it_is_owned() {
    let (_context, host, device) = hosted_device();

    let stream = device.add_stream(Direction::Input);
    assert_eq!(device.stream_count(Direction::Input), 1);
    assert!(device.stream_by_id(stream.id()).is_some());
    assert!(
        device
            .core()
            .owned_object_ids(Scope::Input, Some(ClassId::STREAM))
            .is_empty()
    );
    assert_eq!(
        device.will_do_io_operation(IoOperation::ReadInput),
        WillDo::default()
    );

    let (_, request_id) = host.requests()[0];
    device.perform_configuration_change(request_id);
    assert_eq!(
        device
            .get_property(&PropertyAddress::scoped(Selector::STREAMS, Scope::Input), 64)
            .unwrap(),
        PropertyValue::ObjectIds(vec![stream.id()])
    );
    assert!(device.will_do_io_operation(IoOperation::ReadInput).will_do);
    assert_eq!(stream.core().owner_id(), device.id());
    assert!(host.notified(device.id(), Selector::OWNED_OBJECTS));
}

#[test]
fn removed_stream_leaves_io_after_change() {
    let (_context, host, device) = hosted_device();
    let stream = device.add_stream(Direction::Output);
    device.perform_configuration_change(0);
    assert!(device.will_do_io_operation(IoOperation::WriteMix).will_do);

    assert!(device.remove_stream(stream.id()));
    assert!(!device.remove_stream(stream.id()));
    assert_eq!(device.stream_count(Direction::Output), 0);
    assert!(device.will_do_io_operation(IoOperation::WriteMix).will_do);

    let (_, request_id) = host.requests()[1];
    device.perform_configuration_change(request_id);
    assert!(!device.will_do_io_operation(IoOperation::WriteMix).will_do);
    assert!(device.core().owned_object_ids(Scope::Global, None).is_empty());
}

#[test]
fn removing_stream_whose_add_was_aborted() {
    let (_context, host, device) = hosted_device();
    let stream = device.add_stream(Direction::Input);
    device.abort_configuration_change(0);

    assert!(device.remove_stream(stream.id()));
    assert_eq!(host.requests()[1].1, 1);
    device.perform_configuration_change(1);
    assert_eq!(device.stream_count(Direction::Input), 0);
    assert_eq!(
        device.will_do_io_operation(IoOperation::ReadInput),
        WillDo::default()
    );
    assert_eq!(
        device.will_do_io_operation(IoOperation::ProcessInput),
        WillDo::default()
    );

    device.add_stream(Direction::Input);
    device.perform_configuration_change(2);
    assert!(device.will_do_io_operation(IoOperation::ReadInput).will_do);
}

// ---------------------------------------------------------------------------
// Sample rates and channels
// ---------------------------------------------------------------------------

#[test]
fn nominal_rate_checks_available_rates() {
    let (_context, device) = default_device();
    assert_eq!(
        device.available_sample_rates(),
        vec![ValueRange::exact(44100.0)]
    );

    device.set_available_sample_rates(vec![ValueRange::exact(44100.0), ValueRange::exact(48000.0)]);
    device.set_nominal_sample_rate(44100.0).unwrap();
    device.set_nominal_sample_rate(48000.0).unwrap();
    assert_eq!(device.nominal_sample_rate(), 48000.0);

    let err = device.set_nominal_sample_rate(96000.0).unwrap_err();
    assert!(matches!(err, Error::UnsupportedValue(_)));
    assert_eq!(device.nominal_sample_rate(), 48000.0);
}

#[test]
fn empty_rate_list_accepts_any_rate() {
    let (_context, device) = default_device();
    device.set_available_sample_rates(Vec::new());
    device.set_nominal_sample_rate(22050.0).unwrap();
    assert_eq!(device.nominal_sample_rate(), 22050.0);
}

#[test]
fn nominal_rate_property_is_settable() {
    let (_context, host, device) = hosted_device();
    device.set_available_sample_rates(vec![ValueRange::new(8000.0, 96000.0)]);
    device.perform_configuration_change(0);

    let address = global(Selector::NOMINAL_SAMPLE_RATE);
    assert!(device.is_property_settable(&address).unwrap());
    device
        .set_property(&address, PropertyValue::F64(48000.0))
        .unwrap();
    assert_eq!(device.nominal_sample_rate(), 44100.0);

    device.perform_configuration_change(1);
    assert_eq!(
        device.get_property(&address, 8).unwrap(),
        PropertyValue::F64(48000.0)
    );
    assert_eq!(host.requests().len(), 2);
}

#[test]
fn stream_rate_change_reaches_device() {
    let (_context, device) = default_device();
    device.set_available_sample_rates(vec![ValueRange::exact(44100.0), ValueRange::exact(48000.0)]);
    let stream = device.add_stream(Direction::Output);
    let format = stream.physical_format();
    stream.set_available_physical_formats(vec![
        RangedFormat::exact(format),
        RangedFormat::exact(format.with_sample_rate(48000.0)),
    ]);

    stream.set_physical_sample_rate(48000.0).unwrap();
    assert_eq!(stream.sample_rate(), 48000.0);
    assert_eq!(device.nominal_sample_rate(), 48000.0);
}

#[test]
fn preferred_channels_default_from_channel_count() {
    let (_context, device) = device_with(DeviceParameters {
        channel_count: 4,
        ..DeviceParameters::default()
    });
    assert_eq!(device.preferred_channel_count(), 4);
    let labels: Vec<u32> = device.preferred_channels().iter().map(|c| c.label).collect();
    assert_eq!(
        labels,
        (0..4).map(|n| CHANNEL_LABEL_LEFT + n).collect::<Vec<_>>()
    );
    assert_eq!(device.preferred_channels_for_stereo(), [1, 2]);

    device.set_preferred_channels(vec![ChannelDescription::labeled(CHANNEL_LABEL_LEFT); 6]);
    assert_eq!(device.preferred_channel_count(), 6);

    device.set_preferred_channel_count(3);
    assert_eq!(device.preferred_channel_count(), 3);
}

#[test]
fn channel_layout_property_compares_coordinates() {
    let (_context, host, device) = hosted_device();
    let mut layout = device.preferred_channels();
    layout[1].coordinates[2] = 1.5;

    device
        .set_property(
            &global(Selector::PREFERRED_CHANNEL_LAYOUT),
            PropertyValue::Channels(layout.clone()),
        )
        .unwrap();
    assert_eq!(host.requests().len(), 1);
    device.perform_configuration_change(0);
    assert_eq!(device.preferred_channels(), layout);

    device
        .set_property(
            &global(Selector::PREFERRED_CHANNEL_LAYOUT),
            PropertyValue::Channels(layout),
        )
        .unwrap();
    assert_eq!(host.requests().len(), 1);
}

// ---------------------------------------------------------------------------
// Streams and controls
// ---------------------------------------------------------------------------

#[test]
fn default_streams_follow_each_other() {
    let (_context, device) = default_device();
    device.set_available_sample_rates(vec![ValueRange::new(8000.0, 192000.0)]);
    device.set_nominal_sample_rate(48000.0).unwrap();

    let first = device.add_stream(Direction::Output);
    let second = device.add_stream(Direction::Output);
    let input = device.add_stream(Direction::Input);

    assert_eq!(first.starting_channel(), 1);
    assert_eq!(second.starting_channel(), 3);
    assert_eq!(input.starting_channel(), 1);
    assert_eq!(first.sample_rate(), 48000.0);
    assert_eq!(first.channel_count(), 2);
    assert_eq!(first.device_id(), device.id());
    assert!(Arc::ptr_eq(&first.device().unwrap(), &device));

    assert_eq!(device.stream_count(Direction::Output), 2);
    assert!(Arc::ptr_eq(
        &device.stream_by_index(Direction::Output, 1).unwrap(),
        &second
    ));
    assert!(device.stream_by_index(Direction::Input, 1).is_none());
}

#[test]
fn stream_with_controls_gets_volume_and_mute() {
    let (_context, device) = default_device();
    let stream = device.add_stream_with_controls(Direction::Output);
    let volume = stream.volume_control().unwrap();
    let mute = stream.mute_control().unwrap();

    assert_eq!(volume.scope(), Scope::Output);
    assert_eq!(mute.scope(), Scope::Output);
    assert_eq!(device.volume_control_count(Scope::Output), 1);
    assert_eq!(device.mute_control_count(Scope::Output), 1);
    assert_eq!(device.mute_control_count(Scope::Input), 0);
    assert!(Arc::ptr_eq(
        &device.volume_control_by_index(Scope::Global, 0).unwrap(),
        &volume
    ));
    assert_eq!(
        device
            .get_property(&PropertyAddress::scoped(Selector::CONTROL_LIST, Scope::Output), 64)
            .unwrap(),
        PropertyValue::ObjectIds(vec![volume.id(), mute.id()])
    );

    assert!(device.remove_mute_control(mute.id()));
    assert!(device.remove_volume_control(volume.id()));
    assert!(!device.remove_volume_control(volume.id()));
    assert_eq!(device.mute_control_count(Scope::Global), 0);
    assert_eq!(device.volume_control_count(Scope::Global), 0);
    assert!(
        device
            .core()
            .owned_object_ids(Scope::Global, Some(ClassId::CONTROL))
            .is_empty()
    );
}

#[test]
fn volume_control_waits_for_host() {
    let (_context, host, device) = hosted_device();
    let volume = device.add_volume_control(Scope::Input);
    assert_eq!(device.volume_control_count(Scope::Input), 1);
    assert!(
        device
            .core()
            .owned_object_ids(Scope::Input, Some(ClassId::VOLUME_CONTROL))
            .is_empty()
    );

    device.perform_configuration_change(host.requests()[0].1);
    assert_eq!(
        device
            .core()
            .owned_object_ids(Scope::Input, Some(ClassId::LEVEL_CONTROL)),
        vec![volume.id()]
    );

    volume.set_decibel_value(-12.0);
    assert!(host.notified(volume.id(), Selector::LEVEL_SCALAR_VALUE));
    assert!(host.notified(volume.id(), Selector::LEVEL_DECIBEL_VALUE));

    assert!(device.remove_volume_control(volume.id()));
    assert_eq!(device.volume_control_count(Scope::Input), 0);
    assert_eq!(volume.core().owner_id(), device.id());
    device.perform_configuration_change(host.requests()[1].1);
    assert!(device.core().owned_object_ids(Scope::Global, None).is_empty());
}

#[test]
fn dropped_device_releases_its_objects() {
    let (context, device) = default_device();
    let stream_id = device.add_stream_with_controls(Direction::Output).id();
    let device_id = device.id();
    assert!(context.find(stream_id).is_some());

    drop(device);
    assert!(context.find(device_id).is_none());
    assert!(context.find(stream_id).is_none());
    assert!(context.registry().is_empty());
}

// ---------------------------------------------------------------------------
// Clients
// ---------------------------------------------------------------------------

#[test]
fn clients_are_tracked_through_handler() {
    let (_context, device) = default_device();
    let control = Arc::new(CountingControl::default());
    device.set_control_handler(control.clone());

    let mut info = ClientInfo::new(10);
    info.process_id = 4242;
    info.bundle_id = "com.example.player".to_string();
    let client = device.add_client(&info).unwrap();
    assert_eq!(client.id(), 10);
    assert_eq!(client.bundle_id(), "com.example.player");
    device.add_client(&ClientInfo::new(11)).unwrap();

    assert_eq!(device.client_count(), 2);
    assert_eq!(device.client_by_id(10).unwrap().process_id(), 4242);
    let ids: Vec<u32> = device.clients().iter().map(|c| c.id()).collect();
    assert_eq!(ids, vec![10, 11]);

    device.remove_client(10).unwrap();
    assert_eq!(*control.removed_clients.lock(), vec![10]);
    assert!(matches!(
        device.remove_client(10),
        Err(Error::IllegalOperation(_))
    ));
    assert_eq!(device.client_count(), 1);
}

#[test]
fn rejected_client_is_not_added() {
    let (_context, device) = default_device();
    device.set_control_handler(Arc::new(CountingControl::default()));

    let mut info = ClientInfo::new(1);
    info.process_id = -1;
    let err = device.add_client(&info).unwrap_err();
    assert!(matches!(err, Error::Handler(_)));
    assert_eq!(device.client_count(), 0);
}

// ---------------------------------------------------------------------------
// I/O operations
// ---------------------------------------------------------------------------

#[test]
fn will_do_follows_streams_and_mixing() {
    let (_context, device) = default_device();
    for op in IoOperation::ALL {
        assert_eq!(device.will_do_io_operation(op), WillDo::default());
    }

    device.add_stream(Direction::Input);
    device.add_stream(Direction::Output);
    let yes = WillDo {
        will_do: true,
        in_place: true,
    };
    assert_eq!(device.will_do_io_operation(IoOperation::ReadInput), yes);
    assert_eq!(device.will_do_io_operation(IoOperation::ProcessInput), yes);
    assert_eq!(device.will_do_io_operation(IoOperation::ProcessMix), yes);
    assert_eq!(device.will_do_io_operation(IoOperation::WriteMix), yes);
    assert_eq!(
        device.will_do_io_operation(IoOperation::MixOutput),
        WillDo::default()
    );
    assert_eq!(
        device.will_do_io_operation(IoOperation::ConvertInput),
        WillDo::default()
    );

    let (_context, unmixed) = device_with(DeviceParameters {
        enable_mixing: false,
        ..DeviceParameters::default()
    });
    unmixed.add_stream(Direction::Output);
    assert_eq!(unmixed.will_do_io_operation(IoOperation::MixOutput), yes);
    assert!(!unmixed.will_do_io_operation(IoOperation::WriteMix).will_do);
}

#[test]
fn client_output_is_processed_then_written() {
    let (_context, device) = device_with(DeviceParameters {
        enable_mixing: false,
        ..DeviceParameters::default()
    });
    let io = Arc::new(RecordingIo::default());
    device.set_io_handler(io.clone());
    device.add_client(&ClientInfo::new(5)).unwrap();
    let stream = device.add_stream(Direction::Output);

    let cycle = IoCycle {
        input_time: 100.0,
        output_time: 612.0,
    };
    let mut frames = vec![0.5_f32; 8];
    device
        .do_io_operation(5, stream.id(), IoOperation::MixOutput, 4, &cycle, &mut frames)
        .unwrap();

    assert_eq!(
        io.hooks(),
        vec!["process_client_output", "write_client_output"]
    );
    let call = io.calls.lock()[0].clone();
    assert!(call.has_client);
    assert_eq!(call.time.timestamp, 612.0);
    assert_eq!(call.len, 8);
}

#[test]
fn input_uses_input_time_and_unknown_client_is_allowed() {
    let (_context, device) = default_device();
    let io = Arc::new(RecordingIo::default());
    device.set_io_handler(io.clone());
    let stream = device.add_stream(Direction::Input);

    let cycle = IoCycle {
        input_time: 100.0,
        output_time: 612.0,
    };
    let mut frames = vec![0.0_f32; 6];
    device
        .do_io_operation(77, stream.id(), IoOperation::ReadInput, 3, &cycle, &mut frames)
        .unwrap();

    assert_eq!(frames, vec![0.25; 6]);
    let call = io.calls.lock()[0].clone();
    assert!(!call.has_client);
    assert_eq!(call.time.timestamp, 100.0);
}

#[test]
fn io_rejects_unknown_stream_and_bad_buffer() {
    let (_context, device) = default_device();
    let stream = device.add_stream(Direction::Output);
    let cycle = IoCycle::default();

    let mut frames = vec![0.0_f32; 8];
    assert!(matches!(
        device.do_io_operation(1, ObjectId::new(999), IoOperation::WriteMix, 4, &cycle, &mut frames),
        Err(Error::IllegalOperation(_))
    ));
    assert!(matches!(
        device.do_io_operation(1, stream.id(), IoOperation::WriteMix, 5, &cycle, &mut frames),
        Err(Error::SizeMismatch {
            expected: 10,
            actual: 8
        })
    ));
}

#[test]
fn buffers_count_samples_not_physical_bytes() {
    let (_context, device) = default_device();
    let stream = device.add_stream(Direction::Input);
    assert_eq!(stream.physical_format().bits_per_channel, 16);
    assert_eq!(stream.frames_to_bytes(4), 16);
    let cycle = IoCycle::default();

    let mut frames = vec![0.5_f32; 4 * 2];
    device
        .do_io_operation(1, stream.id(), IoOperation::ReadInput, 4, &cycle, &mut frames)
        .unwrap();
    assert_eq!(frames, vec![0.0; 8]);

    let mut by_bytes = vec![0.0_f32; 16];
    assert!(matches!(
        device.do_io_operation(1, stream.id(), IoOperation::ReadInput, 4, &cycle, &mut by_bytes),
        Err(Error::SizeMismatch {
            expected: 8,
            actual: 16
        })
    ));
}

#[test]
fn default_handlers_apply_volume_and_mute() {
    let (_context, device) = default_device();
    let stream = device.add_stream_with_controls(Direction::Output);
    let cycle = IoCycle::default();

    let mut frames = vec![0.8_f32; 4];
    device
        .do_io_operation(1, stream.id(), IoOperation::ProcessMix, 2, &cycle, &mut frames)
        .unwrap();
    assert_eq!(frames, vec![0.8; 4]);

    stream.volume_control().unwrap().set_scalar_value(0.5);
    device
        .do_io_operation(1, stream.id(), IoOperation::ProcessMix, 2, &cycle, &mut frames)
        .unwrap();
    assert_eq!(frames, vec![0.4; 4]);

    stream.mute_control().unwrap().set_muted(true);
    device
        .do_io_operation(1, stream.id(), IoOperation::ProcessMix, 2, &cycle, &mut frames)
        .unwrap();
    assert_eq!(frames, vec![0.0; 4]);

    let input = device.add_stream(Direction::Input);
    let mut frames = vec![0.8_f32; 4];
    device
        .do_io_operation(1, input.id(), IoOperation::ReadInput, 2, &cycle, &mut frames)
        .unwrap();
    assert_eq!(frames, vec![0.0; 4]);
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[test]
fn generated_uid_has_model_prefix() {
    let (_context, device) = default_device();
    let uid = device.device_uid();
    let suffix = uid.strip_prefix("halrt:").unwrap();
    let groups: Vec<&str> = suffix.split('-').collect();
    assert_eq!(groups.len(), 4);
    assert!(
        groups
            .iter()
            .all(|g| g.len() == 4 && g.chars().all(|c| c.is_ascii_hexdigit()))
    );

    let (_context, other) = default_device();
    assert_ne!(other.device_uid(), uid);

    let (_context, named) = device_with(DeviceParameters {
        device_uid: "fixed".to_string(),
        ..DeviceParameters::default()
    });
    assert_eq!(named.device_uid(), "fixed");
}

#[test]
fn identity_properties() {
    let (_context, device) = default_device();
    let name = device.get_property(&global(Selector::NAME), 8).unwrap();
    assert_eq!(name, PropertyValue::String("halrt Device".to_string()));
    assert_eq!(
        device.get_property(&global(Selector::CLASS), 4).unwrap(),
        PropertyValue::U32(ClassId::DEVICE.raw())
    );
    assert_eq!(
        device.get_property(&global(Selector::BASE_CLASS), 4).unwrap(),
        PropertyValue::U32(ClassId::OBJECT.raw())
    );
    assert_eq!(
        device
            .get_property(&global(Selector::CAN_BE_DEFAULT_DEVICE), 4)
            .unwrap(),
        PropertyValue::Bool(true)
    );
    assert!(!device.is_property_settable(&global(Selector::DEVICE_UID)).unwrap());
    assert!(matches!(
        device.get_property(&global(Selector::new(0x1234_5678)), 64),
        Err(Error::UnknownProperty { .. })
    ));
}

#[test]
fn custom_properties_are_listed_and_served() {
    let (_context, device) = default_device();
    let selector = Selector::from_fourcc(b"cst1");
    device.core().register_custom_property(
        selector,
        CustomPropertyKind::String,
        || PropertyValue::String("custom".to_string()),
        None,
    );

    assert!(device.has_property(&global(selector)));
    assert_eq!(
        device.get_property(&global(selector), 8).unwrap(),
        PropertyValue::String("custom".to_string())
    );
    let PropertyValue::CustomPropertyInfos(infos) = device
        .get_property(&global(Selector::CUSTOM_PROPERTY_INFO_LIST), 64)
        .unwrap()
    else {
        panic!("expected custom property infos");
    };
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].selector, selector);
}

#[test]
fn alive_and_hidden_flags_notify_once() {
    let (_context, host, device) = hosted_device();
    device.set_hidden(true);
    device.set_hidden(true);
    device.set_alive(false);

    let hidden = host
        .notifications
        .lock()
        .iter()
        .filter(|&&(_, s)| s == Selector::IS_HIDDEN)
        .count();
    assert_eq!(hidden, 1);
    assert!(device.is_hidden());
    assert!(!device.is_alive());
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

#[test]
fn driver_runs_full_host_session() {
    let context = Context::new();
    let plugin = Plugin::new(&context, PluginParameters::default());
    let device = Device::new(&context, DeviceParameters::default());
    plugin.add_device(Arc::clone(&device));
    let driver = Driver::new(Arc::clone(&context), Arc::clone(&plugin));

    let host = Arc::new(RecordingHost::default());
    driver.initialize(host.clone()).unwrap();

    let stream = device.add_stream_with_controls(Direction::Output);
    let requests = host.requests();
    assert_eq!(requests.len(), 3);
    for (device_id, request_id) in requests {
        driver
            .perform_device_configuration_change(device_id, request_id)
            .unwrap();
    }
    assert_eq!(
        driver
            .get_property_data(
                device.id(),
                &PropertyAddress::scoped(Selector::STREAMS, Scope::Output),
                64
            )
            .unwrap(),
        PropertyValue::ObjectIds(vec![stream.id()])
    );

    driver
        .add_device_client(device.id(), &ClientInfo::new(1))
        .unwrap();
    driver.start_io(device.id(), 1).unwrap();

    let will = driver
        .will_do_io_operation(device.id(), IoOperation::WriteMix)
        .unwrap();
    assert!(will.will_do);

    let mut frames = vec![0.1_f32; 2 * 16];
    driver
        .begin_io_operation(device.id(), 1, IoOperation::WriteMix, 16)
        .unwrap();
    driver
        .do_io_operation(
            device.id(),
            stream.id(),
            1,
            IoOperation::WriteMix,
            16,
            &IoCycle::default(),
            &mut frames,
        )
        .unwrap();
    driver
        .end_io_operation(device.id(), 1, IoOperation::WriteMix, 16)
        .unwrap();

    driver.stop_io(device.id(), 1).unwrap();
    driver.remove_device_client(device.id(), 1).unwrap();
    assert!(!device.is_running());
    assert_eq!(device.client_count(), 0);
}

#[test]
fn failed_initialize_leaves_host_detached() {
    let context = Context::new();
    let plugin = Plugin::new(&context, PluginParameters::default());
    let device = Device::new(&context, DeviceParameters::default());
    plugin.add_device(Arc::clone(&device));
    let driver = Driver::new(Arc::clone(&context), plugin);
    driver.set_driver_handler(Arc::new(RejectingDriver));

    let host = Arc::new(RecordingHost::default());
    assert!(matches!(
        driver.initialize(host.clone()),
        Err(Error::Handler(_))
    ));
    assert!(context.host().is_none());

    device.set_latency(16);
    assert_eq!(device.latency(), 16);
    assert!(host.requests().is_empty());

    driver.set_driver_handler(Arc::new(DefaultDriverHandler));
    driver.initialize(host.clone()).unwrap();
    assert!(context.has_host());
    device.set_latency(32);
    assert_eq!(host.requests().len(), 1);
}

#[test]
fn driver_sets_properties_by_id() {
    let context = Context::new();
    let plugin = Plugin::new(&context, PluginParameters::default());
    let device = Device::new(&context, DeviceParameters::default());
    let stream = device.add_stream_with_controls(Direction::Output);
    plugin.add_device(Arc::clone(&device));
    let driver = Driver::new(Arc::clone(&context), plugin);

    let mute = stream.mute_control().unwrap();
    let address = global(Selector::BOOLEAN_CONTROL_VALUE);
    assert!(driver.is_property_settable(mute.id(), &address).unwrap());
    assert_eq!(driver.get_property_data_size(mute.id(), &address).unwrap(), 4);
    driver
        .set_property_data(mute.id(), &address, PropertyValue::Bool(true))
        .unwrap();
    assert!(mute.is_muted());

    let format = StreamFormat::pcm_f32(44100.0, 2);
    assert!(matches!(
        driver.set_property_data(
            stream.id(),
            &global(Selector::PHYSICAL_FORMAT),
            PropertyValue::Format(format)
        ),
        Err(Error::UnsupportedValue(_))
    ));
    assert!(matches!(
        driver.abort_device_configuration_change(stream.id(), 0),
        Err(Error::NotFound { .. })
    ));
}
