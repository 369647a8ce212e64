//! Sine-wave device demo: a virtual microphone driven by a simulated host.
//!
//! Run with: RUST_LOG=debug cargo run -p halrt-core --example sinewave_device

use std::f64::consts::TAU;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use halrt_core::{
    Client, Context, Device, DeviceParameters, Direction, Driver, Host, IoCycle, IoOperation,
    IoRequestHandler, IoTime, Object, ObjectId, Plugin, PluginParameters, PropertyAddress,
    Stream,
};
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

const FRAMES_PER_CYCLE: u32 = 512;

/// Host stand-in that queues configuration requests for the main loop.
#[derive(Default)]
struct DemoHost {
    pending: Mutex<Vec<(ObjectId, u64)>>,
}

impl Host for DemoHost {
    fn properties_changed(&self, object_id: ObjectId, addresses: &[PropertyAddress]) {
        for address in addresses {
            tracing::info!(%object_id, selector = %address.selector, "host: property changed");
        }
    }

    fn request_device_configuration_change(&self, device_id: ObjectId, request_id: u64) {
        self.pending.lock().push((device_id, request_id));
    }
}

/// Writes a sine tone into every input buffer.
struct SineGenerator {
    frequency: f64,
    sample_rate: f64,
    phase: AtomicU64,
}

impl SineGenerator {
    fn new(frequency: f64, sample_rate: f64) -> Self {
        Self {
            frequency,
            sample_rate,
            phase: AtomicU64::new(0.0_f64.to_bits()),
        }
    }
}

impl IoRequestHandler for SineGenerator {
    fn on_read_client_input(
        &self,
        _client: Option<&Arc<Client>>,
        stream: &Arc<Stream>,
        _time: IoTime,
        frames: &mut [f32],
    ) {
        let channels = stream.channel_count().max(1) as usize;
        let step = TAU * self.frequency / self.sample_rate;
        let mut phase = f64::from_bits(self.phase.load(Ordering::Relaxed));

        for frame in frames.chunks_mut(channels) {
            frame.fill((phase.sin() * 0.5) as f32);
            phase = (phase + step) % TAU;
        }
        self.phase.store(phase.to_bits(), Ordering::Relaxed);
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let context = Context::new();
    let plugin = Plugin::new(&context, PluginParameters::default());
    let driver = Driver::new(Arc::clone(&context), Arc::clone(&plugin));

    let host = Arc::new(DemoHost::default());
    if let Err(err) = driver.initialize(host.clone()) {
        eprintln!("initialize failed: {err}");
        return;
    }

    let device = Device::new(
        &context,
        DeviceParameters {
            name: "Sine Microphone".to_string(),
            sample_rate: 48000.0,
            channel_count: 1,
            ..DeviceParameters::default()
        },
    );
    device.set_io_handler(Arc::new(SineGenerator::new(440.0, 48000.0)));
    let stream = device.add_stream_with_controls(Direction::Input);
    plugin.add_device(Arc::clone(&device));

    // The host grants every queued change before starting I/O.
    let pending: Vec<_> = host.pending.lock().drain(..).collect();
    for (device_id, request_id) in pending {
        if let Err(err) = driver.perform_device_configuration_change(device_id, request_id) {
            eprintln!("perform failed: {err}");
        }
    }

    println!("device {} ({})", device.id(), device.device_uid());
    println!("will read input: {:?}", device.will_do_io_operation(IoOperation::ReadInput));

    if let Err(err) = driver.start_io(device.id(), 1) {
        eprintln!("start failed: {err}");
        return;
    }

    let mut buffer = vec![0.0_f32; FRAMES_PER_CYCLE as usize * stream.channel_count() as usize];
    for cycle_index in 0..8 {
        let zero = device.get_zero_timestamp();
        let cycle = IoCycle {
            input_time: f64::from(cycle_index * FRAMES_PER_CYCLE),
            output_time: f64::from((cycle_index + 1) * FRAMES_PER_CYCLE),
        };

        for op in [IoOperation::ReadInput, IoOperation::ProcessInput] {
            if !device.will_do_io_operation(op).will_do {
                continue;
            }
            let result = driver.do_io_operation(
                device.id(),
                stream.id(),
                1,
                op,
                FRAMES_PER_CYCLE,
                &cycle,
                &mut buffer,
            );
            if let Err(err) = result {
                eprintln!("{op} failed: {err}");
            }
        }

        let peak = buffer.iter().fold(0.0_f32, |acc, s| acc.max(s.abs()));
        println!(
            "cycle {cycle_index}: zero ts {:>8.0} @ {:>12}  peak {peak:.3}",
            zero.sample_time, zero.host_time
        );

        if cycle_index == 2 {
            if let Some(volume) = stream.volume_control() {
                volume.set_scalar_value(0.5);
                println!("volume at {:.1} dB", volume.decibel_value());
            }
        }
        if cycle_index == 4 {
            if let Some(mute) = stream.mute_control() {
                println!("muting");
                mute.set_muted(true);
            }
        }
    }

    if let Err(err) = driver.stop_io(device.id(), 1) {
        eprintln!("stop failed: {err}");
    }
}
