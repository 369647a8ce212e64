//! Property-based tests for the device I/O coordinator.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use halrt_core::{
    Context, ControlRequestHandler, Device, DeviceParameters, HandlerError, Host, ManualClock,
    ObjectId, PropertyAddress,
};
use parking_lot::Mutex;
use proptest::prelude::*;

#[derive(Default)]
struct Hooks {
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl ControlRequestHandler for Hooks {
    fn on_start_io(&self) -> Result<(), HandlerError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_stop_io(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct QueueHost {
    requests: Mutex<Vec<u64>>,
}

impl Host for QueueHost {
    fn properties_changed(&self, _object_id: ObjectId, _addresses: &[PropertyAddress]) {}

    fn request_device_configuration_change(&self, _device_id: ObjectId, request_id: u64) {
        self.requests.lock().push(request_id);
    }
}

#[derive(Debug, Clone)]
enum ChangeOp {
    Request,
    /// Perform the request at this index (modulo issued count).
    Perform(usize),
    /// Abort the request at this index (modulo issued count).
    Abort(usize),
}

fn change_op() -> impl Strategy<Value = ChangeOp> {
    prop_oneof![
        3 => Just(ChangeOp::Request),
        2 => any::<usize>().prop_map(ChangeOp::Perform),
        1 => any::<usize>().prop_map(ChangeOp::Abort),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Start and stop hooks fire only on 0→1 and 1→0, so after any sequence
    /// they differ by exactly the running flag.
    #[test]
    fn hooks_track_running_state(ops in prop::collection::vec(any::<bool>(), 1..200)) {
        let context = Context::new();
        let device = Device::new(&context, DeviceParameters::default());
        let hooks = Arc::new(Hooks::default());
        device.set_control_handler(hooks.clone());

        let mut expected: u32 = 0;
        for start in ops {
            if start {
                device.start_io(1).unwrap();
                expected += 1;
            } else {
                device.stop_io(1).unwrap();
                expected = expected.saturating_sub(1);
            }
            prop_assert_eq!(device.start_count(), expected);
            prop_assert_eq!(device.is_running(), expected > 0);

            let starts = hooks.starts.load(Ordering::SeqCst);
            let stops = hooks.stops.load(Ordering::SeqCst);
            prop_assert_eq!(starts - stops, usize::from(expected > 0));
        }
    }

    /// Every queued change runs at most once, and only if performed before
    /// being aborted.
    #[test]
    fn queued_changes_run_at_most_once(ops in prop::collection::vec(change_op(), 1..200)) {
        let context = Context::new();
        let device = Device::new(&context, DeviceParameters::default());
        let host = Arc::new(QueueHost::default());
        context.attach_host(host.clone());

        let runs: Arc<Mutex<Vec<usize>>> = Arc::default();
        let mut issued = 0_usize;
        let mut settled = BTreeSet::new();
        let mut performed = BTreeSet::new();

        for op in ops {
            match op {
                ChangeOp::Request => {
                    let runs = Arc::clone(&runs);
                    let tag = issued;
                    device.request_configuration_change(move |_| runs.lock().push(tag));
                    issued += 1;
                }
                ChangeOp::Perform(k) if issued > 0 => {
                    let index = k % issued;
                    let request_id = host.requests.lock()[index];
                    device.perform_configuration_change(request_id);
                    if settled.insert(index) {
                        performed.insert(index);
                    }
                }
                ChangeOp::Abort(k) if issued > 0 => {
                    let index = k % issued;
                    let request_id = host.requests.lock()[index];
                    device.abort_configuration_change(request_id);
                    settled.insert(index);
                }
                _ => {}
            }
            prop_assert_eq!(device.pending_configuration_changes(), issued - settled.len());
        }

        let runs = runs.lock().clone();
        let unique: BTreeSet<usize> = runs.iter().copied().collect();
        prop_assert_eq!(unique.len(), runs.len());
        prop_assert_eq!(unique, performed);
    }

    /// Published zero timestamps never go backwards and move by at most one
    /// period per query.
    #[test]
    fn zero_timestamps_are_periodic(
        period in 16_u32..4096,
        steps in prop::collection::vec(0_u64..50_000_000, 1..100),
    ) {
        let clock = Arc::new(ManualClock::new(48_000_000.0));
        let context = Context::builder().clock(clock.clone()).build();
        let device = Device::new(&context, DeviceParameters {
            sample_rate: 48000.0,
            zero_timestamp_period: period,
            ..DeviceParameters::default()
        });
        device.start_io(1).unwrap();

        let period = f64::from(period);
        let mut last = device.get_zero_timestamp();
        for step in steps {
            clock.advance(step);
            let ts = device.get_zero_timestamp();
            prop_assert!(ts.sample_time >= last.sample_time);
            prop_assert!(ts.host_time >= last.host_time);
            prop_assert!(ts.sample_time - last.sample_time <= period);
            prop_assert_eq!(ts.sample_time % period, 0.0);
            last = ts;
        }
    }
}
