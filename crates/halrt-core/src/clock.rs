//! Host time sources.
//!
//! The device clock model works in host ticks. [`MonotonicClock`] is the
//! production source; [`ManualClock`] lets tests step time explicitly.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Source of host time.
pub trait HostClock: Send + Sync + fmt::Debug {
    /// Current host time in ticks.
    fn now(&self) -> u64;

    /// Tick frequency.
    fn ticks_per_second(&self) -> f64;
}

/// Nanosecond ticks from the OS monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    /// Clock whose tick zero is now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl HostClock for MonotonicClock {
    fn now(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    fn ticks_per_second(&self) -> f64 {
        1_000_000_000.0
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    ticks: AtomicU64,
    ticks_per_second: f64,
}

impl ManualClock {
    /// Clock at tick 0 with the given frequency.
    pub fn new(ticks_per_second: f64) -> Self {
        Self {
            ticks: AtomicU64::new(0),
            ticks_per_second,
        }
    }

    /// Jump to an absolute tick.
    pub fn set(&self, ticks: u64) {
        self.ticks.store(ticks, Ordering::SeqCst);
    }

    /// Move forward by `ticks`.
    pub fn advance(&self, ticks: u64) {
        self.ticks.fetch_add(ticks, Ordering::SeqCst);
    }
}

impl HostClock for ManualClock {
    fn now(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    fn ticks_per_second(&self) -> f64 {
        self.ticks_per_second
    }
}
