//! Double-buffered value cell.
//!
//! A [`VersionedCell`] stores one logical value in two slots. Exactly one slot
//! is current at any time; writers prepare the other slot, publish it by
//! bumping a version counter, then retire the previous slot.
//!
//! ```text
//!  current ──► slot[v % 2]   readers attach here (shared lock)
//!              slot[(v+1) % 2]   next writer fills this one
//! ```
//!
//! Readers only ever `try_read` a slot. If the slot is being recycled they
//! re-load the version and land on the other slot, so a reader never parks
//! behind a writer. Writers may park behind slow readers, but only while
//! recycling a slot that is no longer current.

use std::fmt;
use std::hint;
use std::mem;
use std::ops::Deref;
use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::{MappedRwLockReadGuard, Mutex, RwLock, RwLockReadGuard};

/// Version stamp for a slot that holds no published value.
const RETIRED: i64 = -1;

/// Slot index for a version. `i64::MAX` is odd, so wrapping to 0 keeps
/// consecutive versions on alternating slots.
#[inline]
fn slot_index(version: i64) -> usize {
    (version & 1) as usize
}

#[inline]
fn next_version(version: i64) -> i64 {
    if version == i64::MAX { 0 } else { version + 1 }
}

struct Slot<T> {
    version: AtomicI64,
    value: RwLock<Option<T>>,
}

impl<T> Slot<T> {
    fn new(version: i64, value: Option<T>) -> Self {
        Self {
            version: AtomicI64::new(version),
            value: RwLock::new(value),
        }
    }
}

/// A value readable from any thread without waiting on writers.
///
/// Writes replace the whole value. To modify part of it, use
/// [`update`](Self::update), which performs the read-copy-modify-write under
/// the writer lock so concurrent updates are not lost.
///
/// A [`CellRef`] borrows a slot. Holding one while calling
/// [`write`](Self::write) on the same cell from the same thread deadlocks
/// once the writer reaches that slot; keep read handles short-lived.
pub struct VersionedCell<T> {
    writer: Mutex<()>,
    slots: [Slot<T>; 2],
    current: AtomicI64,
}

/// Read handle returned by [`VersionedCell::read`].
///
/// Dereferences to the value that was current when the read began.
pub struct CellRef<'a, T> {
    guard: MappedRwLockReadGuard<'a, T>,
}

impl<T> Deref for CellRef<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T: fmt::Debug> fmt::Debug for CellRef<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<T> VersionedCell<T> {
    /// Create a cell holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            writer: Mutex::new(()),
            slots: [Slot::new(0, Some(value)), Slot::new(RETIRED, None)],
            current: AtomicI64::new(0),
        }
    }

    /// Borrow the current value.
    ///
    /// Never parks on a writer. In the narrow race where a second write
    /// completes between loading the version and attaching to its slot, the
    /// read retries against the new current slot.
    pub fn read(&self) -> CellRef<'_, T> {
        loop {
            let version = self.current.load(Ordering::SeqCst);
            let slot = &self.slots[slot_index(version)];

            let Some(guard) = slot.value.try_read() else {
                hint::spin_loop();
                continue;
            };
            if slot.version.load(Ordering::SeqCst) != version {
                continue;
            }
            if let Ok(guard) = RwLockReadGuard::try_map(guard, Option::as_ref) {
                return CellRef { guard };
            }
        }
    }

    /// Replace the value.
    ///
    /// Returns once the new value is visible to all subsequent reads. For
    /// types with drop glue this also waits for readers of the previous
    /// value to detach and then drops it.
    pub fn write(&self, value: T) {
        let _writer = self.writer.lock();
        self.publish(value);
    }

    /// Read-copy-modify-write under the writer lock.
    ///
    /// `f` receives a clone of the current value; the modified clone is then
    /// published. Returns whatever `f` returns.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R
    where
        T: Clone,
    {
        let _writer = self.writer.lock();
        let mut value = self.read().clone();
        let result = f(&mut value);
        self.publish(value);
        result
    }

    /// Number of writes performed so far (wraps at `i64::MAX`).
    pub fn version(&self) -> i64 {
        self.current.load(Ordering::SeqCst)
    }

    /// Caller must hold `self.writer`.
    fn publish(&self, value: T) {
        let old_version = self.current.load(Ordering::SeqCst);
        let new_version = next_version(old_version);
        let old_slot = &self.slots[slot_index(old_version)];
        let new_slot = &self.slots[slot_index(new_version)];

        // Stale readers of the target slot see a version mismatch from here on.
        new_slot.version.store(new_version, Ordering::SeqCst);
        let stale = new_slot.value.write().replace(value);
        self.current.store(new_version, Ordering::SeqCst);
        drop(stale);

        if mem::needs_drop::<T>() {
            old_slot.version.store(RETIRED, Ordering::SeqCst);
            let retired = old_slot.value.write().take();
            drop(retired);
        }
    }
}

impl<T: Clone> VersionedCell<T> {
    /// Clone the current value out of the cell.
    pub fn read_copy(&self) -> T {
        self.read().clone()
    }
}

impl<T: Default> Default for VersionedCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for VersionedCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionedCell")
            .field("version", &self.version())
            .field("value", &*self.read())
            .finish()
    }
}
