//! Deferred configuration changes.
//!
//! Structural changes to a device must run in a window the host grants.
//! A request is parked under a fresh id and the host is asked to schedule
//! it; the host later calls back with perform or abort.
//!
//! ```text
//!            request (host attached)
//!   Idle ─────────────────────────────► AwaitingHost
//!    ▲                                      │ perform(id)
//!    │ queue empty                          ▼
//!    └──────────────────────────── InsideCallback { depth }
//! ```
//!
//! Requests made with no host attached, or from inside a running change,
//! execute immediately.

use std::cell::RefCell;
use std::collections::BTreeMap;

use parking_lot::ReentrantMutex;

use super::Device;
use crate::object::Object;

/// A change to apply to a device.
pub(crate) type ConfigChange = Box<dyn FnOnce(&Device) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChangeMode {
    Idle,
    AwaitingHost,
    InsideCallback { depth: u32 },
}

struct QueueState {
    mode: ChangeMode,
    last_request_id: u64,
    pending: BTreeMap<u64, ConfigChange>,
}

impl QueueState {
    fn settle(&mut self) {
        if !matches!(self.mode, ChangeMode::InsideCallback { .. }) {
            self.mode = if self.pending.is_empty() {
                ChangeMode::Idle
            } else {
                ChangeMode::AwaitingHost
            };
        }
    }
}

/// Pending changes of one device.
///
/// The reentrant lock is held while a change runs, which serializes changes
/// against each other while letting the running change request more.
pub(crate) struct ConfigChangeQueue {
    state: ReentrantMutex<RefCell<QueueState>>,
}

impl Default for ConfigChangeQueue {
    fn default() -> Self {
        Self {
            state: ReentrantMutex::new(RefCell::new(QueueState {
                mode: ChangeMode::Idle,
                last_request_id: 0,
                pending: BTreeMap::new(),
            })),
        }
    }
}

impl ConfigChangeQueue {
    pub(crate) fn request(&self, device: &Device, change: ConfigChange) {
        let guard = self.state.lock();
        let host = device.core().context().host();

        let request_id = {
            let mut state = guard.borrow_mut();
            match host {
                Some(_) if !matches!(state.mode, ChangeMode::InsideCallback { .. }) => {
                    let request_id = state.last_request_id;
                    state.last_request_id = state.last_request_id.wrapping_add(1);
                    state.pending.insert(request_id, change);
                    state.mode = ChangeMode::AwaitingHost;
                    Some(request_id)
                }
                _ => {
                    drop(state);
                    tracing::debug!(object_id = %device.id(), "Device: applying change in place");
                    change(device);
                    None
                }
            }
        };

        if let (Some(request_id), Some(host)) = (request_id, host) {
            tracing::debug!(object_id = %device.id(), request_id, "Device: enqueueing change");
            host.request_device_configuration_change(device.id(), request_id);
        }
    }

    pub(crate) fn perform(&self, device: &Device, request_id: u64) {
        let guard = self.state.lock();

        let change = {
            let mut state = guard.borrow_mut();
            let depth = match state.mode {
                ChangeMode::InsideCallback { depth } => depth,
                _ => 0,
            };
            state.mode = ChangeMode::InsideCallback { depth: depth + 1 };
            state.pending.remove(&request_id)
        };

        match change {
            Some(change) => {
                tracing::debug!(object_id = %device.id(), request_id, "Device: performing queued change");
                change(device);
            }
            None => {
                tracing::warn!(object_id = %device.id(), request_id, "Device: no pending change with this id");
            }
        }

        let mut state = guard.borrow_mut();
        state.mode = match state.mode {
            ChangeMode::InsideCallback { depth } if depth > 1 => {
                ChangeMode::InsideCallback { depth: depth - 1 }
            }
            _ => ChangeMode::Idle,
        };
        state.settle();
    }

    pub(crate) fn abort(&self, device: &Device, request_id: u64) {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        if state.pending.remove(&request_id).is_some() {
            tracing::debug!(object_id = %device.id(), request_id, "Device: aborted queued change");
        } else {
            tracing::warn!(object_id = %device.id(), request_id, "Device: abort of unknown change");
        }
        state.settle();
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.state.lock().borrow().pending.len()
    }
}
