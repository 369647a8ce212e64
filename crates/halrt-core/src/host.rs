//! Calls from the runtime back into the host.

use halrt_registry::ObjectId;

use crate::property::PropertyAddress;

/// Host callback table.
///
/// Attached to a [`Context`](crate::Context) by
/// [`Driver::initialize`](crate::Driver::initialize). Until then, property
/// change notifications are dropped and configuration changes run in place.
pub trait Host: Send + Sync {
    /// Properties of `object_id` changed value.
    fn properties_changed(&self, object_id: ObjectId, addresses: &[PropertyAddress]);

    /// Ask the host to schedule configuration change `request_id` on
    /// `device_id`. The host later calls back with perform or abort.
    fn request_device_configuration_change(&self, device_id: ObjectId, request_id: u64);
}
