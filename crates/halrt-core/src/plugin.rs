//! Root plugin object.

use std::fmt;
use std::sync::{Arc, Weak};

use halrt_registry::ObjectId;
use halrt_sync::VersionedCell;

use crate::context::Context;
use crate::device::Device;
use crate::object::{ClassId, Object, ObjectCore, impl_object};
use crate::property::{Property, PropertyValue, Scope, Selector};

/// Plugin construction parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginParameters {
    /// Human-readable manufacturer.
    pub manufacturer: String,
    /// Path of the resource bundle, relative to the plugin bundle.
    pub resource_bundle_path: String,
}

impl Default for PluginParameters {
    fn default() -> Self {
        Self {
            manufacturer: "halrt".to_string(),
            resource_bundle_path: String::new(),
        }
    }
}

/// Root of the object tree, always registered as [`ObjectId::PLUGIN`].
pub struct Plugin {
    core: ObjectCore,
    params: PluginParameters,
    devices: VersionedCell<Vec<Arc<Device>>>,
}

static PROPERTIES: &[Property<Plugin>] = &[
    Property::read_only(Selector::MANUFACTURER, |p, _| {
        Ok(PropertyValue::String(p.params.manufacturer.clone()))
    }),
    Property::read_only(Selector::RESOURCE_BUNDLE, |p, _| {
        Ok(PropertyValue::String(p.params.resource_bundle_path.clone()))
    }),
    Property::read_only(Selector::DEVICE_LIST, |p, _| {
        Ok(PropertyValue::ObjectIds(p.device_ids()))
    }),
];

impl_object!(Plugin, ClassId::PLUGIN, PROPERTIES);

impl Plugin {
    /// Create the plugin in `context`.
    ///
    /// A context holds at most one plugin; a second one cannot claim the
    /// reserved id and stays unregistered.
    pub fn new(context: &Arc<Context>, params: PluginParameters) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Self>| {
            let this: Weak<dyn Object> = this.clone();
            Self {
                core: ObjectCore::with_id(context, "Plugin", this, Some(ObjectId::PLUGIN)),
                params,
                devices: VersionedCell::new(Vec::new()),
            }
        })
    }

    /// Construction parameters.
    pub fn params(&self) -> &PluginParameters {
        &self.params
    }

    /// Publish `device` to the host.
    pub fn add_device(&self, device: Arc<Device>) {
        let id = device.id();
        let added = self.devices.update(|devices| {
            if devices.iter().any(|d| d.id() == id) {
                return false;
            }
            devices.push(Arc::clone(&device));
            true
        });
        if !added {
            tracing::warn!(object_id = %self.id(), device_id = %id, "Plugin: device already added");
            return;
        }

        tracing::info!(object_id = %self.id(), device_id = %id, uid = device.device_uid(), "Plugin: device added");
        self.core.add_owned_object(device, Scope::Global);
        self.core.notify_property_changed(Selector::DEVICE_LIST);
    }

    /// Withdraw a device. Returns `false` if it was not added.
    pub fn remove_device(&self, device_id: ObjectId) -> bool {
        let removed = self.devices.update(|devices| {
            let index = devices.iter().position(|d| d.id() == device_id)?;
            Some(devices.remove(index))
        });
        if removed.is_none() {
            return false;
        }

        tracing::info!(object_id = %self.id(), device_id = %device_id, "Plugin: device removed");
        self.core.remove_owned_object(device_id);
        self.core.notify_property_changed(Selector::DEVICE_LIST);
        true
    }

    /// Ids of published devices, in insertion order.
    pub fn device_ids(&self) -> Vec<ObjectId> {
        self.devices.read().iter().map(|d| d.id()).collect()
    }

    /// Published devices.
    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.devices.read_copy()
    }

    /// Look up a published device by id.
    pub fn device_by_id(&self, device_id: ObjectId) -> Option<Arc<Device>> {
        self.devices
            .read()
            .iter()
            .find(|d| d.id() == device_id)
            .cloned()
    }

    /// Look up a published device by UID.
    pub fn device_by_uid(&self, uid: &str) -> Option<Arc<Device>> {
        self.devices
            .read()
            .iter()
            .find(|d| d.device_uid() == uid)
            .cloned()
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("id", &self.core.id())
            .field("devices", &self.device_ids())
            .finish_non_exhaustive()
    }
}
