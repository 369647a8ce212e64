//! Entry points the host calls, routed by object id.
//!
//! [`Driver`] is the layer a host binding sits on. Every call names its
//! target by [`ObjectId`]; the driver resolves it through the context's
//! registry and forwards to the object. Ids that do not resolve, or resolve
//! to an object of the wrong class for a device call, fail with
//! [`Error::NotFound`].

use std::fmt;
use std::sync::Arc;

use halrt_registry::ObjectId;
use halrt_sync::VersionedCell;

use crate::client::ClientInfo;
use crate::context::Context;
use crate::device::{Device, IoCycle, IoOperation, WillDo, ZeroTimestamp};
use crate::error::{Error, Result};
use crate::handler::{DefaultDriverHandler, DriverRequestHandler};
use crate::host::Host;
use crate::object::Object;
use crate::plugin::Plugin;
use crate::property::{PropertyAddress, PropertyValue};

/// Owns a context and its plugin and dispatches host calls.
pub struct Driver {
    context: Arc<Context>,
    plugin: Arc<Plugin>,
    driver_handler: VersionedCell<Arc<dyn DriverRequestHandler>>,
}

impl Driver {
    /// Driver for `plugin`, which must live in `context`.
    pub fn new(context: Arc<Context>, plugin: Arc<Plugin>) -> Self {
        Self {
            context,
            plugin,
            driver_handler: VersionedCell::new(Arc::new(DefaultDriverHandler)),
        }
    }

    /// The context.
    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// The root plugin.
    pub fn plugin(&self) -> &Arc<Plugin> {
        &self.plugin
    }

    /// Replace the driver handler.
    pub fn set_driver_handler(&self, handler: Arc<dyn DriverRequestHandler>) {
        self.driver_handler.write(handler);
    }

    /// The current driver handler.
    pub fn driver_handler(&self) -> Arc<dyn DriverRequestHandler> {
        Arc::clone(&self.driver_handler.read())
    }

    /// Attach the host. From here on configuration changes are queued and
    /// property changes are reported.
    ///
    /// The driver handler runs first; if it fails no host is attached and
    /// its error is returned.
    pub fn initialize(&self, host: Arc<dyn Host>) -> Result<()> {
        self.driver_handler().on_initialize().map_err(|err| {
            tracing::warn!(plugin_id = %self.plugin.id(), "Driver: initialize hook failed: {err}");
            Error::from(err)
        })?;

        if self.context.has_host() {
            tracing::warn!("Driver: host replaced");
        }
        self.context.attach_host(host);
        tracing::info!(
            plugin_id = %self.plugin.id(),
            devices = self.plugin.device_ids().len(),
            "Driver: initialized"
        );
        Ok(())
    }

    fn object(&self, id: ObjectId) -> Result<Arc<dyn Object>> {
        self.context.find(id).ok_or_else(|| Error::not_found(id))
    }

    fn device(&self, id: ObjectId) -> Result<Arc<Device>> {
        self.context
            .find_as::<Device>(id)
            .ok_or_else(|| Error::not_found(id))
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    /// Whether `object_id` answers `address`. Unknown objects answer
    /// nothing.
    pub fn has_property(&self, object_id: ObjectId, address: &PropertyAddress) -> bool {
        self.object(object_id)
            .is_ok_and(|object| object.has_property(address))
    }

    /// Whether `address` of `object_id` can be written.
    pub fn is_property_settable(
        &self,
        object_id: ObjectId,
        address: &PropertyAddress,
    ) -> Result<bool> {
        self.object(object_id)?.is_property_settable(address)
    }

    /// Wire size of `address` of `object_id`.
    pub fn get_property_data_size(
        &self,
        object_id: ObjectId,
        address: &PropertyAddress,
    ) -> Result<usize> {
        self.object(object_id)?.property_size(address)
    }

    /// Read `address` of `object_id` into a buffer of `capacity` bytes.
    pub fn get_property_data(
        &self,
        object_id: ObjectId,
        address: &PropertyAddress,
        capacity: usize,
    ) -> Result<PropertyValue> {
        self.object(object_id)?.get_property(address, capacity)
    }

    /// Write `address` of `object_id`.
    pub fn set_property_data(
        &self,
        object_id: ObjectId,
        address: &PropertyAddress,
        value: PropertyValue,
    ) -> Result<()> {
        self.object(object_id)?.set_property(address, value)
    }

    // ------------------------------------------------------------------
    // Clients and configuration changes
    // ------------------------------------------------------------------

    /// Attach a client to a device.
    pub fn add_device_client(&self, device_id: ObjectId, info: &ClientInfo) -> Result<()> {
        self.device(device_id)?.add_client(info).map(drop)
    }

    /// Detach a client from a device.
    pub fn remove_device_client(&self, device_id: ObjectId, client_id: u32) -> Result<()> {
        self.device(device_id)?.remove_client(client_id)
    }

    /// Run a queued configuration change.
    pub fn perform_device_configuration_change(
        &self,
        device_id: ObjectId,
        request_id: u64,
    ) -> Result<()> {
        self.device(device_id)?
            .perform_configuration_change(request_id);
        Ok(())
    }

    /// Discard a queued configuration change.
    pub fn abort_device_configuration_change(
        &self,
        device_id: ObjectId,
        request_id: u64,
    ) -> Result<()> {
        self.device(device_id)?.abort_configuration_change(request_id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // I/O
    // ------------------------------------------------------------------

    /// Start I/O on a device for one client.
    pub fn start_io(&self, device_id: ObjectId, client_id: u32) -> Result<()> {
        self.device(device_id)?.start_io(client_id)
    }

    /// Stop I/O on a device for one client.
    pub fn stop_io(&self, device_id: ObjectId, client_id: u32) -> Result<()> {
        self.device(device_id)?.stop_io(client_id)
    }

    /// Current zero timestamp of a device.
    pub fn get_zero_timestamp(&self, device_id: ObjectId) -> Result<ZeroTimestamp> {
        Ok(self.device(device_id)?.get_zero_timestamp())
    }

    /// Whether a device takes part in `operation`.
    pub fn will_do_io_operation(
        &self,
        device_id: ObjectId,
        operation: IoOperation,
    ) -> Result<WillDo> {
        Ok(self.device(device_id)?.will_do_io_operation(operation))
    }

    /// Host is about to perform `operation`.
    pub fn begin_io_operation(
        &self,
        device_id: ObjectId,
        client_id: u32,
        operation: IoOperation,
        frame_count: u32,
    ) -> Result<()> {
        self.device(device_id)?
            .begin_io_operation(client_id, operation, frame_count);
        Ok(())
    }

    /// Perform `operation` on `frames` of `stream_id`.
    #[allow(clippy::too_many_arguments)]
    pub fn do_io_operation(
        &self,
        device_id: ObjectId,
        stream_id: ObjectId,
        client_id: u32,
        operation: IoOperation,
        frame_count: u32,
        cycle: &IoCycle,
        frames: &mut [f32],
    ) -> Result<()> {
        self.device(device_id)?.do_io_operation(
            client_id,
            stream_id,
            operation,
            frame_count,
            cycle,
            frames,
        )
    }

    /// Host finished `operation`.
    pub fn end_io_operation(
        &self,
        device_id: ObjectId,
        client_id: u32,
        operation: IoOperation,
        frame_count: u32,
    ) -> Result<()> {
        self.device(device_id)?
            .end_io_operation(client_id, operation, frame_count);
        Ok(())
    }
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("context", &self.context)
            .field("plugin", &self.plugin)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceParameters;
    use crate::plugin::PluginParameters;
    use crate::property::Selector;

    fn driver() -> (Driver, Arc<Device>) {
        let context = Context::new();
        let plugin = Plugin::new(&context, PluginParameters::default());
        let device = Device::new(&context, DeviceParameters::default());
        plugin.add_device(Arc::clone(&device));
        (Driver::new(context, plugin), device)
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let (driver, _device) = driver();
        let missing = ObjectId::new(999);
        let address = PropertyAddress::global(Selector::NAME);

        assert!(!driver.has_property(missing, &address));
        assert!(matches!(
            driver.get_property_data(missing, &address, 8),
            Err(Error::NotFound { id }) if id == missing
        ));
        assert!(matches!(
            driver.start_io(missing, 1),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn plugin_id_is_not_a_device() {
        let (driver, _device) = driver();
        assert!(matches!(
            driver.get_zero_timestamp(ObjectId::PLUGIN),
            Err(Error::NotFound { .. })
        ));
        assert!(driver.has_property(ObjectId::PLUGIN, &PropertyAddress::global(Selector::DEVICE_LIST)));
    }

    #[test]
    fn routes_to_device() {
        let (driver, device) = driver();
        driver.start_io(device.id(), 1).unwrap();
        assert!(device.is_running());
        assert_eq!(
            driver
                .get_property_data(
                    device.id(),
                    &PropertyAddress::global(Selector::DEVICE_IS_RUNNING),
                    4
                )
                .unwrap(),
            PropertyValue::Bool(true)
        );
        driver.stop_io(device.id(), 1).unwrap();
        assert!(!device.is_running());
    }
}
