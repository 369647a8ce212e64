//! Per-plugin shared state.

use std::fmt;
use std::sync::Arc;

use halrt_registry::{ObjectId, ObjectRegistry, RegistryOptions};
use halrt_sync::VersionedCell;

use crate::clock::{HostClock, MonotonicClock};
use crate::host::Host;
use crate::object::Object;

/// State shared by every object of one plugin instance.
///
/// Holds the object registry, the attached host (if any), and the host
/// clock. Contexts are independent; tests routinely create several.
pub struct Context {
    registry: ObjectRegistry<dyn Object>,
    host: VersionedCell<Option<Arc<dyn Host>>>,
    clock: Arc<dyn HostClock>,
}

impl Context {
    /// Context with default registry options and a monotonic clock.
    pub fn new() -> Arc<Self> {
        Self::builder().build()
    }

    /// Start configuring a context.
    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    /// The object registry.
    pub fn registry(&self) -> &ObjectRegistry<dyn Object> {
        &self.registry
    }

    /// Look up a live object by id.
    pub fn find(&self, id: ObjectId) -> Option<Arc<dyn Object>> {
        self.registry.find(id)
    }

    /// Look up a live object and downcast it.
    pub fn find_as<T: Object>(&self, id: ObjectId) -> Option<Arc<T>> {
        self.find(id)?.into_any().downcast::<T>().ok()
    }

    /// The attached host, if any.
    pub fn host(&self) -> Option<Arc<dyn Host>> {
        self.host.read().clone()
    }

    /// Whether a host is attached.
    pub fn has_host(&self) -> bool {
        self.host.read().is_some()
    }

    /// Attach the host callback table.
    pub fn attach_host(&self, host: Arc<dyn Host>) {
        self.host.write(Some(host));
    }

    /// Detach the host.
    pub fn detach_host(&self) {
        self.host.write(None);
    }

    /// The host clock.
    pub fn clock(&self) -> &Arc<dyn HostClock> {
        &self.clock
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("registry", &self.registry)
            .field("has_host", &self.has_host())
            .field("clock", &self.clock)
            .finish()
    }
}

/// Builder for [`Context`].
#[derive(Default)]
pub struct ContextBuilder {
    registry: RegistryOptions,
    clock: Option<Arc<dyn HostClock>>,
}

impl ContextBuilder {
    /// Registry options.
    pub fn registry_options(mut self, options: RegistryOptions) -> Self {
        self.registry = options;
        self
    }

    /// Host clock to use instead of [`MonotonicClock`].
    pub fn clock(mut self, clock: Arc<dyn HostClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the context.
    pub fn build(self) -> Arc<Context> {
        Arc::new(Context {
            registry: ObjectRegistry::with_options(self.registry),
            host: VersionedCell::new(None),
            clock: self
                .clock
                .unwrap_or_else(|| Arc::new(MonotonicClock::new())),
        })
    }
}
