//! Object base: identity, ownership tree, custom properties.
//!
//! Every addressable node (plugin, device, stream, control) embeds an
//! [`ObjectCore`] and implements [`Object`]. The core registers the object
//! with the context's registry on construction and unregisters it on drop.
//!
//! Ownership is an id graph: an owner keeps strong references to its
//! children, and each child records only its owner's id. Reparenting looks
//! the previous owner up through the registry.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use halrt_registry::ObjectId;
use halrt_sync::VersionedCell;

use crate::context::Context;
use crate::error::Result;
use crate::property::{
    CustomProperty, CustomPropertyInfo, CustomPropertyKind, ELEMENT_MAIN, PropertyAddress,
    PropertyValue, Scope, Selector,
};

/// Four-character class id.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(u32);

impl ClassId {
    /// Root of the class hierarchy.
    pub const OBJECT: Self = Self::from_fourcc(b"aobj");
    /// Plugin root object.
    pub const PLUGIN: Self = Self::from_fourcc(b"aplg");
    /// Audio device.
    pub const DEVICE: Self = Self::from_fourcc(b"adev");
    /// Audio stream.
    pub const STREAM: Self = Self::from_fourcc(b"astr");
    /// Any control.
    pub const CONTROL: Self = Self::from_fourcc(b"actl");
    /// On/off control.
    pub const BOOLEAN_CONTROL: Self = Self::from_fourcc(b"togl");
    /// Mute control.
    pub const MUTE_CONTROL: Self = Self::from_fourcc(b"mute");
    /// Continuous level control.
    pub const LEVEL_CONTROL: Self = Self::from_fourcc(b"levl");
    /// Volume control.
    pub const VOLUME_CONTROL: Self = Self::from_fourcc(b"vlme");

    /// Class id from its four-character code.
    pub const fn from_fourcc(code: &[u8; 4]) -> Self {
        Self(u32::from_be_bytes(*code))
    }

    /// Raw host value.
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Direct base class, or `None` for [`ClassId::OBJECT`] and unknown ids.
    pub const fn parent(self) -> Option<Self> {
        match &self.0.to_be_bytes() {
            b"aplg" | b"adev" | b"astr" | b"actl" => Some(Self::OBJECT),
            b"togl" | b"levl" => Some(Self::CONTROL),
            b"mute" => Some(Self::BOOLEAN_CONTROL),
            b"vlme" => Some(Self::LEVEL_CONTROL),
            _ => None,
        }
    }

    /// Whether this class is `other` or derives from it.
    pub fn is_a(self, other: ClassId) -> bool {
        let mut class = Some(self);
        while let Some(current) = class {
            if current == other {
                return true;
            }
            class = current.parent();
        }
        false
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0.to_be_bytes()))
    }
}

impl fmt::Debug for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassId({self})")
    }
}

/// An object the host can address by id.
///
/// Implementations embed an [`ObjectCore`] and a static property table;
/// the property methods are normally generated by `impl_object!`, which
/// routes them through [`crate::dispatch`].
pub trait Object: Send + Sync + 'static {
    /// Shared object state.
    fn core(&self) -> &ObjectCore;

    /// Concrete class.
    fn class(&self) -> ClassId;

    /// Direct base class.
    fn base_class(&self) -> ClassId {
        self.class().parent().unwrap_or(ClassId::OBJECT)
    }

    /// Whether this object is of class `class` or a subclass of it.
    fn is_instance(&self, class: ClassId) -> bool {
        self.class().is_a(class)
    }

    /// Registered id.
    fn id(&self) -> ObjectId {
        self.core().id()
    }

    /// Whether the object answers `address`.
    fn has_property(&self, address: &PropertyAddress) -> bool;

    /// Whether `address` can be written.
    fn is_property_settable(&self, address: &PropertyAddress) -> Result<bool>;

    /// Wire size of the current value at `address`.
    fn property_size(&self, address: &PropertyAddress) -> Result<usize>;

    /// Read `address` into a caller buffer of `capacity` bytes.
    fn get_property(&self, address: &PropertyAddress, capacity: usize) -> Result<PropertyValue>;

    /// Write `address`.
    fn set_property(&self, address: &PropertyAddress, value: PropertyValue) -> Result<()>;

    /// Upcast for downcasting to the concrete type.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Implements [`Object`] for a type with a `core: ObjectCore` field and a
/// static property table.
macro_rules! impl_object {
    ($ty:ty, $class:expr, $table:expr) => {
        impl $crate::object::Object for $ty {
            fn core(&self) -> &$crate::object::ObjectCore {
                &self.core
            }

            fn class(&self) -> $crate::object::ClassId {
                $class
            }

            fn has_property(&self, address: &$crate::property::PropertyAddress) -> bool {
                $crate::dispatch::has(self, $table, address)
            }

            fn is_property_settable(
                &self,
                address: &$crate::property::PropertyAddress,
            ) -> $crate::error::Result<bool> {
                $crate::dispatch::is_settable(self, $table, address)
            }

            fn property_size(
                &self,
                address: &$crate::property::PropertyAddress,
            ) -> $crate::error::Result<usize> {
                $crate::dispatch::size(self, $table, address)
            }

            fn get_property(
                &self,
                address: &$crate::property::PropertyAddress,
                capacity: usize,
            ) -> $crate::error::Result<$crate::property::PropertyValue> {
                $crate::dispatch::get(self, $table, address, capacity)
            }

            fn set_property(
                &self,
                address: &$crate::property::PropertyAddress,
                value: $crate::property::PropertyValue,
            ) -> $crate::error::Result<()> {
                $crate::dispatch::set(self, $table, address, value)
            }

            fn into_any(
                self: ::std::sync::Arc<Self>,
            ) -> ::std::sync::Arc<dyn ::std::any::Any + Send + Sync> {
                self
            }
        }
    };
}

pub(crate) use impl_object;

#[derive(Clone)]
struct OwnedObject {
    id: ObjectId,
    scope: Scope,
    object: Arc<dyn Object>,
}

/// State every object embeds.
pub struct ObjectCore {
    context: Arc<Context>,
    class_name: &'static str,
    id: ObjectId,
    owner: AtomicU32,
    owned: VersionedCell<Vec<OwnedObject>>,
    custom: VersionedCell<Vec<CustomProperty>>,
}

impl ObjectCore {
    /// Register `this` under a freshly allocated id.
    ///
    /// Call from inside [`Arc::new_cyclic`] so the registry can hold a weak
    /// reference to the finished object.
    pub fn new(context: &Arc<Context>, class_name: &'static str, this: Weak<dyn Object>) -> Self {
        Self::with_id(context, class_name, this, None)
    }

    /// Register `this` under `requested`, or a fresh id if `None`.
    ///
    /// If the requested id is taken the object is left unregistered with
    /// [`ObjectId::UNKNOWN`].
    pub fn with_id(
        context: &Arc<Context>,
        class_name: &'static str,
        this: Weak<dyn Object>,
        requested: Option<ObjectId>,
    ) -> Self {
        let id = context
            .registry()
            .register(this, requested)
            .unwrap_or_else(|| {
                tracing::error!("{class_name}: registration failed, object will be unreachable");
                ObjectId::UNKNOWN
            });
        tracing::debug!(object_id = %id, "{class_name}: created");

        Self {
            context: Arc::clone(context),
            class_name,
            id,
            owner: AtomicU32::new(ObjectId::UNKNOWN.raw()),
            owned: VersionedCell::new(Vec::new()),
            custom: VersionedCell::new(Vec::new()),
        }
    }

    /// Registered id.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Owning context.
    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// Human-readable class name used in logs.
    pub fn class_name(&self) -> &'static str {
        self.class_name
    }

    /// Id of the current owner, or [`ObjectId::UNKNOWN`].
    pub fn owner_id(&self) -> ObjectId {
        ObjectId::new(self.owner.load(Ordering::SeqCst))
    }

    fn set_owner(&self, owner: ObjectId) {
        self.owner.store(owner.raw(), Ordering::SeqCst);
    }

    /// Take ownership of `object` under `scope`.
    ///
    /// The object is removed from its previous owner, if any. Adding an
    /// object to itself is ignored.
    pub fn add_owned_object(&self, object: Arc<dyn Object>, scope: Scope) {
        let child_id = object.id();
        if child_id == self.id {
            tracing::warn!("{}: object {child_id} cannot own itself", self.class_name);
            return;
        }

        let previous = object.core().owner_id();
        if previous != self.id && !previous.is_unknown() {
            if let Some(previous_owner) = self.context.find(previous) {
                previous_owner.core().remove_owned_object(child_id);
            }
        }
        object.core().set_owner(self.id);

        self.owned.update(|owned| {
            owned.retain(|o| o.id != child_id);
            owned.push(OwnedObject {
                id: child_id,
                scope,
                object,
            });
        });
        tracing::debug!(object_id = %self.id, "{}: now owns {child_id}", self.class_name);

        self.notify_properties_changed(&[Selector::OWNED_OBJECTS], Scope::Global, ELEMENT_MAIN);
    }

    /// Release ownership of object `id`. Returns `false` if not owned.
    pub fn remove_owned_object(&self, id: ObjectId) -> bool {
        let removed = self.owned.update(|owned| {
            let index = owned.iter().position(|o| o.id == id)?;
            Some(owned.remove(index))
        });
        let Some(removed) = removed else {
            return false;
        };

        if removed.object.core().owner_id() == self.id {
            removed.object.core().set_owner(ObjectId::UNKNOWN);
        }
        drop(removed);
        tracing::debug!(object_id = %self.id, "{}: released {id}", self.class_name);

        self.notify_properties_changed(&[Selector::OWNED_OBJECTS], Scope::Global, ELEMENT_MAIN);
        true
    }

    /// Ids of owned objects in `scope`, optionally restricted to instances
    /// of `class`. [`Scope::Global`] lists every scope.
    pub fn owned_object_ids(&self, scope: Scope, class: Option<ClassId>) -> Vec<ObjectId> {
        self.owned
            .read()
            .iter()
            .filter(|o| scope.matches(o.scope))
            .filter(|o| class.is_none_or(|class| o.object.is_instance(class)))
            .map(|o| o.id)
            .collect()
    }

    /// Owned objects in `scope`.
    pub fn owned_objects(&self, scope: Scope) -> Vec<Arc<dyn Object>> {
        self.owned
            .read()
            .iter()
            .filter(|o| scope.matches(o.scope))
            .map(|o| Arc::clone(&o.object))
            .collect()
    }

    /// Tell the host that `selectors` changed on this object.
    ///
    /// No-op if no host is attached or `selectors` is empty.
    pub fn notify_properties_changed(&self, selectors: &[Selector], scope: Scope, element: u32) {
        if selectors.is_empty() {
            return;
        }
        let Some(host) = self.context.host() else {
            return;
        };
        let addresses: Vec<_> = selectors
            .iter()
            .map(|&selector| PropertyAddress::new(selector, scope, element))
            .collect();
        host.properties_changed(self.id, &addresses);
    }

    /// Shorthand for a single global-scope notification.
    pub fn notify_property_changed(&self, selector: Selector) {
        self.notify_properties_changed(&[selector], Scope::Global, ELEMENT_MAIN);
    }

    /// Add a runtime-defined property.
    ///
    /// Replaces an existing custom property with the same selector.
    /// Properties without a setter are read-only.
    pub fn register_custom_property<G>(
        &self,
        selector: Selector,
        kind: CustomPropertyKind,
        getter: G,
        setter: Option<crate::property::CustomSetter>,
    ) where
        G: Fn() -> PropertyValue + Send + Sync + 'static,
    {
        let property = CustomProperty {
            info: CustomPropertyInfo { selector, kind },
            get: Arc::new(getter),
            set: setter,
        };
        self.custom.update(|custom| {
            custom.retain(|p| p.info.selector != selector);
            custom.push(property);
        });
        self.notify_property_changed(Selector::CUSTOM_PROPERTY_INFO_LIST);
    }

    /// Descriptors of all custom properties.
    pub fn custom_properties(&self) -> Vec<CustomPropertyInfo> {
        self.custom.read().iter().map(CustomProperty::info).collect()
    }

    pub(crate) fn custom_property(&self, selector: Selector) -> Option<CustomProperty> {
        self.custom
            .read()
            .iter()
            .find(|p| p.info.selector == selector)
            .cloned()
    }
}

impl Drop for ObjectCore {
    fn drop(&mut self) {
        if !self.id.is_unknown() {
            self.context.registry().unregister(self.id);
            tracing::debug!(object_id = %self.id, "{}: destroyed", self.class_name);
        }
    }
}

impl fmt::Debug for ObjectCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectCore")
            .field("class_name", &self.class_name)
            .field("id", &self.id)
            .field("owner", &self.owner_id())
            .field("owned", &self.owned_object_ids(Scope::Global, None))
            .finish_non_exhaustive()
    }
}
