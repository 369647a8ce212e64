//! Property dispatch shared by every object class.
//!
//! A lookup tries, in order: the class table, the base table every object
//! answers, then the object's custom properties.

use crate::error::{Error, Result};
use crate::object::Object;
use crate::property::{CustomProperty, Property, PropertyAddress, PropertyValue, Selector};

/// Properties every object answers.
pub(crate) static BASE_PROPERTIES: &[Property<dyn Object>] = &[
    Property::read_only(Selector::BASE_CLASS, |o, _| {
        Ok(PropertyValue::U32(o.base_class().raw()))
    }),
    Property::read_only(Selector::CLASS, |o, _| Ok(PropertyValue::U32(o.class().raw()))),
    Property::read_only(Selector::OWNER, |o, _| {
        Ok(PropertyValue::ObjectId(o.core().owner_id()))
    }),
    Property::read_only(Selector::NAME, |_, _| Ok(PropertyValue::String(String::new()))),
    Property::read_only(Selector::MANUFACTURER, |_, _| {
        Ok(PropertyValue::String(String::new()))
    }),
    Property::read_only(Selector::OWNED_OBJECTS, |o, address| {
        Ok(PropertyValue::ObjectIds(
            o.core().owned_object_ids(address.scope, None),
        ))
    }),
    Property::read_only(Selector::CUSTOM_PROPERTY_INFO_LIST, |o, _| {
        Ok(PropertyValue::CustomPropertyInfos(o.core().custom_properties()))
    }),
];

enum Resolved<O: 'static> {
    Class(&'static Property<O>),
    Base(&'static Property<dyn Object>),
    Custom(CustomProperty),
}

fn resolve<O: Object>(
    object: &O,
    table: &'static [Property<O>],
    selector: Selector,
) -> Option<Resolved<O>> {
    if let Some(row) = table.iter().find(|p| p.selector == selector) {
        return Some(Resolved::Class(row));
    }
    if let Some(row) = BASE_PROPERTIES.iter().find(|p| p.selector == selector) {
        return Some(Resolved::Base(row));
    }
    object.core().custom_property(selector).map(Resolved::Custom)
}

fn unknown(address: &PropertyAddress) -> Error {
    Error::UnknownProperty {
        selector: address.selector,
    }
}

fn check_kind(expected: &PropertyValue, actual: &PropertyValue) -> Result<()> {
    if expected.same_kind(actual) {
        Ok(())
    } else {
        Err(Error::SizeMismatch {
            expected: expected.byte_size(),
            actual: actual.byte_size(),
        })
    }
}

/// Whether `object` answers `address`.
pub fn has<O: Object>(object: &O, table: &'static [Property<O>], address: &PropertyAddress) -> bool {
    resolve(object, table, address.selector).is_some()
}

/// Whether `address` is writable on `object`.
pub fn is_settable<O: Object>(
    object: &O,
    table: &'static [Property<O>],
    address: &PropertyAddress,
) -> Result<bool> {
    match resolve(object, table, address.selector) {
        Some(Resolved::Class(row)) => Ok(row.set.is_some()),
        Some(Resolved::Base(row)) => Ok(row.set.is_some()),
        Some(Resolved::Custom(property)) => Ok(property.set.is_some()),
        None => Err(unknown(address)),
    }
}

/// Read `address`, failing if the value needs more than `capacity` bytes.
pub fn get<O: Object>(
    object: &O,
    table: &'static [Property<O>],
    address: &PropertyAddress,
    capacity: usize,
) -> Result<PropertyValue> {
    let value = match resolve(object, table, address.selector) {
        Some(Resolved::Class(row)) => (row.get)(object, address)?,
        Some(Resolved::Base(row)) => {
            let object: &(dyn Object + 'static) = object;
            (row.get)(object, address)?
        }
        Some(Resolved::Custom(property)) => (property.get)(),
        None => return Err(unknown(address)),
    };

    let size = value.byte_size();
    if size > capacity {
        return Err(Error::SizeMismatch {
            expected: size,
            actual: capacity,
        });
    }
    Ok(value)
}

/// Wire size of the current value at `address`.
pub fn size<O: Object>(
    object: &O,
    table: &'static [Property<O>],
    address: &PropertyAddress,
) -> Result<usize> {
    get(object, table, address, usize::MAX).map(|value| value.byte_size())
}

/// Write `address`. The value must be of the variant the property reads as.
pub fn set<O: Object>(
    object: &O,
    table: &'static [Property<O>],
    address: &PropertyAddress,
    value: PropertyValue,
) -> Result<()> {
    const READ_ONLY: Error = Error::IllegalOperation("property is read-only");

    match resolve(object, table, address.selector) {
        Some(Resolved::Class(row)) => {
            let setter = row.set.ok_or(READ_ONLY)?;
            check_kind(&(row.get)(object, address)?, &value)?;
            setter(object, address, value)
        }
        Some(Resolved::Base(row)) => {
            let object: &(dyn Object + 'static) = object;
            let setter = row.set.ok_or(READ_ONLY)?;
            check_kind(&(row.get)(object, address)?, &value)?;
            setter(object, address, value)
        }
        Some(Resolved::Custom(property)) => {
            let setter = property.set.clone().ok_or(READ_ONLY)?;
            check_kind(&property.template(), &value)?;
            setter(value)
        }
        None => Err(unknown(address)),
    }
}
