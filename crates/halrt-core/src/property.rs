//! Property addressing and typed property values.
//!
//! The host addresses properties by `(selector, scope, element)`. Values
//! cross the boundary as a [`PropertyValue`], a tagged variant whose
//! [`byte_size`](PropertyValue::byte_size) matches what the host's wire
//! layout would occupy, so size queries and buffer checks work uniformly.
//!
//! Each object class declares a static table of [`Property`] entries; see
//! [`crate::dispatch`] for how they are evaluated.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use halrt_registry::ObjectId;

use crate::error::Result;
use crate::format::{ChannelDescription, RangedFormat, StreamFormat, ValueRange};

/// Four-character property selector.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Selector(u32);

macro_rules! selectors {
    ($($(#[$doc:meta])* $name:ident = $code:literal;)*) => {
        impl Selector {
            $(
                $(#[$doc])*
                pub const $name: Self = Self::from_fourcc($code);
            )*
        }
    };
}

selectors! {
    /// Class id of the object's base class.
    BASE_CLASS = b"bcls";
    /// Class id of the object.
    CLASS = b"clas";
    /// Id of the owning object.
    OWNER = b"stdv";
    /// Human-readable name.
    NAME = b"lnam";
    /// Human-readable manufacturer.
    MANUFACTURER = b"lmak";
    /// Ids of owned objects, filtered by scope.
    OWNED_OBJECTS = b"ownd";
    /// Custom property descriptors.
    CUSTOM_PROPERTY_INFO_LIST = b"cust";

    /// Plugin: device ids.
    DEVICE_LIST = b"dev#";
    /// Plugin: resource bundle path.
    RESOURCE_BUNDLE = b"rsrc";

    /// Device: persistent UID.
    DEVICE_UID = b"uid ";
    /// Device: model UID.
    MODEL_UID = b"muid";
    /// Device: serial number.
    SERIAL_NUMBER = b"snum";
    /// Device: firmware version.
    FIRMWARE_VERSION = b"fwvn";
    /// Device: transport type.
    TRANSPORT_TYPE = b"tran";
    /// Device: clock domain.
    CLOCK_DOMAIN = b"clkd";
    /// Device: clock is stable.
    CLOCK_IS_STABLE = b"cstb";
    /// Device: alive flag.
    DEVICE_IS_ALIVE = b"livn";
    /// Device: running flag.
    DEVICE_IS_RUNNING = b"goin";
    /// Device: hidden flag.
    IS_HIDDEN = b"hidn";
    /// Device: may be the default device.
    CAN_BE_DEFAULT_DEVICE = b"dflt";
    /// Device: may be the default system-sound device.
    CAN_BE_DEFAULT_SYSTEM_DEVICE = b"sflt";
    /// Device/stream: latency in frames.
    LATENCY = b"ltnc";
    /// Device: safety offset in frames.
    SAFETY_OFFSET = b"saft";
    /// Device: frames between zero timestamps.
    ZERO_TIMESTAMP_PERIOD = b"ring";
    /// Device: nominal sample rate.
    NOMINAL_SAMPLE_RATE = b"nsrt";
    /// Device: available nominal sample rates.
    AVAILABLE_NOMINAL_SAMPLE_RATES = b"nsr#";
    /// Device: stream ids by scope.
    STREAMS = b"stm#";
    /// Device: control ids by scope.
    CONTROL_LIST = b"ctrl";
    /// Device: preferred stereo channel pair.
    PREFERRED_CHANNELS_FOR_STEREO = b"dch2";
    /// Device: preferred channel layout.
    PREFERRED_CHANNEL_LAYOUT = b"srnd";

    /// Stream: active flag.
    IS_ACTIVE = b"sact";
    /// Stream: direction.
    DIRECTION = b"sdir";
    /// Stream: terminal type.
    TERMINAL_TYPE = b"term";
    /// Stream: first device channel.
    STARTING_CHANNEL = b"schn";
    /// Stream: virtual format.
    VIRTUAL_FORMAT = b"sfmt";
    /// Stream: available virtual formats.
    AVAILABLE_VIRTUAL_FORMATS = b"sfma";
    /// Stream: physical format.
    PHYSICAL_FORMAT = b"pft ";
    /// Stream: available physical formats.
    AVAILABLE_PHYSICAL_FORMATS = b"pfta";

    /// Control: scope.
    CONTROL_SCOPE = b"cscp";
    /// Control: element.
    CONTROL_ELEMENT = b"celm";
    /// Boolean control: value.
    BOOLEAN_CONTROL_VALUE = b"bcvl";
    /// Level control: value on a 0..=1 scale.
    LEVEL_SCALAR_VALUE = b"lcsv";
    /// Level control: value in decibels.
    LEVEL_DECIBEL_VALUE = b"lcdv";
    /// Level control: decibel range.
    LEVEL_DECIBEL_RANGE = b"lcdr";
}

impl Selector {
    /// Selector from its four-character code.
    pub const fn from_fourcc(code: &[u8; 4]) -> Self {
        Self(u32::from_be_bytes(*code))
    }

    /// Selector from a raw host value.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw host value.
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0.to_be_bytes();
        if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
            write!(f, "{}", String::from_utf8_lossy(&bytes))
        } else {
            write!(f, "{:#010x}", self.0)
        }
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Selector({self})")
    }
}

/// Property scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Applies to the whole object.
    #[default]
    Global,
    /// Input side.
    Input,
    /// Output side.
    Output,
    /// Play-through side.
    PlayThrough,
}

impl Scope {
    /// Four-character host code.
    pub const fn code(self) -> u32 {
        match self {
            Scope::Global => u32::from_be_bytes(*b"glob"),
            Scope::Input => u32::from_be_bytes(*b"inpt"),
            Scope::Output => u32::from_be_bytes(*b"outp"),
            Scope::PlayThrough => u32::from_be_bytes(*b"ptru"),
        }
    }

    /// Scope for a host code, if recognized.
    pub const fn from_code(code: u32) -> Option<Self> {
        match &code.to_be_bytes() {
            b"glob" => Some(Scope::Global),
            b"inpt" => Some(Scope::Input),
            b"outp" => Some(Scope::Output),
            b"ptru" => Some(Scope::PlayThrough),
            _ => None,
        }
    }

    /// Whether objects registered under `other` are visible when listing
    /// with this scope. Global sees everything.
    pub fn matches(self, other: Scope) -> bool {
        self == Scope::Global || self == other
    }
}

/// The main element of any property.
pub const ELEMENT_MAIN: u32 = 0;

/// Full address of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyAddress {
    /// Which property.
    pub selector: Selector,
    /// Which side of the object.
    pub scope: Scope,
    /// Which element (channel); 0 is main.
    pub element: u32,
}

impl PropertyAddress {
    /// Address with explicit scope and element.
    pub const fn new(selector: Selector, scope: Scope, element: u32) -> Self {
        Self {
            selector,
            scope,
            element,
        }
    }

    /// Global-scope, main-element address.
    pub const fn global(selector: Selector) -> Self {
        Self::new(selector, Scope::Global, ELEMENT_MAIN)
    }

    /// Main-element address in `scope`.
    pub const fn scoped(selector: Selector, scope: Scope) -> Self {
        Self::new(selector, scope, ELEMENT_MAIN)
    }
}

/// Data type of a custom property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CustomPropertyKind {
    /// A string value.
    String,
    /// A string-keyed dictionary.
    PropertyList,
}

impl CustomPropertyKind {
    /// Four-character host code.
    pub const fn code(self) -> u32 {
        match self {
            CustomPropertyKind::String => u32::from_be_bytes(*b"cfst"),
            CustomPropertyKind::PropertyList => u32::from_be_bytes(*b"plst"),
        }
    }
}

/// Entry of the custom property info list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomPropertyInfo {
    /// Selector of the custom property.
    pub selector: Selector,
    /// Data type of values.
    pub kind: CustomPropertyKind,
}

/// A typed property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// 32-bit unsigned value (also class ids, enums, and counts).
    U32(u32),
    /// 64-bit float value.
    F64(f64),
    /// Boolean, carried as a 32-bit value on the wire.
    Bool(bool),
    /// String reference.
    String(String),
    /// String-keyed dictionary reference.
    PropertyList(BTreeMap<String, String>),
    /// Single object id.
    ObjectId(ObjectId),
    /// List of object ids.
    ObjectIds(Vec<ObjectId>),
    /// List of value ranges.
    ValueRanges(Vec<ValueRange>),
    /// Stream format.
    Format(StreamFormat),
    /// List of formats with their rate ranges.
    RangedFormats(Vec<RangedFormat>),
    /// Channel layout built from descriptions.
    Channels(Vec<ChannelDescription>),
    /// Pair of channel numbers.
    ChannelPair([u32; 2]),
    /// Custom property descriptors.
    CustomPropertyInfos(Vec<CustomPropertyInfo>),
}

/// Bytes of a host object reference (string or dictionary).
const REFERENCE_SIZE: usize = 8;
const VALUE_RANGE_SIZE: usize = 16;
const STREAM_FORMAT_SIZE: usize = 40;
const RANGED_FORMAT_SIZE: usize = STREAM_FORMAT_SIZE + VALUE_RANGE_SIZE;
const CHANNEL_LAYOUT_HEADER_SIZE: usize = 12;
const CHANNEL_DESCRIPTION_SIZE: usize = 20;
const CUSTOM_PROPERTY_INFO_SIZE: usize = 12;

impl PropertyValue {
    /// Size of the value in the host's wire layout.
    pub fn byte_size(&self) -> usize {
        match self {
            PropertyValue::U32(_) | PropertyValue::Bool(_) | PropertyValue::ObjectId(_) => 4,
            PropertyValue::F64(_) => 8,
            PropertyValue::String(_) | PropertyValue::PropertyList(_) => REFERENCE_SIZE,
            PropertyValue::ObjectIds(ids) => ids.len() * 4,
            PropertyValue::ValueRanges(ranges) => ranges.len() * VALUE_RANGE_SIZE,
            PropertyValue::Format(_) => STREAM_FORMAT_SIZE,
            PropertyValue::RangedFormats(formats) => formats.len() * RANGED_FORMAT_SIZE,
            PropertyValue::Channels(chans) => {
                CHANNEL_LAYOUT_HEADER_SIZE + chans.len() * CHANNEL_DESCRIPTION_SIZE
            }
            PropertyValue::ChannelPair(_) => 8,
            PropertyValue::CustomPropertyInfos(infos) => infos.len() * CUSTOM_PROPERTY_INFO_SIZE,
        }
    }

    /// Whether `other` has the same variant.
    pub fn same_kind(&self, other: &PropertyValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// The value as `u32`, if it is one.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            PropertyValue::U32(v) => Some(*v),
            _ => None,
        }
    }

    /// The value as `f64`, if it is one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::F64(v) => Some(*v),
            _ => None,
        }
    }

    /// The value as `bool`, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// The value as a string slice, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(v) => Some(v),
            _ => None,
        }
    }

    /// The value as an id list, if it is one.
    pub fn as_object_ids(&self) -> Option<&[ObjectId]> {
        match self {
            PropertyValue::ObjectIds(v) => Some(v),
            _ => None,
        }
    }
}

/// Reads a property of `O`.
pub type Getter<O> = fn(&O, &PropertyAddress) -> Result<PropertyValue>;

/// Writes a property of `O`. The value has already been checked to be of the
/// same variant the getter returns.
pub type Setter<O> = fn(&O, &PropertyAddress, PropertyValue) -> Result<()>;

/// One row of a class property table.
pub struct Property<O: ?Sized + 'static> {
    /// Selector this row answers.
    pub selector: Selector,
    /// Reads the value.
    pub get: Getter<O>,
    /// Writes the value, if the property is settable.
    pub set: Option<Setter<O>>,
}

impl<O: ?Sized> Property<O> {
    /// Read-only row.
    pub const fn read_only(selector: Selector, get: Getter<O>) -> Self {
        Self {
            selector,
            get,
            set: None,
        }
    }

    /// Settable row.
    pub const fn settable(selector: Selector, get: Getter<O>, set: Setter<O>) -> Self {
        Self {
            selector,
            get,
            set: Some(set),
        }
    }
}

/// Custom property getter.
pub type CustomGetter = Arc<dyn Fn() -> PropertyValue + Send + Sync>;

/// Custom property setter.
pub type CustomSetter = Arc<dyn Fn(PropertyValue) -> Result<()> + Send + Sync>;

/// A property registered at runtime on a single object.
#[derive(Clone)]
pub struct CustomProperty {
    pub(crate) info: CustomPropertyInfo,
    pub(crate) get: CustomGetter,
    pub(crate) set: Option<CustomSetter>,
}

impl CustomProperty {
    /// Descriptor of this property.
    pub fn info(&self) -> CustomPropertyInfo {
        self.info
    }

    /// Zero value of this property's kind, used to type-check sets.
    pub(crate) fn template(&self) -> PropertyValue {
        match self.info.kind {
            CustomPropertyKind::String => PropertyValue::String(String::new()),
            CustomPropertyKind::PropertyList => PropertyValue::PropertyList(BTreeMap::new()),
        }
    }
}

impl fmt::Debug for CustomProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomProperty")
            .field("info", &self.info)
            .field("settable", &self.set.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_display_is_fourcc() {
        assert_eq!(Selector::NAME.to_string(), "lnam");
        assert_eq!(Selector::DEVICE_UID.to_string(), "uid ");
        assert_eq!(Selector::new(1).to_string(), "0x00000001");
        assert_eq!(format!("{:?}", Selector::CLASS), "Selector(clas)");
    }

    #[test]
    fn scope_codes_round_trip() {
        for scope in [Scope::Global, Scope::Input, Scope::Output, Scope::PlayThrough] {
            assert_eq!(Scope::from_code(scope.code()), Some(scope));
        }
        assert_eq!(Scope::from_code(0), None);
    }

    #[test]
    fn global_scope_matches_all() {
        assert!(Scope::Global.matches(Scope::Input));
        assert!(Scope::Output.matches(Scope::Output));
        assert!(!Scope::Input.matches(Scope::Output));
    }

    #[test]
    fn byte_sizes() {
        assert_eq!(PropertyValue::U32(1).byte_size(), 4);
        assert_eq!(PropertyValue::Bool(true).byte_size(), 4);
        assert_eq!(PropertyValue::F64(1.0).byte_size(), 8);
        assert_eq!(
            PropertyValue::ObjectIds(vec![ObjectId::new(2), ObjectId::new(3)]).byte_size(),
            8
        );
        assert_eq!(PropertyValue::ObjectIds(Vec::new()).byte_size(), 0);
        assert_eq!(
            PropertyValue::Channels(vec![ChannelDescription::default(); 2]).byte_size(),
            52
        );
        assert_eq!(
            PropertyValue::Format(StreamFormat::default()).byte_size(),
            40
        );
    }

    #[test]
    fn same_kind_ignores_payload() {
        assert!(PropertyValue::U32(1).same_kind(&PropertyValue::U32(9)));
        assert!(!PropertyValue::U32(1).same_kind(&PropertyValue::F64(1.0)));
    }
}
