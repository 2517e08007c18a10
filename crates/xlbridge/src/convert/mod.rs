//! Bidirectional conversion between managed values and tagged host values.
//!
//! A [`TypeConverter`] owns one `(managed type, host variant)` pair and converts in both
//! directions. Converters never see each other directly: compound converters (arrays)
//! resolve their element converters through the registry carried by [`Conversion`].

mod array;
mod object;
mod scalar;

use std::fmt;

use crate::{
    error::BridgeError,
    heap::Heap,
    managed::{Managed, ManagedType, ObjectRef},
    registry::ConverterRegistry,
    value::{HostType, ObjectHandle, TaggedValue},
};

pub use self::{
    array::{Array2DConverter, ArrayConverter},
    object::{NilConverter, ObjectHandleConverter, RawValueConverter},
    scalar::{BooleanConverter, CharConverter, NumberConverter, NumericStringConverter, StringConverter},
};

/// Which way a lookup converts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    ToHost,
    ToManaged,
}

/// Registry lookup key.
///
/// Decoding knows both the incoming host variant and the required managed type.
/// Encoding only knows the runtime managed type, so `host` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeMapping {
    pub managed: ManagedType,
    pub host: Option<HostType>,
    pub direction: Direction,
}

impl TypeMapping {
    #[must_use]
    pub fn decoding(host: HostType, managed: ManagedType) -> Self {
        Self {
            managed,
            host: Some(host),
            direction: Direction::ToManaged,
        }
    }

    #[must_use]
    pub fn encoding(managed: ManagedType) -> Self {
        Self {
            managed,
            host: None,
            direction: Direction::ToHost,
        }
    }
}

impl fmt::Display for TypeMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.direction, self.host) {
            (Direction::ToManaged, Some(host)) => write!(f, "{host} -> {}", self.managed),
            (Direction::ToManaged, None) => write!(f, "? -> {}", self.managed),
            (Direction::ToHost, _) => write!(f, "{} -> ?", self.managed),
        }
    }
}

/// A single bidirectional conversion unit.
///
/// The `expected` arguments are advisory: they may be `None` (array elements resolved by
/// runtime type) and are only used to disambiguate, never to coerce the result type.
pub trait TypeConverter: fmt::Debug + Send + Sync {
    /// The managed half of the mapping.
    fn managed_type(&self) -> &ManagedType;

    /// The host half of the mapping, `None` when every variant is accepted.
    fn host_type(&self) -> Option<HostType>;

    /// Higher wins when several converters match. Ties go to the first registered.
    fn priority(&self) -> i32 {
        0
    }

    /// Whether this converter can decode a `host` value into a slot of type `required`.
    fn accepts_host(&self, host: HostType, required: &ManagedType) -> bool {
        self.host_type().is_none_or(|own| own == host) && required.is_assignable_from(self.managed_type())
    }

    /// Whether this converter can encode a value whose runtime type is `runtime`.
    fn accepts_managed(&self, runtime: &ManagedType) -> bool {
        self.managed_type().is_assignable_from(runtime)
    }

    fn to_host(
        &self,
        cx: &Conversion<'_>,
        expected: Option<HostType>,
        value: &Managed,
    ) -> Result<TaggedValue, BridgeError>;

    fn to_managed(
        &self,
        cx: &Conversion<'_>,
        expected: Option<&ManagedType>,
        value: &TaggedValue,
    ) -> Result<Managed, BridgeError>;
}

/// Everything a converter may need besides its own state: the registry for element
/// lookups and the heap for object handles.
#[derive(Debug, Clone)]
pub struct Conversion<'a> {
    registry: &'a ConverterRegistry,
    heap: &'a Heap,
}

impl<'a> Conversion<'a> {
    #[must_use]
    pub fn new(registry: &'a ConverterRegistry, heap: &'a Heap) -> Self {
        Self { registry, heap }
    }

    #[must_use]
    pub fn registry(&self) -> &'a ConverterRegistry {
        self.registry
    }

    #[must_use]
    pub fn heap(&self) -> &'a Heap {
        self.heap
    }

    /// Decodes `value` into `required` with the best registered converter.
    pub fn to_managed(&self, value: &TaggedValue, required: &ManagedType) -> Result<Managed, BridgeError> {
        let host = value.host_type();
        let converter = self
            .registry
            .find_converter_for(host, required)
            .ok_or_else(|| BridgeError::no_converter(host, required))?;
        converter.to_managed(self, Some(required), value)
    }

    /// Encodes `value` with the converter for its runtime type, minting a heap handle
    /// when no converter exists.
    pub fn to_host(&self, value: &Managed) -> Result<TaggedValue, BridgeError> {
        let Some(runtime) = value.runtime_type() else {
            return Err(BridgeError::NullArgument("cannot encode a null value".to_owned()));
        };
        match self.registry.find_converter(&runtime) {
            Some(converter) => converter.to_host(self, None, value),
            None => Ok(self.mint(value)),
        }
    }

    /// Stores the value in the heap and returns a handle to it.
    ///
    /// Managed objects are stored as they are; any other value is boxed under its type
    /// name so it can still be passed back later.
    #[must_use]
    pub fn mint(&self, value: &Managed) -> TaggedValue {
        let object = match value {
            Managed::Object(object) => object.clone(),
            other => ObjectRef::new(other.type_name(), other.clone()),
        };
        let class = object.class().clone();
        let handle = self.heap.mint(object);
        TaggedValue::Object(ObjectHandle::new(class, handle))
    }
}

/// Rejects `Managed::Null`; no converter ever defaults an absent value.
pub(crate) fn reject_null<'v>(value: &'v Managed, target: &ManagedType) -> Result<&'v Managed, BridgeError> {
    if value.is_null() {
        Err(BridgeError::NullArgument(format!("null {target} value")))
    } else {
        Ok(value)
    }
}
