//! The managed side of the bridge: types callables declare and the values they exchange.
//!
//! [`ManagedType`] replaces runtime reflection. Every registered callable declares its
//! parameter and return types with it, and converters are keyed on it. [`Managed`] is the
//! runtime value a callable receives or returns; opaque objects are carried as
//! [`ObjectRef`]s, which is what the heap stores behind a handle.

use std::{any::Any, fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::value::TaggedValue;

/// Name of a managed class, cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassName(Arc<str>);

impl ClassName {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClassName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ClassName {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl From<&ClassName> for ClassName {
    fn from(name: &ClassName) -> Self {
        name.clone()
    }
}

impl PartialEq<str> for ClassName {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl fmt::Display for ClassName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A managed type as declared by a callable or a converter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ManagedType {
    Boolean,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Char,
    String,
    /// The root reference type; accepts any non-`Value` type.
    Object,
    /// A raw [`TaggedValue`] handed to the callable without conversion.
    Value,
    /// A user class whose instances cross the boundary as object handles.
    Class(ClassName),
    Array(Box<ManagedType>),
}

impl ManagedType {
    #[must_use]
    pub fn array_of(element: Self) -> Self {
        Self::Array(Box::new(element))
    }

    #[must_use]
    pub fn class(name: impl Into<ClassName>) -> Self {
        Self::Class(name.into())
    }

    /// Returns the element type of an array type.
    #[must_use]
    pub fn element(&self) -> Option<&Self> {
        match self {
            Self::Array(element) => Some(element),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    #[must_use]
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Self::Boolean | Self::Byte | Self::Short | Self::Int | Self::Long | Self::Float | Self::Double | Self::Char
        )
    }

    /// Whether a value of type `other` may be used where `self` is required.
    ///
    /// Types are assignable to themselves. `Object` accepts everything except `Value`,
    /// and `Object[]` accepts arrays of any non-primitive element type.
    #[must_use]
    pub fn is_assignable_from(&self, other: &Self) -> bool {
        if self == other {
            return true;
        }
        match (self, other) {
            (Self::Object, other) => *other != Self::Value,
            (Self::Array(required), Self::Array(actual)) => {
                **required == Self::Object && !actual.is_primitive() && **actual != Self::Value
            }
            _ => false,
        }
    }
}

impl fmt::Display for ManagedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean => f.write_str("boolean"),
            Self::Byte => f.write_str("byte"),
            Self::Short => f.write_str("short"),
            Self::Int => f.write_str("int"),
            Self::Long => f.write_str("long"),
            Self::Float => f.write_str("float"),
            Self::Double => f.write_str("double"),
            Self::Char => f.write_str("char"),
            Self::String => f.write_str("String"),
            Self::Object => f.write_str("Object"),
            Self::Value => f.write_str("Value"),
            Self::Class(name) => write!(f, "{name}"),
            Self::Array(element) => write!(f, "{element}[]"),
        }
    }
}

/// An opaque managed object: a shared, type-erased value tagged with its class.
#[derive(Clone)]
pub struct ObjectRef {
    class: ClassName,
    value: Arc<dyn Any + Send + Sync>,
}

impl ObjectRef {
    pub fn new<T: Any + Send + Sync>(class: impl Into<ClassName>, value: T) -> Self {
        Self {
            class: class.into(),
            value: Arc::new(value),
        }
    }

    #[must_use]
    pub fn class(&self) -> &ClassName {
        &self.class
    }

    /// Borrows the object as `T` if that is its concrete type.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }

    /// Returns a shared pointer to the object as `T` if that is its concrete type.
    #[must_use]
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.value).downcast().ok()
    }

    /// Identity comparison: true when both refer to the same allocation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRef")
            .field("class", &self.class)
            .field("addr", &Arc::as_ptr(&self.value).cast::<()>())
            .finish()
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

/// A managed array with its declared element type.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedArray {
    pub element: ManagedType,
    pub items: Vec<Managed>,
}

/// A runtime managed value.
#[derive(Debug, Clone, PartialEq)]
pub enum Managed {
    Null,
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Char(char),
    String(String),
    Array(ManagedArray),
    /// A host value passed through unconverted.
    Value(TaggedValue),
    Object(ObjectRef),
}

impl Managed {
    /// Builds an array value.
    #[must_use]
    pub fn array(element: ManagedType, items: Vec<Self>) -> Self {
        Self::Array(ManagedArray { element, items })
    }

    /// Wraps a Rust value as a managed object of the given class.
    pub fn object<T: Any + Send + Sync>(class: impl Into<ClassName>, value: T) -> Self {
        Self::Object(ObjectRef::new(class, value))
    }

    /// The concrete type of this value, `None` for `Null`.
    #[must_use]
    pub fn runtime_type(&self) -> Option<ManagedType> {
        Some(match self {
            Self::Null => return None,
            Self::Boolean(_) => ManagedType::Boolean,
            Self::Byte(_) => ManagedType::Byte,
            Self::Short(_) => ManagedType::Short,
            Self::Int(_) => ManagedType::Int,
            Self::Long(_) => ManagedType::Long,
            Self::Float(_) => ManagedType::Float,
            Self::Double(_) => ManagedType::Double,
            Self::Char(_) => ManagedType::Char,
            Self::String(_) => ManagedType::String,
            Self::Array(array) => ManagedType::array_of(array.element.clone()),
            Self::Value(_) => ManagedType::Value,
            Self::Object(object) => ManagedType::Class(object.class().clone()),
        })
    }

    /// Human-readable type name for error messages.
    #[must_use]
    pub fn type_name(&self) -> String {
        self.runtime_type().map_or_else(|| "null".to_owned(), |t| t.to_string())
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Widens any numeric value to `f64`.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Byte(v) => Some(f64::from(*v)),
            Self::Short(v) => Some(f64::from(*v)),
            Self::Int(v) => Some(f64::from(*v)),
            Self::Long(v) => Some(*v as f64),
            Self::Float(v) => Some(f64::from(*v)),
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Widens any integral value to `i64`.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Byte(v) => Some(i64::from(*v)),
            Self::Short(v) => Some(i64::from(*v)),
            Self::Int(v) => Some(i64::from(*v)),
            Self::Long(v) => Some(*v),
            _ => None,
        }
    }
}

macro_rules! managed_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Managed {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

managed_from! {
    bool => Boolean,
    i8 => Byte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    char => Char,
    String => String,
    TaggedValue => Value,
    ObjectRef => Object,
    ManagedArray => Array,
}

impl From<&str> for Managed {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

/// Error returned when a [`Managed`] value cannot be extracted as the requested Rust type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractError {
    /// The type that was expected (e.g. "int", "String").
    pub expected: &'static str,
    /// The actual type of the value.
    pub actual: String,
}

impl ExtractError {
    #[must_use]
    pub fn new(expected: &'static str, value: &Managed) -> Self {
        Self {
            expected,
            actual: value.type_name(),
        }
    }
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected {}, got {}", self.expected, self.actual)
    }
}

impl std::error::Error for ExtractError {}

/// Extraction of a Rust value from a decoded argument.
///
/// Numeric extraction widens (an `int` argument reads as `i64` or `f64`) but never narrows.
pub trait FromManaged: Sized {
    fn from_managed(value: &Managed) -> Result<Self, ExtractError>;
}

impl FromManaged for Managed {
    fn from_managed(value: &Managed) -> Result<Self, ExtractError> {
        Ok(value.clone())
    }
}

impl FromManaged for bool {
    fn from_managed(value: &Managed) -> Result<Self, ExtractError> {
        match value {
            Managed::Boolean(b) => Ok(*b),
            other => Err(ExtractError::new("boolean", other)),
        }
    }
}

impl FromManaged for i8 {
    fn from_managed(value: &Managed) -> Result<Self, ExtractError> {
        match value {
            Managed::Byte(v) => Ok(*v),
            other => Err(ExtractError::new("byte", other)),
        }
    }
}

impl FromManaged for i16 {
    fn from_managed(value: &Managed) -> Result<Self, ExtractError> {
        match value {
            Managed::Short(v) => Ok(*v),
            Managed::Byte(v) => Ok(Self::from(*v)),
            other => Err(ExtractError::new("short", other)),
        }
    }
}

impl FromManaged for i32 {
    fn from_managed(value: &Managed) -> Result<Self, ExtractError> {
        match value {
            Managed::Int(v) => Ok(*v),
            Managed::Short(v) => Ok(Self::from(*v)),
            Managed::Byte(v) => Ok(Self::from(*v)),
            other => Err(ExtractError::new("int", other)),
        }
    }
}

impl FromManaged for i64 {
    fn from_managed(value: &Managed) -> Result<Self, ExtractError> {
        value.as_i64().ok_or_else(|| ExtractError::new("long", value))
    }
}

impl FromManaged for f32 {
    fn from_managed(value: &Managed) -> Result<Self, ExtractError> {
        match value {
            Managed::Float(v) => Ok(*v),
            Managed::Short(v) => Ok(Self::from(*v)),
            Managed::Byte(v) => Ok(Self::from(*v)),
            other => Err(ExtractError::new("float", other)),
        }
    }
}

impl FromManaged for f64 {
    fn from_managed(value: &Managed) -> Result<Self, ExtractError> {
        value.as_f64().ok_or_else(|| ExtractError::new("double", value))
    }
}

impl FromManaged for char {
    fn from_managed(value: &Managed) -> Result<Self, ExtractError> {
        match value {
            Managed::Char(c) => Ok(*c),
            other => Err(ExtractError::new("char", other)),
        }
    }
}

impl FromManaged for String {
    fn from_managed(value: &Managed) -> Result<Self, ExtractError> {
        match value {
            Managed::String(s) => Ok(s.clone()),
            Managed::Char(c) => Ok(c.to_string()),
            other => Err(ExtractError::new("String", other)),
        }
    }
}

impl FromManaged for TaggedValue {
    fn from_managed(value: &Managed) -> Result<Self, ExtractError> {
        match value {
            Managed::Value(v) => Ok(v.clone()),
            other => Err(ExtractError::new("Value", other)),
        }
    }
}

impl FromManaged for ObjectRef {
    fn from_managed(value: &Managed) -> Result<Self, ExtractError> {
        match value {
            Managed::Object(object) => Ok(object.clone()),
            other => Err(ExtractError::new("Object", other)),
        }
    }
}

impl<T: FromManaged> FromManaged for Option<T> {
    fn from_managed(value: &Managed) -> Result<Self, ExtractError> {
        match value {
            Managed::Null => Ok(None),
            other => T::from_managed(other).map(Some),
        }
    }
}

impl<T: FromManaged> FromManaged for Vec<T> {
    fn from_managed(value: &Managed) -> Result<Self, ExtractError> {
        match value {
            Managed::Array(array) => array.items.iter().map(T::from_managed).collect(),
            other => Err(ExtractError::new("array", other)),
        }
    }
}
