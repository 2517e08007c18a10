//! Converters for single values: numbers, booleans, strings and characters.

use num_traits::{Bounded, NumCast, ToPrimitive};

use super::{Conversion, TypeConverter, reject_null};
use crate::{
    error::BridgeError,
    managed::{Managed, ManagedType},
    value::{HostType, TaggedValue},
    visitor::TaggedValueVisitor,
};

fn out_of_range(target: &ManagedType, n: impl std::fmt::Display) -> BridgeError {
    BridgeError::conversion(target, format!("{n} is out of range"))
}

/// Converts to an integer type, truncating toward zero.
///
/// `i64::MAX` has no exact `f64` image and encodes as 2^63, so the nearest `f64` to a
/// type's upper bound decodes to that bound. Anything further out is an error.
fn integer<T: NumCast + Bounded>(target: &ManagedType, n: f64) -> Result<T, BridgeError> {
    num_traits::cast(n)
        .or_else(|| (n.trunc() == T::max_value().to_f64()?).then(T::max_value))
        .ok_or_else(|| out_of_range(target, n))
}

/// Narrows a host number to the numeric managed type `target`.
///
/// Integer targets truncate toward zero; values outside the target's range (and NaN)
/// are a conversion error rather than a silent wrap.
fn narrow(target: &ManagedType, n: f64) -> Result<Managed, BridgeError> {
    Ok(match target {
        ManagedType::Double => Managed::Double(n),
        ManagedType::Float => Managed::Float(num_traits::cast(n).ok_or_else(|| out_of_range(target, n))?),
        ManagedType::Long => Managed::Long(integer(target, n)?),
        ManagedType::Int => Managed::Int(integer(target, n)?),
        ManagedType::Short => Managed::Short(integer(target, n)?),
        ManagedType::Byte => Managed::Byte(integer(target, n)?),
        other => return Err(BridgeError::type_mismatch("numeric type", other)),
    })
}

/// Narrows an exactly parsed integer. `None` for non-integer targets.
fn narrow_exact(target: &ManagedType, i: i64) -> Option<Result<Managed, BridgeError>> {
    fn exact<T: NumCast>(target: &ManagedType, i: i64) -> Result<T, BridgeError> {
        num_traits::cast(i).ok_or_else(|| out_of_range(target, i))
    }
    let managed = match target {
        ManagedType::Long => Ok(Managed::Long(i)),
        ManagedType::Int => exact(target, i).map(Managed::Int),
        ManagedType::Short => exact(target, i).map(Managed::Short),
        ManagedType::Byte => exact(target, i).map(Managed::Byte),
        _ => return None,
    };
    Some(managed)
}

/// Reads a `Number` variant.
struct NumberVisitor;

impl TaggedValueVisitor for NumberVisitor {
    type Output = f64;

    fn visit_number(&mut self, value: f64) -> Result<f64, BridgeError> {
        Ok(value)
    }
}

/// Reads a `String` variant.
struct TextVisitor;

impl TaggedValueVisitor for TextVisitor {
    type Output = String;

    fn visit_string(&mut self, value: &str) -> Result<String, BridgeError> {
        Ok(value.to_owned())
    }
}

/// Reads a `Boolean` variant.
struct BooleanVisitor;

impl TaggedValueVisitor for BooleanVisitor {
    type Output = bool;

    fn visit_boolean(&mut self, value: bool) -> Result<bool, BridgeError> {
        Ok(value)
    }
}

/// `double`, `float`, `long`, `int`, `short` or `byte` to and from `Number`.
#[derive(Debug)]
pub struct NumberConverter {
    managed: ManagedType,
}

impl NumberConverter {
    /// Non-numeric types are accepted here and rejected at conversion time.
    #[must_use]
    pub fn new(managed: ManagedType) -> Self {
        Self { managed }
    }
}

impl TypeConverter for NumberConverter {
    fn managed_type(&self) -> &ManagedType {
        &self.managed
    }

    fn host_type(&self) -> Option<HostType> {
        Some(HostType::Number)
    }

    fn priority(&self) -> i32 {
        10
    }

    fn to_host(
        &self,
        _cx: &Conversion<'_>,
        _expected: Option<HostType>,
        value: &Managed,
    ) -> Result<TaggedValue, BridgeError> {
        let value = reject_null(value, &self.managed)?;
        value
            .as_f64()
            .map(TaggedValue::Number)
            .ok_or_else(|| BridgeError::type_mismatch(&self.managed, value.type_name()))
    }

    fn to_managed(
        &self,
        _cx: &Conversion<'_>,
        _expected: Option<&ManagedType>,
        value: &TaggedValue,
    ) -> Result<Managed, BridgeError> {
        let n = value.accept(&mut NumberVisitor)?;
        narrow(&self.managed, n)
    }
}

/// Numbers rendered as and parsed from text. Low priority so `Number` is preferred.
#[derive(Debug)]
pub struct NumericStringConverter {
    managed: ManagedType,
}

impl NumericStringConverter {
    #[must_use]
    pub fn new(managed: ManagedType) -> Self {
        Self { managed }
    }
}

impl TypeConverter for NumericStringConverter {
    fn managed_type(&self) -> &ManagedType {
        &self.managed
    }

    fn host_type(&self) -> Option<HostType> {
        Some(HostType::String)
    }

    fn priority(&self) -> i32 {
        -1
    }

    fn to_host(
        &self,
        _cx: &Conversion<'_>,
        _expected: Option<HostType>,
        value: &Managed,
    ) -> Result<TaggedValue, BridgeError> {
        let text = match reject_null(value, &self.managed)? {
            Managed::Byte(v) => v.to_string(),
            Managed::Short(v) => v.to_string(),
            Managed::Int(v) => v.to_string(),
            Managed::Long(v) => v.to_string(),
            Managed::Float(v) => v.to_string(),
            Managed::Double(v) => v.to_string(),
            other => return Err(BridgeError::type_mismatch(&self.managed, other.type_name())),
        };
        Ok(TaggedValue::String(text))
    }

    fn to_managed(
        &self,
        _cx: &Conversion<'_>,
        _expected: Option<&ManagedType>,
        value: &TaggedValue,
    ) -> Result<Managed, BridgeError> {
        let text = value.accept(&mut TextVisitor)?;
        // integer text is read exactly so longs beyond 2^53 keep every digit
        if let Ok(i) = text.trim().parse::<i64>()
            && let Some(managed) = narrow_exact(&self.managed, i)
        {
            return managed;
        }
        let n: f64 = text
            .trim()
            .parse()
            .map_err(|_| BridgeError::conversion(&self.managed, format!("`{text}` is not a number")))?;
        narrow(&self.managed, n)
    }
}

/// `boolean` to and from `Boolean`.
#[derive(Debug)]
pub struct BooleanConverter {
    managed: ManagedType,
}

impl Default for BooleanConverter {
    fn default() -> Self {
        Self {
            managed: ManagedType::Boolean,
        }
    }
}

impl TypeConverter for BooleanConverter {
    fn managed_type(&self) -> &ManagedType {
        &self.managed
    }

    fn host_type(&self) -> Option<HostType> {
        Some(HostType::Boolean)
    }

    fn priority(&self) -> i32 {
        10
    }

    fn to_host(
        &self,
        _cx: &Conversion<'_>,
        _expected: Option<HostType>,
        value: &Managed,
    ) -> Result<TaggedValue, BridgeError> {
        match reject_null(value, &self.managed)? {
            Managed::Boolean(b) => Ok(TaggedValue::Boolean(*b)),
            other => Err(BridgeError::type_mismatch(&self.managed, other.type_name())),
        }
    }

    fn to_managed(
        &self,
        _cx: &Conversion<'_>,
        _expected: Option<&ManagedType>,
        value: &TaggedValue,
    ) -> Result<Managed, BridgeError> {
        value.accept(&mut BooleanVisitor).map(Managed::Boolean)
    }
}

/// `String` to and from `String`.
#[derive(Debug)]
pub struct StringConverter {
    managed: ManagedType,
}

impl Default for StringConverter {
    fn default() -> Self {
        Self {
            managed: ManagedType::String,
        }
    }
}

impl TypeConverter for StringConverter {
    fn managed_type(&self) -> &ManagedType {
        &self.managed
    }

    fn host_type(&self) -> Option<HostType> {
        Some(HostType::String)
    }

    fn priority(&self) -> i32 {
        10
    }

    fn to_host(
        &self,
        _cx: &Conversion<'_>,
        _expected: Option<HostType>,
        value: &Managed,
    ) -> Result<TaggedValue, BridgeError> {
        match reject_null(value, &self.managed)? {
            Managed::String(s) => Ok(TaggedValue::String(s.clone())),
            other => Err(BridgeError::type_mismatch(&self.managed, other.type_name())),
        }
    }

    fn to_managed(
        &self,
        _cx: &Conversion<'_>,
        _expected: Option<&ManagedType>,
        value: &TaggedValue,
    ) -> Result<Managed, BridgeError> {
        value.accept(&mut TextVisitor).map(Managed::String)
    }
}

/// `char` to and from a one-character `String`.
#[derive(Debug)]
pub struct CharConverter {
    managed: ManagedType,
}

impl Default for CharConverter {
    fn default() -> Self {
        Self {
            managed: ManagedType::Char,
        }
    }
}

impl TypeConverter for CharConverter {
    fn managed_type(&self) -> &ManagedType {
        &self.managed
    }

    fn host_type(&self) -> Option<HostType> {
        Some(HostType::String)
    }

    fn priority(&self) -> i32 {
        5
    }

    fn to_host(
        &self,
        _cx: &Conversion<'_>,
        _expected: Option<HostType>,
        value: &Managed,
    ) -> Result<TaggedValue, BridgeError> {
        match reject_null(value, &self.managed)? {
            Managed::Char(c) => Ok(TaggedValue::String(c.to_string())),
            other => Err(BridgeError::type_mismatch(&self.managed, other.type_name())),
        }
    }

    fn to_managed(
        &self,
        _cx: &Conversion<'_>,
        _expected: Option<&ManagedType>,
        value: &TaggedValue,
    ) -> Result<Managed, BridgeError> {
        let text = value.accept(&mut TextVisitor)?;
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(Managed::Char(c)),
            _ => Err(BridgeError::conversion(
                &self.managed,
                format!("`{text}` is not a single character"),
            )),
        }
    }
}
