//! Converters for opaque objects, empty cells and raw tagged values.

use super::{Conversion, TypeConverter, reject_null};
use crate::{
    error::BridgeError,
    managed::{Managed, ManagedType},
    value::{HostType, TaggedValue},
};

/// Managed objects to and from `Object` handles.
///
/// Decoding resolves the handle through the heap. A stale handle is an
/// `InvalidReference`, and when a specific class is required the stored object's class
/// must match it. Encoding mints a new handle for every value.
#[derive(Debug)]
pub struct ObjectHandleConverter {
    managed: ManagedType,
}

impl Default for ObjectHandleConverter {
    fn default() -> Self {
        Self {
            managed: ManagedType::Object,
        }
    }
}

impl TypeConverter for ObjectHandleConverter {
    fn managed_type(&self) -> &ManagedType {
        &self.managed
    }

    fn host_type(&self) -> Option<HostType> {
        Some(HostType::Object)
    }

    fn accepts_host(&self, host: HostType, required: &ManagedType) -> bool {
        host == HostType::Object && matches!(required, ManagedType::Object | ManagedType::Class(_))
    }

    fn to_host(
        &self,
        cx: &Conversion<'_>,
        _expected: Option<HostType>,
        value: &Managed,
    ) -> Result<TaggedValue, BridgeError> {
        Ok(cx.mint(reject_null(value, &self.managed)?))
    }

    fn to_managed(
        &self,
        cx: &Conversion<'_>,
        expected: Option<&ManagedType>,
        value: &TaggedValue,
    ) -> Result<Managed, BridgeError> {
        let Some(handle) = value.as_object() else {
            return Err(BridgeError::type_mismatch(HostType::Object, value.host_type()));
        };
        let object = cx
            .heap()
            .get(handle.handle)
            .ok_or(BridgeError::InvalidReference(handle.handle))?;
        if let Some(ManagedType::Class(required)) = expected
            && object.class() != required
        {
            return Err(BridgeError::type_mismatch(required, object.class()));
        }
        Ok(Managed::Object(object))
    }
}

/// Empty and omitted cells to `null` for reference-typed slots. Decoding only.
#[derive(Debug)]
pub struct NilConverter {
    managed: ManagedType,
}

impl Default for NilConverter {
    fn default() -> Self {
        Self {
            managed: ManagedType::Object,
        }
    }
}

impl TypeConverter for NilConverter {
    fn managed_type(&self) -> &ManagedType {
        &self.managed
    }

    fn host_type(&self) -> Option<HostType> {
        Some(HostType::Nil)
    }

    fn priority(&self) -> i32 {
        -5
    }

    fn accepts_host(&self, host: HostType, required: &ManagedType) -> bool {
        matches!(host, HostType::Nil | HostType::Missing)
            && matches!(required, ManagedType::Object | ManagedType::Class(_))
    }

    fn accepts_managed(&self, _runtime: &ManagedType) -> bool {
        false
    }

    fn to_host(
        &self,
        _cx: &Conversion<'_>,
        _expected: Option<HostType>,
        value: &Managed,
    ) -> Result<TaggedValue, BridgeError> {
        Err(BridgeError::no_converter(value.type_name(), HostType::Nil))
    }

    fn to_managed(
        &self,
        _cx: &Conversion<'_>,
        _expected: Option<&ManagedType>,
        value: &TaggedValue,
    ) -> Result<Managed, BridgeError> {
        match value {
            TaggedValue::Nil | TaggedValue::Missing => Ok(Managed::Null),
            other => Err(BridgeError::type_mismatch(HostType::Nil, other.host_type())),
        }
    }
}

/// Hands tagged values to `Value`-typed slots untouched, and returns them untouched.
#[derive(Debug)]
pub struct RawValueConverter {
    managed: ManagedType,
}

impl Default for RawValueConverter {
    fn default() -> Self {
        Self {
            managed: ManagedType::Value,
        }
    }
}

impl TypeConverter for RawValueConverter {
    fn managed_type(&self) -> &ManagedType {
        &self.managed
    }

    fn host_type(&self) -> Option<HostType> {
        None
    }

    fn priority(&self) -> i32 {
        -10
    }

    fn to_host(
        &self,
        _cx: &Conversion<'_>,
        _expected: Option<HostType>,
        value: &Managed,
    ) -> Result<TaggedValue, BridgeError> {
        match reject_null(value, &self.managed)? {
            Managed::Value(value) => Ok(value.clone()),
            other => Err(BridgeError::type_mismatch(&self.managed, other.type_name())),
        }
    }

    fn to_managed(
        &self,
        _cx: &Conversion<'_>,
        _expected: Option<&ManagedType>,
        value: &TaggedValue,
    ) -> Result<Managed, BridgeError> {
        Ok(Managed::Value(value.clone()))
    }
}
