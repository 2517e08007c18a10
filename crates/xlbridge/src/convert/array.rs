//! Array converters.
//!
//! One-dimensional arrays read a host grid as a vector (a row, or the first column) and
//! are written back as a single row. Two-dimensional arrays map row for row; jagged
//! managed input is padded with `Nil` by [`HostArray::from_rows`].

use std::sync::Arc;

use super::{Conversion, TypeConverter, reject_null};
use crate::{
    error::BridgeError,
    managed::{Managed, ManagedType},
    value::{HostArray, HostType, TaggedValue},
};

/// Converter used for the previous element, reused while consecutive cells share a variant.
type LastConverter = Option<(HostType, Arc<dyn TypeConverter>)>;

fn decode_element(
    cx: &Conversion<'_>,
    element: &ManagedType,
    cell: &TaggedValue,
    last: &mut LastConverter,
) -> Result<Managed, BridgeError> {
    let host = cell.host_type();
    // nested grids travel unconverted unless the element type is itself an array
    if host == HostType::Array && !element.is_array() {
        return Ok(Managed::Value(cell.clone()));
    }
    let cached = last
        .as_ref()
        .filter(|(seen, _)| *seen == host)
        .map(|(_, converter)| Arc::clone(converter));
    let converter = match cached {
        Some(converter) => converter,
        None => {
            let converter = cx
                .registry()
                .find_converter_for(host, element)
                .ok_or_else(|| BridgeError::no_converter(host, element))?;
            *last = Some((host, Arc::clone(&converter)));
            converter
        }
    };
    converter.to_managed(cx, Some(element), cell)
}

/// `Null` elements become `Nil` cells.
fn encode_element(cx: &Conversion<'_>, item: &Managed) -> Result<TaggedValue, BridgeError> {
    match item {
        Managed::Null => Ok(TaggedValue::Nil),
        item => cx.to_host(item),
    }
}

fn expect_array<'v>(value: &'v TaggedValue, target: &ManagedType) -> Result<&'v HostArray, BridgeError> {
    match value {
        TaggedValue::Array(array) => Ok(array),
        other => Err(BridgeError::type_mismatch(target, other.host_type())),
    }
}

/// A one-dimensional managed array to and from `Array`.
#[derive(Debug)]
pub struct ArrayConverter {
    managed: ManagedType,
    element: ManagedType,
}

impl ArrayConverter {
    #[must_use]
    pub fn new(element: ManagedType) -> Self {
        Self {
            managed: ManagedType::array_of(element.clone()),
            element,
        }
    }
}

impl TypeConverter for ArrayConverter {
    fn managed_type(&self) -> &ManagedType {
        &self.managed
    }

    fn host_type(&self) -> Option<HostType> {
        Some(HostType::Array)
    }

    fn priority(&self) -> i32 {
        10
    }

    fn accepts_host(&self, host: HostType, required: &ManagedType) -> bool {
        host == HostType::Array && *required == self.managed
    }

    /// `Object[]` also encodes arrays of strings, classes and raw values, but never
    /// nested arrays, which belong to the two-dimensional converters.
    fn accepts_managed(&self, runtime: &ManagedType) -> bool {
        match runtime.element() {
            Some(element) if self.element == ManagedType::Object => !element.is_primitive() && !element.is_array(),
            Some(element) => *element == self.element,
            None => false,
        }
    }

    fn to_host(
        &self,
        cx: &Conversion<'_>,
        _expected: Option<HostType>,
        value: &Managed,
    ) -> Result<TaggedValue, BridgeError> {
        let Managed::Array(array) = reject_null(value, &self.managed)? else {
            return Err(BridgeError::type_mismatch(&self.managed, value.type_name()));
        };
        let cells = array
            .items
            .iter()
            .map(|item| encode_element(cx, item))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TaggedValue::Array(HostArray::row(cells)))
    }

    fn to_managed(
        &self,
        cx: &Conversion<'_>,
        _expected: Option<&ManagedType>,
        value: &TaggedValue,
    ) -> Result<Managed, BridgeError> {
        let array = expect_array(value, &self.managed)?;
        let mut last = None;
        let items = array
            .vector()
            .map(|cell| decode_element(cx, &self.element, cell, &mut last))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Managed::array(self.element.clone(), items))
    }
}

/// A two-dimensional managed array (array of rows) to and from `Array`.
#[derive(Debug)]
pub struct Array2DConverter {
    managed: ManagedType,
    row: ManagedType,
    element: ManagedType,
    priority: i32,
}

impl Array2DConverter {
    #[must_use]
    pub fn new(element: ManagedType, priority: i32) -> Self {
        let row = ManagedType::array_of(element.clone());
        Self {
            managed: ManagedType::array_of(row.clone()),
            row,
            element,
            priority,
        }
    }
}

impl TypeConverter for Array2DConverter {
    fn managed_type(&self) -> &ManagedType {
        &self.managed
    }

    fn host_type(&self) -> Option<HostType> {
        Some(HostType::Array)
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn accepts_host(&self, host: HostType, required: &ManagedType) -> bool {
        host == HostType::Array && *required == self.managed
    }

    /// `Object[][]` also encodes two-dimensional arrays of strings, classes and raw values.
    fn accepts_managed(&self, runtime: &ManagedType) -> bool {
        match runtime.element().and_then(ManagedType::element) {
            Some(element) if self.element == ManagedType::Object => !element.is_primitive() && !element.is_array(),
            Some(element) => *element == self.element,
            None => false,
        }
    }

    fn to_host(
        &self,
        cx: &Conversion<'_>,
        _expected: Option<HostType>,
        value: &Managed,
    ) -> Result<TaggedValue, BridgeError> {
        let Managed::Array(array) = reject_null(value, &self.managed)? else {
            return Err(BridgeError::type_mismatch(&self.managed, value.type_name()));
        };
        let mut rows = Vec::with_capacity(array.items.len());
        for row in &array.items {
            let cells = match row {
                Managed::Null => Vec::new(),
                Managed::Array(row) => row
                    .items
                    .iter()
                    .map(|item| encode_element(cx, item))
                    .collect::<Result<Vec<_>, _>>()?,
                other => return Err(BridgeError::type_mismatch(&self.row, other.type_name())),
            };
            rows.push(cells);
        }
        Ok(TaggedValue::Array(HostArray::from_rows(rows)))
    }

    fn to_managed(
        &self,
        cx: &Conversion<'_>,
        _expected: Option<&ManagedType>,
        value: &TaggedValue,
    ) -> Result<Managed, BridgeError> {
        let array = expect_array(value, &self.managed)?;
        let mut last = None;
        let mut rows = Vec::with_capacity(array.rows());
        for row in array.iter_rows() {
            let items = row
                .iter()
                .map(|cell| decode_element(cx, &self.element, cell, &mut last))
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(Managed::array(self.element.clone(), items));
        }
        Ok(Managed::array(self.row.clone(), rows))
    }
}
