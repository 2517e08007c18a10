//! Double dispatch over [`TaggedValue`] variants.
//!
//! Implementors override only the variants they understand. Every default method fails
//! with [`BridgeError::UnsupportedVariant`], so a partial visitor rejects unexpected
//! input instead of misreading it.

use crate::{
    error::BridgeError,
    value::{BigData, CellRange, ErrorCode, HostArray, HostType, ObjectHandle, SheetId, TaggedValue},
};

pub trait TaggedValueVisitor {
    type Output;

    fn visit_string(&mut self, _value: &str) -> Result<Self::Output, BridgeError> {
        Err(BridgeError::UnsupportedVariant(HostType::String))
    }

    fn visit_number(&mut self, _value: f64) -> Result<Self::Output, BridgeError> {
        Err(BridgeError::UnsupportedVariant(HostType::Number))
    }

    fn visit_boolean(&mut self, _value: bool) -> Result<Self::Output, BridgeError> {
        Err(BridgeError::UnsupportedVariant(HostType::Boolean))
    }

    fn visit_error(&mut self, _code: ErrorCode) -> Result<Self::Output, BridgeError> {
        Err(BridgeError::UnsupportedVariant(HostType::Error))
    }

    fn visit_missing(&mut self) -> Result<Self::Output, BridgeError> {
        Err(BridgeError::UnsupportedVariant(HostType::Missing))
    }

    fn visit_nil(&mut self) -> Result<Self::Output, BridgeError> {
        Err(BridgeError::UnsupportedVariant(HostType::Nil))
    }

    fn visit_object(&mut self, _handle: &ObjectHandle) -> Result<Self::Output, BridgeError> {
        Err(BridgeError::UnsupportedVariant(HostType::Object))
    }

    fn visit_array(&mut self, _array: &HostArray) -> Result<Self::Output, BridgeError> {
        Err(BridgeError::UnsupportedVariant(HostType::Array))
    }

    fn visit_reference(&mut self, _range: &CellRange) -> Result<Self::Output, BridgeError> {
        Err(BridgeError::UnsupportedVariant(HostType::Reference))
    }

    fn visit_multi_reference(&mut self, _sheet: SheetId, _ranges: &[CellRange]) -> Result<Self::Output, BridgeError> {
        Err(BridgeError::UnsupportedVariant(HostType::MultiReference))
    }

    fn visit_sheet_id(&mut self, _sheet: SheetId) -> Result<Self::Output, BridgeError> {
        Err(BridgeError::UnsupportedVariant(HostType::SheetId))
    }

    fn visit_range(&mut self, _range: &CellRange) -> Result<Self::Output, BridgeError> {
        Err(BridgeError::UnsupportedVariant(HostType::Range))
    }

    fn visit_big_data(&mut self, _data: &BigData) -> Result<Self::Output, BridgeError> {
        Err(BridgeError::UnsupportedVariant(HostType::BigData))
    }
}

impl TaggedValue {
    /// Dispatches to the visitor method for this variant.
    pub fn accept<V: TaggedValueVisitor + ?Sized>(&self, visitor: &mut V) -> Result<V::Output, BridgeError> {
        match self {
            Self::String(s) => visitor.visit_string(s),
            Self::Number(n) => visitor.visit_number(*n),
            Self::Boolean(b) => visitor.visit_boolean(*b),
            Self::Error(code) => visitor.visit_error(*code),
            Self::Missing => visitor.visit_missing(),
            Self::Nil => visitor.visit_nil(),
            Self::Object(handle) => visitor.visit_object(handle),
            Self::Array(array) => visitor.visit_array(array),
            Self::Reference(range) => visitor.visit_reference(range),
            Self::MultiReference { sheet, ranges } => visitor.visit_multi_reference(*sheet, ranges),
            Self::SheetId(sheet) => visitor.visit_sheet_id(*sheet),
            Self::Range(range) => visitor.visit_range(range),
            Self::BigData(data) => visitor.visit_big_data(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OnlyNumbers;

    impl TaggedValueVisitor for OnlyNumbers {
        type Output = f64;

        fn visit_number(&mut self, value: f64) -> Result<f64, BridgeError> {
            Ok(value * 2.0)
        }
    }

    #[test]
    fn overridden_variant_is_dispatched() {
        assert_eq!(TaggedValue::Number(2.5).accept(&mut OnlyNumbers), Ok(5.0));
    }

    #[test]
    fn default_methods_report_the_variant() {
        assert_eq!(
            TaggedValue::from("x").accept(&mut OnlyNumbers),
            Err(BridgeError::UnsupportedVariant(HostType::String))
        );
        assert_eq!(
            TaggedValue::Missing.accept(&mut OnlyNumbers),
            Err(BridgeError::UnsupportedVariant(HostType::Missing))
        );
        assert_eq!(
            TaggedValue::SheetId(SheetId::new(3)).accept(&mut OnlyNumbers),
            Err(BridgeError::UnsupportedVariant(HostType::SheetId))
        );
    }
}
