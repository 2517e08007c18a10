//! The host-side value model.
//!
//! [`TaggedValue`] is the closed set of variants the spreadsheet host exchanges with the
//! bridge. Every argument arrives as one and every result leaves as one, errors included.
//! Reference-like variants (`Reference`, `MultiReference`, `SheetId`, `Range`, `BigData`)
//! are carried through untouched; the marshalling core never interprets them.

use std::{
    fmt::{self, Write},
    hash::{Hash, Hasher},
};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::{heap::Handle, managed::ClassName};

/// Error codes the host can display in a cell.
///
/// Uses strum derives so the `Display`/`FromStr` forms are the host's own spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum ErrorCode {
    /// A null intersection, also used for "no usable value".
    #[strum(serialize = "#NULL!")]
    Null,
    #[strum(serialize = "#DIV/0!")]
    Div0,
    /// A value of the wrong type.
    #[strum(serialize = "#VALUE!")]
    Value,
    /// An invalid reference, used for stale object handles.
    #[strum(serialize = "#REF!")]
    Ref,
    /// An unrecognised name.
    #[strum(serialize = "#NAME?")]
    Name,
    #[strum(serialize = "#NUM!")]
    Num,
    #[strum(serialize = "#N/A")]
    NotAvailable,
    #[strum(serialize = "#GETTING_DATA")]
    GettingData,
}

/// The discriminant of a [`TaggedValue`], used as the host half of a type mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum HostType {
    String,
    Number,
    Boolean,
    Error,
    Missing,
    Nil,
    Object,
    Array,
    Reference,
    MultiReference,
    SheetId,
    Range,
    BigData,
}

/// A value exchanged across the host boundary.
///
/// Equality and hashing are structural. `Number` compares by bit pattern so that `Hash`
/// stays consistent with `Eq`; `Object` compares by handle and declared class, never by
/// the managed object the handle refers to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaggedValue {
    String(String),
    /// Double precision number. Integer inputs are stored losslessly up to 2^53.
    Number(f64),
    Boolean(bool),
    Error(ErrorCode),
    /// An argument the caller omitted.
    Missing,
    /// An empty cell, also the filler for padded array slots.
    Nil,
    /// An opaque reference to a managed object living in the heap.
    Object(ObjectHandle),
    Array(HostArray),
    /// A reference to an area of the calling sheet.
    Reference(CellRange),
    /// References to one or more areas of a specific sheet.
    MultiReference { sheet: SheetId, ranges: Vec<CellRange> },
    SheetId(SheetId),
    /// A bare rectangular area that is not bound to a sheet.
    Range(CellRange),
    BigData(BigData),
}

impl TaggedValue {
    /// Returns the variant discriminant.
    #[must_use]
    pub fn host_type(&self) -> HostType {
        match self {
            Self::String(_) => HostType::String,
            Self::Number(_) => HostType::Number,
            Self::Boolean(_) => HostType::Boolean,
            Self::Error(_) => HostType::Error,
            Self::Missing => HostType::Missing,
            Self::Nil => HostType::Nil,
            Self::Object(_) => HostType::Object,
            Self::Array(_) => HostType::Array,
            Self::Reference(_) => HostType::Reference,
            Self::MultiReference { .. } => HostType::MultiReference,
            Self::SheetId(_) => HostType::SheetId,
            Self::Range(_) => HostType::Range,
            Self::BigData(_) => HostType::BigData,
        }
    }

    /// Returns true for the `Error` variant.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Returns the object handle if this is an `Object` value.
    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectHandle> {
        match self {
            Self::Object(handle) => Some(handle),
            _ => None,
        }
    }
}

impl PartialEq for TaggedValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::String(a), Self::String(b)) => a == b,
            // to_bits() keeps equality consistent with Hash
            (Self::Number(a), Self::Number(b)) => a.to_bits() == b.to_bits(),
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Error(a), Self::Error(b)) => a == b,
            (Self::Missing, Self::Missing) | (Self::Nil, Self::Nil) => true,
            (Self::Object(a), Self::Object(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Reference(a), Self::Reference(b)) | (Self::Range(a), Self::Range(b)) => a == b,
            (
                Self::MultiReference {
                    sheet: a_sheet,
                    ranges: a_ranges,
                },
                Self::MultiReference {
                    sheet: b_sheet,
                    ranges: b_ranges,
                },
            ) => a_sheet == b_sheet && a_ranges == b_ranges,
            (Self::SheetId(a), Self::SheetId(b)) => a == b,
            (Self::BigData(a), Self::BigData(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for TaggedValue {}

impl Hash for TaggedValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::String(s) => s.hash(state),
            Self::Number(n) => n.to_bits().hash(state),
            Self::Boolean(b) => b.hash(state),
            Self::Error(code) => code.hash(state),
            Self::Missing | Self::Nil => {}
            Self::Object(handle) => handle.hash(state),
            Self::Array(array) => array.hash(state),
            Self::Reference(range) | Self::Range(range) => range.hash(state),
            Self::MultiReference { sheet, ranges } => {
                sheet.hash(state);
                ranges.hash(state);
            }
            Self::SheetId(sheet) => sheet.hash(state),
            Self::BigData(data) => data.hash(state),
        }
    }
}

impl fmt::Display for TaggedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
            Self::Boolean(true) => f.write_str("TRUE"),
            Self::Boolean(false) => f.write_str("FALSE"),
            Self::Error(code) => write!(f, "{code}"),
            Self::Missing | Self::Nil => Ok(()),
            Self::Object(handle) => write!(f, "{handle}"),
            Self::Array(array) => write!(f, "{{{}x{} array}}", array.rows(), array.columns()),
            Self::Reference(range) | Self::Range(range) => write!(f, "{range}"),
            Self::MultiReference { sheet, ranges } => {
                write!(f, "[{sheet}]")?;
                for (i, range) in ranges.iter().enumerate() {
                    if i > 0 {
                        f.write_char(',')?;
                    }
                    write!(f, "{range}")?;
                }
                Ok(())
            }
            Self::SheetId(sheet) => write!(f, "[{sheet}]"),
            Self::BigData(BigData::Inline(bytes)) => write!(f, "<{} bytes>", bytes.len()),
            Self::BigData(BigData::Handle { handle, length }) => write!(f, "<data #{handle}, {length} bytes>"),
        }
    }
}

impl From<f64> for TaggedValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<f32> for TaggedValue {
    fn from(value: f32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<i64> for TaggedValue {
    /// Exact for magnitudes up to 2^53, rounded to the nearest double beyond that.
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<i32> for TaggedValue {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<i16> for TaggedValue {
    fn from(value: i16) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<i8> for TaggedValue {
    fn from(value: i8) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<bool> for TaggedValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<&str> for TaggedValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for TaggedValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<ErrorCode> for TaggedValue {
    fn from(code: ErrorCode) -> Self {
        Self::Error(code)
    }
}

impl From<ObjectHandle> for TaggedValue {
    fn from(handle: ObjectHandle) -> Self {
        Self::Object(handle)
    }
}

impl From<HostArray> for TaggedValue {
    fn from(array: HostArray) -> Self {
        Self::Array(array)
    }
}

/// A host-side reference to a managed object: the heap handle plus the object's class.
///
/// Equality and hashing use the handle alone. The class is descriptive; two values with
/// the same handle refer to the same heap entry whatever class they claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectHandle {
    /// Declared class of the referenced object, used for narrowing on retrieval.
    pub class: ClassName,
    pub handle: Handle,
}

impl ObjectHandle {
    #[must_use]
    pub fn new(class: impl Into<ClassName>, handle: Handle) -> Self {
        Self {
            class: class.into(),
            handle,
        }
    }

    /// Renders the handle as cell text, e.g. `&Person-17` for marker `&`.
    #[must_use]
    pub fn to_host_string(&self, marker: char) -> String {
        format!("{marker}{}-{}", self.class, self.handle.raw())
    }

    /// Parses text produced by [`Self::to_host_string`].
    ///
    /// Returns `None` unless the text is the marker, a non-empty class name, `-`, and an
    /// integer handle.
    #[must_use]
    pub fn parse_host_string(text: &str, marker: char) -> Option<Self> {
        let body = text.strip_prefix(marker)?;
        let (class, raw) = body.rsplit_once('-')?;
        if class.is_empty() {
            return None;
        }
        let raw: i64 = raw.parse().ok()?;
        Some(Self::new(class, Handle::new(raw)))
    }
}

impl PartialEq for ObjectHandle {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl Eq for ObjectHandle {}

impl Hash for ObjectHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.handle.hash(state);
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} #{}>", self.class, self.handle.raw())
    }
}

/// A rectangular grid of tagged values.
///
/// Every slot is populated: ragged input is padded on the right and bottom with
/// [`TaggedValue::Nil`], and an empty input becomes a single `Nil` cell. Cells are stored
/// row-major.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<Vec<TaggedValue>>", into = "Vec<Vec<TaggedValue>>")]
pub struct HostArray {
    rows: usize,
    columns: usize,
    cells: Vec<TaggedValue>,
}

impl HostArray {
    /// Builds a grid from possibly ragged rows, padding short rows with `Nil`.
    pub fn from_rows<R, C>(rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator<Item = TaggedValue>,
    {
        let rows: Vec<Vec<TaggedValue>> = rows.into_iter().map(|row| row.into_iter().collect()).collect();
        let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
        if rows.is_empty() || columns == 0 {
            return Self {
                rows: 1,
                columns: 1,
                cells: vec![TaggedValue::Nil],
            };
        }
        let row_count = rows.len();
        let mut cells = Vec::with_capacity(row_count * columns);
        for mut row in rows {
            row.resize(columns, TaggedValue::Nil);
            cells.extend(row);
        }
        Self {
            rows: row_count,
            columns,
            cells,
        }
    }

    /// Builds a 1×N grid.
    pub fn row(values: impl IntoIterator<Item = TaggedValue>) -> Self {
        Self::from_rows([values.into_iter().collect::<Vec<_>>()])
    }

    /// Builds an N×1 grid.
    pub fn column(values: impl IntoIterator<Item = TaggedValue>) -> Self {
        Self::from_rows(values.into_iter().map(|value| [value]))
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Total number of cells, `rows * columns`.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Always false: a grid has at least one cell.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[must_use]
    pub fn get(&self, row: usize, column: usize) -> Option<&TaggedValue> {
        if row >= self.rows || column >= self.columns {
            return None;
        }
        self.cells.get(row * self.columns + column)
    }

    /// Iterates the rows as slices.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[TaggedValue]> {
        self.cells.chunks(self.columns)
    }

    #[must_use]
    pub fn is_row(&self) -> bool {
        self.rows == 1
    }

    #[must_use]
    pub fn is_column(&self) -> bool {
        self.columns == 1
    }

    /// Reads the grid as a one-dimensional sequence.
    ///
    /// A single row (including 1×1) yields that row; anything else yields the first
    /// column, so 1×N and N×1 grids holding the same values produce the same sequence.
    pub fn vector(&self) -> impl ExactSizeIterator<Item = &TaggedValue> {
        let (step, len) = if self.is_row() { (1, self.columns) } else { (self.columns, self.rows) };
        self.cells.iter().step_by(step).take(len)
    }

    /// Copies the grid out as a list of rows.
    #[must_use]
    pub fn to_rows(&self) -> Vec<Vec<TaggedValue>> {
        self.iter_rows().map(<[TaggedValue]>::to_vec).collect()
    }
}

impl From<Vec<Vec<TaggedValue>>> for HostArray {
    fn from(rows: Vec<Vec<TaggedValue>>) -> Self {
        Self::from_rows(rows)
    }
}

impl From<HostArray> for Vec<Vec<TaggedValue>> {
    fn from(array: HostArray) -> Self {
        array.to_rows()
    }
}

/// Error returned when a [`CellRange`] would have a first index after its last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeError {
    pub axis: &'static str,
    pub first: u32,
    pub last: u32,
}

impl fmt::Display for RangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "first {} {} is after last {} {}", self.axis, self.first, self.axis, self.last)
    }
}

impl std::error::Error for RangeError {}

/// Unchecked bounds as they appear in serialized form.
#[derive(Deserialize)]
struct RangeBounds {
    row_first: u32,
    row_last: u32,
    column_first: u32,
    column_last: u32,
}

impl TryFrom<RangeBounds> for CellRange {
    type Error = RangeError;

    fn try_from(bounds: RangeBounds) -> Result<Self, RangeError> {
        Self::new(bounds.row_first, bounds.row_last, bounds.column_first, bounds.column_last)
    }
}

/// A rectangular area of a sheet, zero-based and inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RangeBounds")]
pub struct CellRange {
    row_first: u32,
    row_last: u32,
    column_first: u32,
    column_last: u32,
}

impl CellRange {
    pub fn new(row_first: u32, row_last: u32, column_first: u32, column_last: u32) -> Result<Self, RangeError> {
        if row_first > row_last {
            return Err(RangeError {
                axis: "row",
                first: row_first,
                last: row_last,
            });
        }
        if column_first > column_last {
            return Err(RangeError {
                axis: "column",
                first: column_first,
                last: column_last,
            });
        }
        Ok(Self {
            row_first,
            row_last,
            column_first,
            column_last,
        })
    }

    #[must_use]
    pub fn cell(row: u32, column: u32) -> Self {
        Self {
            row_first: row,
            row_last: row,
            column_first: column,
            column_last: column,
        }
    }

    #[must_use]
    pub fn row_first(&self) -> u32 {
        self.row_first
    }

    #[must_use]
    pub fn row_last(&self) -> u32 {
        self.row_last
    }

    #[must_use]
    pub fn column_first(&self) -> u32 {
        self.column_first
    }

    #[must_use]
    pub fn column_last(&self) -> u32 {
        self.column_last
    }

    #[must_use]
    pub fn is_single_row(&self) -> bool {
        self.row_first == self.row_last
    }

    #[must_use]
    pub fn is_single_column(&self) -> bool {
        self.column_first == self.column_last
    }

    #[must_use]
    pub fn is_single_cell(&self) -> bool {
        self.is_single_row() && self.is_single_column()
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}C{}", self.row_first + 1, self.column_first + 1)?;
        if !self.is_single_cell() {
            write!(f, ":R{}C{}", self.row_last + 1, self.column_last + 1)?;
        }
        Ok(())
    }
}

/// Host identifier of a worksheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SheetId(u64);

impl SheetId {
    #[must_use]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SheetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sheet {}", self.0)
    }
}

/// A binary blob, either carried inline or referenced through a host-side handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BigData {
    Inline(Vec<u8>),
    Handle { handle: u64, length: u64 },
}
