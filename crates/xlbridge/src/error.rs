//! Error types for the bridge.
//!
//! [`BridgeError`] is the per-call taxonomy: every variant is reduced to a host
//! [`ErrorCode`] at the call boundary and never escapes as a Rust error. The remaining
//! types describe failures outside a single call: [`UnknownExport`] and
//! [`RegistrationError`] are configuration defects, and [`InvocationError`] is what
//! registered callables return.

use std::fmt;

use crate::{
    dispatch::ExportId,
    heap::Handle,
    managed::ExtractError,
    value::{ErrorCode, HostType, TaggedValue},
};

/// A failure local to one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// A required value was absent, e.g. an instance call without a receiver or a null
    /// managed value handed to a converter.
    NullArgument(String),
    /// An object handle that was never minted or has been released.
    InvalidReference(Handle),
    /// No converter maps between the two types.
    NoConverter { source: String, target: String },
    /// The invoked callable failed or panicked.
    InvocationFailure(String),
    /// A tagged-value variant reached code that does not handle it.
    UnsupportedVariant(HostType),
    /// A value of the wrong shape or class reached a converter or the receiver slot.
    TypeMismatch { expected: String, actual: String },
    /// A value of the right variant could not be parsed or narrowed to the target.
    Conversion { target: String, message: String },
    /// More arguments than a non-variadic callable declares.
    ArgumentCount { expected: usize, actual: usize },
}

impl BridgeError {
    pub fn no_converter(source: impl fmt::Display, target: impl fmt::Display) -> Self {
        Self::NoConverter {
            source: source.to_string(),
            target: target.to_string(),
        }
    }

    pub fn type_mismatch(expected: impl fmt::Display, actual: impl fmt::Display) -> Self {
        Self::TypeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub fn conversion(target: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::Conversion {
            target: target.to_string(),
            message: message.into(),
        }
    }

    /// The host error code this failure is reported as.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::NullArgument(_) | Self::InvocationFailure(_) => ErrorCode::Null,
            Self::InvalidReference(_) => ErrorCode::Ref,
            Self::NoConverter { .. }
            | Self::UnsupportedVariant(_)
            | Self::TypeMismatch { .. }
            | Self::Conversion { .. }
            | Self::ArgumentCount { .. } => ErrorCode::Value,
        }
    }

    /// Reduces the failure to the tagged value returned across the boundary.
    #[must_use]
    pub fn into_value(self) -> TaggedValue {
        TaggedValue::Error(self.error_code())
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NullArgument(what) => write!(f, "null argument: {what}"),
            Self::InvalidReference(handle) => write!(f, "invalid object handle {handle}"),
            Self::NoConverter { source, target } => write!(f, "no converter from {source} to {target}"),
            Self::InvocationFailure(message) => write!(f, "invocation failed: {message}"),
            Self::UnsupportedVariant(host) => write!(f, "unsupported value variant {host}"),
            Self::TypeMismatch { expected, actual } => write!(f, "expected {expected}, got {actual}"),
            Self::Conversion { target, message } => write!(f, "cannot convert to {target}: {message}"),
            Self::ArgumentCount { expected, actual } => {
                write!(f, "expected at most {expected} arguments, got {actual}")
            }
        }
    }
}

impl std::error::Error for BridgeError {}

/// A call named an export that was never registered.
///
/// Not a per-call error: it means the transport's export list and the registration
/// table disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnknownExport {
    Id(ExportId),
    Name(String),
}

impl fmt::Display for UnknownExport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "no callable registered for export {id}"),
            Self::Name(name) => write!(f, "no callable registered under the name `{name}`"),
        }
    }
}

impl std::error::Error for UnknownExport {}

/// Failure while building the dispatch table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    DuplicateExport(ExportId),
    /// The descriptor is internally inconsistent.
    InvalidDescriptor { name: String, reason: &'static str },
    /// The transport's export list does not match the registered exports.
    ExportMismatch {
        missing: Vec<ExportId>,
        unexpected: Vec<ExportId>,
    },
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateExport(id) => write!(f, "export {id} registered twice"),
            Self::InvalidDescriptor { name, reason } => write!(f, "invalid descriptor for `{name}`: {reason}"),
            Self::ExportMismatch { missing, unexpected } => {
                write!(f, "export list mismatch: ")?;
                write_ids(f, "not registered", missing)?;
                if !missing.is_empty() && !unexpected.is_empty() {
                    f.write_str("; ")?;
                }
                write_ids(f, "not exported", unexpected)
            }
        }
    }
}

fn write_ids(f: &mut fmt::Formatter<'_>, label: &str, ids: &[ExportId]) -> fmt::Result {
    if ids.is_empty() {
        return Ok(());
    }
    write!(f, "{label} [")?;
    for (i, id) in ids.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{id}")?;
    }
    f.write_str("]")
}

impl std::error::Error for RegistrationError {}

/// Error returned by a registered callable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationError {
    message: String,
}

impl InvocationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for InvocationError {}

impl From<BridgeError> for InvocationError {
    fn from(err: BridgeError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<ExtractError> for InvocationError {
    fn from(err: ExtractError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<UnknownExport> for InvocationError {
    fn from(err: UnknownExport) -> Self {
        Self::new(err.to_string())
    }
}

impl From<&str> for InvocationError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for InvocationError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}
