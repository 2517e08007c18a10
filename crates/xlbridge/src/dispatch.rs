//! The call dispatcher: the entry point the host transport calls into.
//!
//! Exports are registered once through a [`DispatcherBuilder`]. Building consumes the
//! builder, so the export table is immutable by the time the first call arrives and the
//! read path needs no synchronisation.

use std::{borrow::Cow, fmt};

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::{
    bridge::Bridge,
    error::{RegistrationError, UnknownExport},
    invoker::{Callable, CallableDescriptor, Invoker},
    value::{ErrorCode, ObjectHandle, TaggedValue},
};

/// Stable identifier of one registered callable, assigned by the host transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExportId(u32);

impl ExportId {
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ExportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Collects exports before the dispatcher is built.
#[derive(Debug)]
pub struct DispatcherBuilder {
    bridge: Bridge,
    exports: AHashMap<ExportId, Invoker>,
    names: AHashMap<String, Vec<ExportId>>,
}

impl DispatcherBuilder {
    /// Registers a callable under `id`.
    ///
    /// Callables sharing a name form an overload set, tried in registration order by
    /// [`Dispatcher::invoke_by_name`].
    pub fn register(
        &mut self,
        id: ExportId,
        descriptor: CallableDescriptor,
        callable: Callable,
    ) -> Result<&mut Self, RegistrationError> {
        descriptor.validate()?;
        if self.exports.contains_key(&id) {
            return Err(RegistrationError::DuplicateExport(id));
        }
        tracing::info!(export = id.0, callable = %descriptor, "registered export");
        self.names.entry(descriptor.name().to_owned()).or_default().push(id);
        self.exports.insert(id, Invoker::new(descriptor, callable));
        Ok(self)
    }

    /// Registers every entry, stopping at the first error.
    pub fn register_all(
        &mut self,
        entries: impl IntoIterator<Item = (ExportId, CallableDescriptor, Callable)>,
    ) -> Result<&mut Self, RegistrationError> {
        for (id, descriptor, callable) in entries {
            self.register(id, descriptor, callable)?;
        }
        Ok(self)
    }

    #[must_use]
    pub fn build(self) -> Dispatcher {
        Dispatcher {
            bridge: self.bridge,
            exports: self.exports,
            names: self.names,
        }
    }
}

/// Maps export ids to invokers and runs calls against the shared bridge context.
#[derive(Debug)]
pub struct Dispatcher {
    bridge: Bridge,
    exports: AHashMap<ExportId, Invoker>,
    names: AHashMap<String, Vec<ExportId>>,
}

impl Dispatcher {
    #[must_use]
    pub fn builder(bridge: Bridge) -> DispatcherBuilder {
        DispatcherBuilder {
            bridge,
            exports: AHashMap::new(),
            names: AHashMap::new(),
        }
    }

    #[must_use]
    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    /// Invokes the callable registered under `id`.
    ///
    /// Every per-call failure is returned as a `TaggedValue::Error`. `Err` means the id
    /// was never registered, which is a configuration defect rather than a call failure.
    pub fn invoke(&self, id: ExportId, args: &[TaggedValue]) -> Result<TaggedValue, UnknownExport> {
        let Some(invoker) = self.exports.get(&id) else {
            tracing::error!(export = id.0, "call to unregistered export");
            return Err(UnknownExport::Id(id));
        };
        let span = tracing::debug_span!("dispatch", export = id.0, name = invoker.descriptor().name());
        let _guard = span.enter();
        let args = self.coerce_handle_strings(args);
        Ok(invoker.invoke(self, &args))
    }

    /// Tries each export in turn and returns the first non-error result, or the last
    /// error if every candidate fails. An empty candidate list yields `#NAME?`.
    pub fn invoke_overloads(&self, ids: &[ExportId], args: &[TaggedValue]) -> Result<TaggedValue, UnknownExport> {
        let mut last = None;
        for &id in ids {
            let result = self.invoke(id, args)?;
            if !result.is_error() {
                return Ok(result);
            }
            last = Some(result);
        }
        Ok(last.unwrap_or(TaggedValue::Error(ErrorCode::Name)))
    }

    /// Resolves `name` to its overload set and invokes it.
    pub fn invoke_by_name(&self, name: &str, args: &[TaggedValue]) -> Result<TaggedValue, UnknownExport> {
        let Some(ids) = self.names.get(name) else {
            tracing::error!(name, "call to unregistered name");
            return Err(UnknownExport::Name(name.to_owned()));
        };
        self.invoke_overloads(ids, args)
    }

    /// Export ids registered under `name`, in registration order.
    #[must_use]
    pub fn overloads(&self, name: &str) -> &[ExportId] {
        self.names.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Registered exports in id order.
    #[must_use]
    pub fn exports(&self) -> Vec<(ExportId, &CallableDescriptor)> {
        let mut exports: Vec<_> = self
            .exports
            .iter()
            .map(|(id, invoker)| (*id, invoker.descriptor()))
            .collect();
        exports.sort_unstable_by_key(|(id, _)| *id);
        exports
    }

    /// Checks that the transport's export list and the registration table agree.
    pub fn verify_exports(&self, expected: impl IntoIterator<Item = ExportId>) -> Result<(), RegistrationError> {
        let mut expected: Vec<ExportId> = expected.into_iter().collect();
        expected.sort_unstable();
        expected.dedup();
        let missing: Vec<ExportId> = expected
            .iter()
            .copied()
            .filter(|id| !self.exports.contains_key(id))
            .collect();
        let unexpected: Vec<ExportId> = self
            .exports()
            .into_iter()
            .map(|(id, _)| id)
            .filter(|id| expected.binary_search(id).is_err())
            .collect();
        if missing.is_empty() && unexpected.is_empty() {
            Ok(())
        } else {
            tracing::error!(?missing, ?unexpected, "export list mismatch");
            Err(RegistrationError::ExportMismatch { missing, unexpected })
        }
    }

    /// Replaces string arguments that spell an object handle with the handle.
    fn coerce_handle_strings<'a>(&self, args: &'a [TaggedValue]) -> Cow<'a, [TaggedValue]> {
        let config = self.bridge.config();
        if !config.coerce_handle_strings {
            return Cow::Borrowed(args);
        }
        let parse = |value: &TaggedValue| match value {
            TaggedValue::String(text) => ObjectHandle::parse_host_string(text, config.handle_marker),
            _ => None,
        };
        if !args.iter().any(|arg| parse(arg).is_some()) {
            return Cow::Borrowed(args);
        }
        Cow::Owned(
            args.iter()
                .map(|arg| parse(arg).map_or_else(|| arg.clone(), TaggedValue::Object))
                .collect(),
        )
    }
}
