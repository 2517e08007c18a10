//! Method and constructor invocation.
//!
//! An [`Invoker`] pairs a [`CallableDescriptor`] with the Rust closure that implements
//! it and runs each call through four stages:
//!
//! 1. decode the incoming tagged values into managed arguments,
//! 2. resolve the receiver of an instance call through the heap,
//! 3. call the closure, catching both returned errors and panics,
//! 4. encode the result, minting a handle when it has no native representation.
//!
//! Every failure is reduced to a host error value; nothing propagates past
//! [`Invoker::invoke`].

use std::{
    any::Any,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use serde::Serialize;

use crate::{
    bridge::Bridge,
    convert::Conversion,
    dispatch::Dispatcher,
    error::{BridgeError, InvocationError, RegistrationError},
    managed::{ClassName, FromManaged, Managed, ManagedType, ObjectRef},
    value::TaggedValue,
};

/// How a callable is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CallableKind {
    /// No receiver.
    Static,
    /// The first incoming argument is the receiver's object handle.
    Instance,
    /// Creates a new object of the declaring class.
    Constructor,
}

/// Metadata describing one registered callable. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallableDescriptor {
    name: String,
    declaring: ClassName,
    params: Vec<ManagedType>,
    returns: Option<ManagedType>,
    kind: CallableKind,
    variadic: bool,
}

impl CallableDescriptor {
    /// A static function. `returns` is `None` for functions without a result.
    pub fn function(
        name: impl Into<String>,
        declaring: impl Into<ClassName>,
        params: Vec<ManagedType>,
        returns: impl Into<Option<ManagedType>>,
    ) -> Self {
        Self {
            name: name.into(),
            declaring: declaring.into(),
            params,
            returns: returns.into(),
            kind: CallableKind::Static,
            variadic: false,
        }
    }

    /// An instance method. `params` excludes the receiver.
    pub fn method(
        name: impl Into<String>,
        declaring: impl Into<ClassName>,
        params: Vec<ManagedType>,
        returns: impl Into<Option<ManagedType>>,
    ) -> Self {
        Self {
            kind: CallableKind::Instance,
            ..Self::function(name, declaring, params, returns)
        }
    }

    /// A constructor, named after the class it creates.
    pub fn constructor(declaring: impl Into<ClassName>, params: Vec<ManagedType>) -> Self {
        let declaring = declaring.into();
        Self {
            name: declaring.to_string(),
            returns: Some(ManagedType::Class(declaring.clone())),
            declaring,
            params,
            kind: CallableKind::Constructor,
            variadic: false,
        }
    }

    /// Marks the last parameter as a variadic tail. It must be an array type.
    #[must_use]
    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    /// Overrides the external name, e.g. to register a constructor under an alias.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn declaring(&self) -> &ClassName {
        &self.declaring
    }

    #[must_use]
    pub fn params(&self) -> &[ManagedType] {
        &self.params
    }

    #[must_use]
    pub fn returns(&self) -> Option<&ManagedType> {
        self.returns.as_ref()
    }

    #[must_use]
    pub fn kind(&self) -> CallableKind {
        self.kind
    }

    #[must_use]
    pub fn is_variadic(&self) -> bool {
        self.variadic
    }

    #[must_use]
    pub fn is_static(&self) -> bool {
        self.kind == CallableKind::Static
    }

    /// Element type of the variadic tail, if any.
    #[must_use]
    pub fn variadic_element(&self) -> Option<&ManagedType> {
        if self.variadic {
            self.params.last().and_then(ManagedType::element)
        } else {
            None
        }
    }

    pub(crate) fn validate(&self) -> Result<(), RegistrationError> {
        let invalid = |reason| RegistrationError::InvalidDescriptor {
            name: self.name.clone(),
            reason,
        };
        if self.name.is_empty() {
            return Err(invalid("empty name"));
        }
        if self.variadic && self.variadic_element().is_none() {
            return Err(invalid("variadic callable must end with an array parameter"));
        }
        Ok(())
    }
}

impl fmt::Display for CallableDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            CallableKind::Static | CallableKind::Constructor => write!(f, "{}(", self.name)?,
            CallableKind::Instance => write!(f, "{}.{}(", self.declaring, self.name)?,
        }
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match param.element() {
                Some(element) if self.variadic && i + 1 == self.params.len() => write!(f, "{element}...")?,
                _ => write!(f, "{param}")?,
            }
        }
        f.write_str(")")?;
        match &self.returns {
            Some(returns) => write!(f, " -> {returns}"),
            None => Ok(()),
        }
    }
}

type CallableFn = dyn Fn(&CallFrame<'_>) -> Result<Managed, InvocationError> + Send + Sync;

/// The Rust implementation of a registered callable.
#[derive(Clone)]
pub struct Callable(Arc<CallableFn>);

impl Callable {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&CallFrame<'_>) -> Result<Managed, InvocationError> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callable")
    }
}

/// What a callable sees of its invocation: decoded arguments, the receiver of an
/// instance call, and the dispatcher for nested calls.
pub struct CallFrame<'a> {
    dispatcher: &'a Dispatcher,
    descriptor: &'a CallableDescriptor,
    receiver: Option<ObjectRef>,
    args: Vec<Managed>,
}

impl<'a> CallFrame<'a> {
    #[must_use]
    pub fn dispatcher(&self) -> &'a Dispatcher {
        self.dispatcher
    }

    #[must_use]
    pub fn bridge(&self) -> &'a Bridge {
        self.dispatcher.bridge()
    }

    #[must_use]
    pub fn descriptor(&self) -> &'a CallableDescriptor {
        self.descriptor
    }

    /// Decoded arguments, one per declared parameter. A variadic tail is a single array.
    #[must_use]
    pub fn args(&self) -> &[Managed] {
        &self.args
    }

    /// Reads argument `index` as `T`.
    pub fn arg<T: FromManaged>(&self, index: usize) -> Result<T, InvocationError> {
        let value = self
            .args
            .get(index)
            .ok_or_else(|| InvocationError::new(format!("{}: no argument {index}", self.descriptor.name)))?;
        T::from_managed(value)
            .map_err(|err| InvocationError::new(format!("{}: argument {index}: {err}", self.descriptor.name)))
    }

    /// The receiver object of an instance call.
    #[must_use]
    pub fn receiver_ref(&self) -> Option<&ObjectRef> {
        self.receiver.as_ref()
    }

    /// The receiver of an instance call, downcast to `T`.
    pub fn receiver<T: Any + Send + Sync>(&self) -> Result<Arc<T>, InvocationError> {
        let receiver = self
            .receiver
            .as_ref()
            .ok_or_else(|| InvocationError::new(format!("{}: no receiver", self.descriptor.name)))?;
        receiver.downcast().ok_or_else(|| {
            InvocationError::new(format!(
                "{}: receiver of class {} has an unexpected representation",
                self.descriptor.name,
                receiver.class()
            ))
        })
    }
}

/// Marshals arguments, calls a callable and marshals its result.
#[derive(Debug, Clone)]
pub struct Invoker {
    descriptor: CallableDescriptor,
    callable: Callable,
}

impl Invoker {
    #[must_use]
    pub fn new(descriptor: CallableDescriptor, callable: Callable) -> Self {
        Self { descriptor, callable }
    }

    #[must_use]
    pub fn descriptor(&self) -> &CallableDescriptor {
        &self.descriptor
    }

    /// Runs one call. Failures come back as `TaggedValue::Error`.
    pub fn invoke(&self, dispatcher: &Dispatcher, args: &[TaggedValue]) -> TaggedValue {
        match self.try_invoke(dispatcher, args) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(callable = %self.descriptor.name, error = %err, "call failed");
                err.into_value()
            }
        }
    }

    fn try_invoke(&self, dispatcher: &Dispatcher, args: &[TaggedValue]) -> Result<TaggedValue, BridgeError> {
        let bridge = dispatcher.bridge();
        let cx = bridge.conversion();
        let (receiver, args) = match self.descriptor.kind {
            CallableKind::Instance => match args.split_first() {
                Some((receiver, rest)) => (Some(receiver), rest),
                None => return Err(BridgeError::NullArgument("missing receiver".to_owned())),
            },
            CallableKind::Static | CallableKind::Constructor => (None, args),
        };
        let decoded = self.decode_args(&cx, args, bridge.config().log_arguments)?;
        let receiver = self.resolve_target(&cx, receiver)?;
        let frame = CallFrame {
            dispatcher,
            descriptor: &self.descriptor,
            receiver,
            args: decoded,
        };
        let result = self.call(&frame)?;
        self.encode_result(&cx, result)
    }

    fn decode_args(
        &self,
        cx: &Conversion<'_>,
        args: &[TaggedValue],
        log_arguments: bool,
    ) -> Result<Vec<Managed>, BridgeError> {
        let params = &self.descriptor.params;
        if log_arguments {
            tracing::debug!(callable = %self.descriptor.name, ?args, "decoding arguments");
        } else {
            tracing::debug!(callable = %self.descriptor.name, count = args.len(), "decoding arguments");
        }

        let Some(element) = self.descriptor.variadic_element() else {
            if args.len() > params.len() {
                return Err(BridgeError::ArgumentCount {
                    expected: params.len(),
                    actual: args.len(),
                });
            }
            return decode_positional(cx, params, args);
        };

        let fixed = params.len() - 1;
        if args.len() < params.len() {
            // the tail is empty and every argument lines up with a fixed parameter
            let mut decoded = decode_positional(cx, &params[..fixed], args)?;
            decoded.push(Managed::array(element.clone(), Vec::new()));
            Ok(decoded)
        } else {
            // tail arguments are passed through unconverted
            let (head, tail) = args.split_at(fixed);
            let mut decoded = decode_positional(cx, &params[..fixed], head)?;
            let tail = tail.iter().cloned().map(Managed::Value).collect();
            decoded.push(Managed::array(element.clone(), tail));
            Ok(decoded)
        }
    }

    fn resolve_target(
        &self,
        cx: &Conversion<'_>,
        receiver: Option<&TaggedValue>,
    ) -> Result<Option<ObjectRef>, BridgeError> {
        let Some(receiver) = receiver else {
            return Ok(None);
        };
        match receiver {
            TaggedValue::Object(handle) => match cx.heap().get_if_class(handle.handle, &self.descriptor.declaring) {
                Some(Ok(object)) => Ok(Some(object)),
                Some(Err(actual)) => Err(BridgeError::type_mismatch(&self.descriptor.declaring, actual)),
                None => Err(BridgeError::InvalidReference(handle.handle)),
            },
            TaggedValue::Nil | TaggedValue::Missing => Err(BridgeError::NullArgument("missing receiver".to_owned())),
            other => Err(BridgeError::type_mismatch(&self.descriptor.declaring, other.host_type())),
        }
    }

    fn call(&self, frame: &CallFrame<'_>) -> Result<Managed, BridgeError> {
        match panic::catch_unwind(AssertUnwindSafe(|| (self.callable.0)(frame))) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(BridgeError::InvocationFailure(err.to_string())),
            Err(payload) => Err(BridgeError::InvocationFailure(format!(
                "panicked: {}",
                panic_message(payload.as_ref())
            ))),
        }
    }

    fn encode_result(&self, cx: &Conversion<'_>, result: Managed) -> Result<TaggedValue, BridgeError> {
        if self.descriptor.returns.is_none() {
            return Ok(TaggedValue::Nil);
        }
        match result {
            // already a host value, e.g. the handle produced by a nested constructor call
            Managed::Value(value) => Ok(value),
            Managed::Null => Err(BridgeError::NullArgument(format!("{} returned null", self.descriptor.name))),
            result => cx.to_host(&result),
        }
    }
}

/// Decodes arguments against parameters position by position. Parameters without an
/// argument receive `Null`.
fn decode_positional(
    cx: &Conversion<'_>,
    params: &[ManagedType],
    args: &[TaggedValue],
) -> Result<Vec<Managed>, BridgeError> {
    params
        .iter()
        .enumerate()
        .map(|(i, param)| match args.get(i) {
            Some(arg) => decode_arg(cx, param, arg),
            None => Ok(Managed::Null),
        })
        .collect()
}

fn decode_arg(cx: &Conversion<'_>, param: &ManagedType, arg: &TaggedValue) -> Result<Managed, BridgeError> {
    match arg {
        // arrays reach non-array parameters structurally, without a scalar converter
        TaggedValue::Array(_) if !param.is_array() => Ok(Managed::Value(arg.clone())),
        arg => cx.to_managed(arg, param),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}
