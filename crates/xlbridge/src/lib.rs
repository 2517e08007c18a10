#![doc = include_str!("../../../README.md")]

mod bridge;
mod config;
pub mod convert;
mod dispatch;
mod error;
mod heap;
mod invoker;
mod managed;
mod registry;
mod value;
mod visitor;

pub use crate::{
    bridge::Bridge,
    config::{BridgeConfig, ConfigError},
    convert::{Conversion, Direction, TypeConverter, TypeMapping},
    dispatch::{Dispatcher, DispatcherBuilder, ExportId},
    error::{BridgeError, InvocationError, RegistrationError, UnknownExport},
    heap::{Handle, Heap, HeapStats},
    invoker::{CallFrame, Callable, CallableDescriptor, CallableKind, Invoker},
    managed::{ClassName, ExtractError, FromManaged, Managed, ManagedArray, ManagedType, ObjectRef},
    registry::{ConverterRegistry, RegistryBuilder, RegistryStats},
    value::{BigData, CellRange, ErrorCode, HostArray, HostType, ObjectHandle, RangeError, SheetId, TaggedValue},
    visitor::TaggedValueVisitor,
};
