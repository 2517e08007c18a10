//! The bridge context: configuration, heap and converter registry, created once per
//! process and owned by the dispatcher.

use crate::{
    config::BridgeConfig,
    convert::Conversion,
    heap::{Handle, Heap},
    managed::ObjectRef,
    registry::ConverterRegistry,
};

#[derive(Debug)]
pub struct Bridge {
    config: BridgeConfig,
    heap: Heap,
    registry: ConverterRegistry,
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new(BridgeConfig::default())
    }
}

impl Bridge {
    /// Creates a bridge with the default converter set.
    #[must_use]
    pub fn new(config: BridgeConfig) -> Self {
        Self::with_registry(config, ConverterRegistry::with_defaults())
    }

    #[must_use]
    pub fn with_registry(config: BridgeConfig, registry: ConverterRegistry) -> Self {
        Self {
            heap: Heap::with_capacity(config.heap_capacity),
            config,
            registry,
        }
    }

    /// Returns the object behind a handle, or `None` if it is unknown or released.
    #[must_use]
    pub fn get_object(&self, handle: Handle) -> Option<ObjectRef> {
        self.heap.get(handle)
    }

    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    #[must_use]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    #[must_use]
    pub fn registry(&self) -> &ConverterRegistry {
        &self.registry
    }

    #[must_use]
    pub fn conversion(&self) -> Conversion<'_> {
        Conversion::new(&self.registry, &self.heap)
    }
}
