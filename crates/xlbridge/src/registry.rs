//! The converter registry: best-converter resolution with a concurrent memo.
//!
//! Resolution collects every converter whose mapping matches and keeps the one with the
//! highest priority. Among equal priorities the converter registered first wins; the
//! scan walks converters in registration order and only replaces its current pick on a
//! strictly greater priority, so the rule holds no matter how the cache is populated.
//!
//! The registry is built once and read many times. Results, including "no converter",
//! are memoised per [`TypeMapping`] in a [`DashMap`], so a repeated query never rescans
//! the converter list. Two threads racing on the same first lookup may both scan; they
//! compute the same answer and only one insert survives.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use dashmap::DashMap;
use serde::Serialize;

use crate::{
    convert::{
        Array2DConverter, ArrayConverter, BooleanConverter, CharConverter, Direction, NilConverter, NumberConverter,
        NumericStringConverter, ObjectHandleConverter, RawValueConverter, StringConverter, TypeConverter, TypeMapping,
    },
    managed::ManagedType,
    value::HostType,
};

/// Numeric managed types in default registration order.
const NUMERIC_TYPES: [ManagedType; 6] = [
    ManagedType::Double,
    ManagedType::Float,
    ManagedType::Long,
    ManagedType::Int,
    ManagedType::Short,
    ManagedType::Byte,
];

/// Snapshot of registry counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RegistryStats {
    /// Registered converters.
    pub converters: usize,
    /// Full scans of the converter list. Cache hits do not scan.
    pub scans: usize,
    /// Memoised decode lookups, negative results included.
    pub cached_to_managed: usize,
    /// Memoised encode lookups, negative results included.
    pub cached_to_host: usize,
}

/// Collects converters in registration order.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    converters: Vec<Arc<dyn TypeConverter>>,
}

impl RegistryBuilder {
    /// Appends a converter. Later registrations lose priority ties.
    #[must_use]
    pub fn register(mut self, converter: impl TypeConverter + 'static) -> Self {
        self.converters.push(Arc::new(converter));
        self
    }

    #[must_use]
    pub fn register_arc(mut self, converter: Arc<dyn TypeConverter>) -> Self {
        self.converters.push(converter);
        self
    }

    /// Appends the default converter set.
    ///
    /// Order matters for ties: numbers to `Number`, then booleans, strings and chars,
    /// numbers as text, one- and two-dimensional arrays, object handles, `Nil` to null,
    /// and finally raw tagged values.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        for numeric in NUMERIC_TYPES {
            self = self.register(NumberConverter::new(numeric));
        }
        self = self
            .register(BooleanConverter::default())
            .register(StringConverter::default())
            .register(CharConverter::default());
        for numeric in NUMERIC_TYPES {
            self = self.register(NumericStringConverter::new(numeric));
        }
        let elements = NUMERIC_TYPES
            .into_iter()
            .chain([ManagedType::Boolean, ManagedType::String, ManagedType::Object]);
        for element in elements {
            self = self.register(ArrayConverter::new(element));
        }
        self.register(Array2DConverter::new(ManagedType::Double, 10))
            .register(Array2DConverter::new(ManagedType::Object, 11))
            .register(ObjectHandleConverter::default())
            .register(NilConverter::default())
            .register(RawValueConverter::default())
    }

    #[must_use]
    pub fn build(self) -> ConverterRegistry {
        tracing::info!(converters = self.converters.len(), "converter registry built");
        ConverterRegistry {
            converters: self.converters,
            cache: DashMap::new(),
            scans: AtomicUsize::new(0),
        }
    }
}

/// Immutable converter set with a memoised resolution cache.
#[derive(Debug)]
pub struct ConverterRegistry {
    converters: Vec<Arc<dyn TypeConverter>>,
    cache: DashMap<TypeMapping, Option<Arc<dyn TypeConverter>>>,
    scans: AtomicUsize,
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ConverterRegistry {
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// A registry holding the default converter set.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::builder().with_defaults().build()
    }

    /// Finds the converter that decodes a `host` value into a `required` slot.
    #[must_use]
    pub fn find_converter_for(&self, host: HostType, required: &ManagedType) -> Option<Arc<dyn TypeConverter>> {
        self.resolve(TypeMapping::decoding(host, required.clone()))
    }

    /// Finds the default host representation for a value of runtime type `runtime`.
    #[must_use]
    pub fn find_converter(&self, runtime: &ManagedType) -> Option<Arc<dyn TypeConverter>> {
        self.resolve(TypeMapping::encoding(runtime.clone()))
    }

    /// Registered converters in registration order.
    pub fn converters(&self) -> impl Iterator<Item = &Arc<dyn TypeConverter>> {
        self.converters.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.converters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            converters: self.converters.len(),
            scans: self.scans.load(Ordering::Relaxed),
            ..RegistryStats::default()
        };
        for entry in &self.cache {
            match entry.key().direction {
                Direction::ToManaged => stats.cached_to_managed += 1,
                Direction::ToHost => stats.cached_to_host += 1,
            }
        }
        stats
    }

    fn resolve(&self, mapping: TypeMapping) -> Option<Arc<dyn TypeConverter>> {
        if let Some(hit) = self.cache.get(&mapping) {
            return hit.value().clone();
        }
        let found = self.scan(&mapping);
        self.cache.entry(mapping).or_insert(found).value().clone()
    }

    fn scan(&self, mapping: &TypeMapping) -> Option<Arc<dyn TypeConverter>> {
        self.scans.fetch_add(1, Ordering::Relaxed);
        let found = self
            .converters
            .iter()
            .filter(|converter| match (mapping.direction, mapping.host) {
                (Direction::ToManaged, Some(host)) => converter.accepts_host(host, &mapping.managed),
                (Direction::ToManaged, None) => false,
                (Direction::ToHost, _) => converter.accepts_managed(&mapping.managed),
            })
            .fold(None::<&Arc<dyn TypeConverter>>, |best, candidate| match best {
                Some(best) if candidate.priority() <= best.priority() => Some(best),
                _ => Some(candidate),
            })
            .cloned();
        tracing::debug!(
            %mapping,
            converter = ?found.as_ref().map(|c| c.managed_type().to_string()),
            "resolved converter"
        );
        found
    }
}
