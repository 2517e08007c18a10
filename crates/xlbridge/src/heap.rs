//! Handle table for managed objects that cross the host boundary by reference.
//!
//! A handle is minted when a result has no native host representation and must travel
//! to the host as an opaque [`ObjectHandle`](crate::ObjectHandle). Handles are resolved,
//! never consumed, on every call that passes them back, and only [`Heap::release`]
//! invalidates them.

use std::{
    fmt,
    sync::atomic::{AtomicI64, AtomicUsize, Ordering},
};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::managed::{ClassName, ObjectRef};

/// Opaque identifier of an object stored in the [`Heap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(i64);

impl Handle {
    #[must_use]
    pub fn new(raw: i64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn raw(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Snapshot of heap counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct HeapStats {
    /// Handles currently resolvable.
    pub live_handles: usize,
    /// Handles minted since the heap was created.
    pub minted: usize,
    /// Handles removed by `release`. Releasing an unknown handle does not count.
    pub released: usize,
}

/// Concurrent table of `handle -> object`.
///
/// The table is sharded ([`DashMap`]), so a mint only locks the shard its new handle
/// lands in and never blocks lookups of unrelated handles. Handles come from a
/// monotonically increasing counter starting at 1 and are never reused, so a stale
/// handle can only miss, never alias a newer object.
#[derive(Debug)]
pub struct Heap {
    objects: DashMap<Handle, ObjectRef>,
    next: AtomicI64,
    minted: AtomicUsize,
    released: AtomicUsize,
}

impl Default for Heap {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl Heap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            objects: DashMap::with_capacity(capacity),
            next: AtomicI64::new(1),
            minted: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
        }
    }

    /// Stores `object` and returns a fresh handle for it.
    ///
    /// Minting the same object twice yields two distinct handles.
    pub fn mint(&self, object: ObjectRef) -> Handle {
        let handle = Handle(self.next.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(handle = handle.0, class = %object.class(), "minted handle");
        self.objects.insert(handle, object);
        self.minted.fetch_add(1, Ordering::Relaxed);
        handle
    }

    /// Looks up a handle. Unknown and released handles return `None`.
    #[must_use]
    pub fn get(&self, handle: Handle) -> Option<ObjectRef> {
        self.objects.get(&handle).map(|entry| entry.value().clone())
    }

    /// Looks up a handle and checks the stored object's class.
    ///
    /// Returns `Err` with the stored class when the handle is live but the class differs.
    pub fn get_if_class(&self, handle: Handle, class: &ClassName) -> Option<Result<ObjectRef, ClassName>> {
        self.get(handle).map(|object| {
            if object.class() == class {
                Ok(object)
            } else {
                Err(object.class().clone())
            }
        })
    }

    /// Looks up a handle and downcasts the object to `T`.
    #[must_use]
    pub fn get_as<T: std::any::Any + Send + Sync>(&self, handle: Handle) -> Option<std::sync::Arc<T>> {
        self.get(handle)?.downcast()
    }

    /// Removes a handle. Returns whether it was live; releasing twice is a no-op.
    pub fn release(&self, handle: Handle) -> bool {
        let removed = self.objects.remove(&handle).is_some();
        if removed {
            self.released.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(handle = handle.0, "released handle");
        }
        removed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> HeapStats {
        HeapStats {
            live_handles: self.objects.len(),
            minted: self.minted.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
        }
    }
}
