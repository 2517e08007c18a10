//! Tests for the object heap: lookups, release semantics, counters and concurrent use.

use std::{collections::HashSet, sync::Arc, thread};

use pretty_assertions::assert_eq;
use xlbridge::{Handle, Heap, HeapStats, ObjectRef};

#[derive(Debug, PartialEq)]
struct Person {
    name: String,
}

fn person(name: &str) -> ObjectRef {
    ObjectRef::new("Person", Person { name: name.to_owned() })
}

// =============================================================================
// 1. Mint, get, release
// =============================================================================

#[test]
fn minted_object_is_resolvable() {
    let heap = Heap::new();
    let handle = heap.mint(person("Ada"));
    let object = heap.get(handle).expect("handle should be live");
    assert_eq!(object.class().as_str(), "Person");
    assert_eq!(object.downcast_ref::<Person>().map(|p| p.name.as_str()), Some("Ada"));
    assert_eq!(heap.get_as::<Person>(handle).map(|p| p.name.clone()), Some("Ada".to_owned()));
}

#[test]
fn never_minted_handle_misses() {
    let heap = Heap::new();
    assert!(heap.get(Handle::new(9999)).is_none());
    assert!(heap.get(Handle::new(-1)).is_none());
}

#[test]
fn released_handle_misses() {
    let heap = Heap::new();
    let handle = heap.mint(person("Ada"));
    assert!(heap.release(handle));
    assert!(heap.get(handle).is_none());
}

#[test]
fn release_is_idempotent() {
    let heap = Heap::new();
    let handle = heap.mint(person("Ada"));
    assert!(heap.release(handle));
    assert!(!heap.release(handle));
    assert!(!heap.release(Handle::new(12345)));
    assert_eq!(heap.stats().released, 1);
}

#[test]
fn same_object_twice_gets_distinct_handles() {
    let heap = Heap::new();
    let object = person("Ada");
    let first = heap.mint(object.clone());
    let second = heap.mint(object.clone());
    assert_ne!(first, second);
    let a = heap.get(first).unwrap();
    let b = heap.get(second).unwrap();
    assert!(a.ptr_eq(&b));
}

#[test]
fn handles_are_not_reused_after_release() {
    let heap = Heap::new();
    let first = heap.mint(person("Ada"));
    heap.release(first);
    let second = heap.mint(person("Grace"));
    assert_ne!(first, second);
    assert!(heap.get(first).is_none());
}

#[test]
fn wrong_downcast_is_a_miss() {
    let heap = Heap::new();
    let handle = heap.mint(person("Ada"));
    assert!(heap.get_as::<String>(handle).is_none());
}

// =============================================================================
// 2. Stats
// =============================================================================

#[test]
fn stats_track_minted_and_released() {
    let heap = Heap::with_capacity(8);
    assert_eq!(heap.stats(), HeapStats::default());
    let a = heap.mint(person("a"));
    heap.mint(person("b"));
    heap.mint(person("c"));
    heap.release(a);
    assert_eq!(
        heap.stats(),
        HeapStats {
            live_handles: 2,
            minted: 3,
            released: 1,
        }
    );
    assert_eq!(heap.len(), 2);
    assert!(!heap.is_empty());
}

// =============================================================================
// 3. Concurrency
// =============================================================================

#[test]
fn concurrent_mints_never_alias() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 250;

    let heap = Heap::new();
    let minted: Vec<Vec<(Handle, usize)>> = thread::scope(|scope| {
        let workers: Vec<_> = (0..THREADS)
            .map(|t| {
                let heap = &heap;
                scope.spawn(move || {
                    (0..PER_THREAD)
                        .map(|i| {
                            let id = t * PER_THREAD + i;
                            (heap.mint(ObjectRef::new("Counter", id)), id)
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    let all: Vec<(Handle, usize)> = minted.into_iter().flatten().collect();
    let distinct: HashSet<Handle> = all.iter().map(|(h, _)| *h).collect();
    assert_eq!(distinct.len(), THREADS * PER_THREAD);
    for (handle, id) in &all {
        assert_eq!(heap.get_as::<usize>(*handle).as_deref(), Some(id));
    }
}

#[test]
fn concurrent_get_and_release_is_safe() {
    let heap = Arc::new(Heap::new());
    let handles: Vec<Handle> = (0..500).map(|i| heap.mint(ObjectRef::new("Counter", i))).collect();

    thread::scope(|scope| {
        for chunk in handles.chunks(100) {
            let heap = Arc::clone(&heap);
            scope.spawn(move || {
                for handle in chunk {
                    assert!(heap.get(*handle).is_some());
                    heap.release(*handle);
                    assert!(heap.get(*handle).is_none());
                    heap.release(*handle);
                }
            });
        }
        let heap = Arc::clone(&heap);
        scope.spawn(move || {
            for i in 0..200 {
                heap.mint(ObjectRef::new("Counter", 1000 + i));
            }
        });
    });

    let stats = heap.stats();
    assert_eq!(stats.minted, 700);
    assert_eq!(stats.released, 500);
    assert_eq!(stats.live_handles, 200);
}
