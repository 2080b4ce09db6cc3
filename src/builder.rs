// src/builder.rs
//! Two-level cache of reusable string builders.
//!
//! # Architecture
//!
//! Acquisition follows a three-tier cascade, keyed by a capacity bucket:
//!
//! 1. **Thread-local slot array** (no synchronisation) — at most one
//!    builder per bucket per thread.
//! 2. **Global bounded bags** (lock-free, one per bucket) — sized by the
//!    core count, absent entirely on single-threaded hosts.
//! 3. **Fresh allocation** (fallback).
//!
//! The bucket function is branch-free bit-length arithmetic:
//! `bucket(c) = log2((c − 1) | 15) − 3`, so capacities 1–16 share bucket 0,
//! 17–32 bucket 1, and so on up to the configured cap.  Oversized builders
//! are never cached.
//!
//! Release places a builder at its capacity's bucket and cascades occupied
//! slots downward — larger instances win slots, since a larger builder
//! still satisfies any smaller request.  What the thread-local array cannot
//! accept goes to the global bag, and is dropped once that is full.

use std::cell::RefCell;
use std::ops::{Deref, DerefMut};
use std::sync::OnceLock;

use crossbeam::queue::ArrayQueue;

use crate::events::{self, CacheLevel};
use crate::settings;

/// Widest possible bucket index range; the configured capacity cap is
/// clamped so its bucket always fits.
const MAX_BUCKETS: usize = 16;

/// Bucket index for `capacity`, or `None` when it exceeds `max_cached`.
#[inline]
fn bucket_for(capacity: usize, max_cached: usize) -> Option<usize> {
    if capacity > max_cached {
        return None;
    }
    let width = (capacity.saturating_sub(1) | 15).ilog2() as usize;
    Some(width - 3)
}

fn num_buckets(max_cached: usize) -> usize {
    bucket_for(max_cached, max_cached).map_or(0, |b| b + 1)
}

thread_local! {
    /// Per-thread builder stash, one slot per bucket.  Drops with the
    /// thread; anything it still holds is simply freed.
    static LOCAL_BUILDERS: RefCell<[Option<String>; MAX_BUCKETS]> =
        const { RefCell::new([const { None }; MAX_BUCKETS]) };
}

static GLOBAL_BAGS: OnceLock<Vec<ArrayQueue<String>>> = OnceLock::new();

/// Per-bucket global bags.  Empty when the host reports a single hardware
/// thread — there is nobody to share with.
fn global_bags() -> &'static Vec<ArrayQueue<String>> {
    GLOBAL_BAGS.get_or_init(|| {
        let cores = num_cpus::get();
        if cores <= 1 {
            return Vec::new();
        }
        let cap = (cores / 2).clamp(2, 4);
        let buckets = num_buckets(settings::options().max_cached_builder_capacity);
        (0..buckets).map(|_| ArrayQueue::new(cap)).collect()
    })
}

/// A string builder borrowed from the cache.
///
/// Dereferences to `String`; on drop the builder returns to the cache
/// (thread-local first, then the global bag, then dropped).
///
/// # Examples
///
/// ```
/// let mut b = segbuf::builder::acquire(256);
/// b.push_str("hello, ");
/// b.push_str("world");
/// assert_eq!(b.finish(), "hello, world");
/// ```
pub struct PooledStringBuilder {
    inner: Option<String>,
}

impl PooledStringBuilder {
    /// Materializes the built string and releases the builder back to the
    /// cache, keeping its allocation warm for the next acquire.
    pub fn finish(mut self) -> String {
        let builder = self.inner.take().unwrap();
        let out = builder.as_str().to_owned();
        release(builder);
        out
    }

    /// Extracts the builder, preventing the return to the cache.
    pub fn detach(mut self) -> String {
        self.inner.take().unwrap()
    }
}

impl Deref for PooledStringBuilder {
    type Target = String;
    fn deref(&self) -> &Self::Target {
        self.inner.as_ref().unwrap()
    }
}

impl DerefMut for PooledStringBuilder {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inner.as_mut().unwrap()
    }
}

impl Drop for PooledStringBuilder {
    fn drop(&mut self) {
        if let Some(builder) = self.inner.take() {
            release(builder);
        }
    }
}

/// Borrows a cleared builder with at least `capacity` bytes of capacity.
pub fn acquire(capacity: usize) -> PooledStringBuilder {
    PooledStringBuilder {
        inner: Some(acquire_string(capacity)),
    }
}

fn acquire_string(capacity: usize) -> String {
    let max_cached = settings::options().max_cached_builder_capacity;
    let Some(start) = bucket_for(capacity, max_cached) else {
        events::builder_create(capacity);
        return String::with_capacity(capacity);
    };
    let buckets = num_buckets(max_cached);

    // Tier 1: thread-local slots, smallest fitting bucket first.
    let local = LOCAL_BUILDERS.with(|slots| {
        let mut slots = slots.borrow_mut();
        for slot in slots[start..buckets].iter_mut() {
            if slot.as_ref().is_some_and(|s| s.capacity() >= capacity) {
                return slot.take();
            }
        }
        None
    });
    if let Some(mut builder) = local {
        builder.clear();
        events::builder_cache_hit(capacity, CacheLevel::Local);
        return builder;
    }

    // Tier 2: global bags.  A same-bucket hit may be slightly under the
    // request; topping it up still beats a fresh allocation.
    let bags = global_bags();
    for bag in bags.iter().take(buckets).skip(start) {
        if let Some(mut builder) = bag.pop() {
            builder.clear();
            if builder.capacity() < capacity {
                builder.reserve(capacity - builder.capacity());
            }
            events::builder_cache_hit(capacity, CacheLevel::Global);
            return builder;
        }
    }

    // Tier 3: fresh allocation.
    events::builder_cache_miss(capacity);
    events::builder_create(capacity);
    String::with_capacity(capacity)
}

/// Returns a builder to the cache.
///
/// Never fails: oversized builders and overflow beyond the bag caps are
/// quietly dropped.
pub fn release(builder: String) {
    let max_cached = settings::options().max_cached_builder_capacity;
    let Some(bucket) = bucket_for(builder.capacity(), max_cached) else {
        return;
    };

    // Tier 1: place at the capacity's bucket, cascading occupied slots
    // downward.  `try_with` avoids a panic if TLS is tearing down on
    // thread exit; the builder then falls through to the global bag.
    let mut candidate = Some(builder);
    let _ = LOCAL_BUILDERS.try_with(|slots| {
        let mut slots = slots.borrow_mut();
        let mut idx = bucket;
        loop {
            let Some(current) = candidate.take() else {
                break;
            };
            let slot = &mut slots[idx];
            match slot {
                None => {
                    events::builder_cache_store(current.capacity(), CacheLevel::Local);
                    *slot = Some(current);
                    break;
                }
                Some(occupant) if occupant.capacity() < current.capacity() => {
                    // Larger instance wins the slot; the smaller evictee
                    // keeps cascading.
                    events::builder_cache_store(current.capacity(), CacheLevel::Local);
                    candidate = slot.replace(current);
                }
                Some(_) => {
                    candidate = Some(current);
                }
            }
            if idx == 0 {
                break;
            }
            idx -= 1;
        }
    });

    // Tier 2: whatever survived the cascade goes to its own global bag.
    if let Some(survivor) = candidate {
        let Some(bucket) = bucket_for(survivor.capacity(), max_cached) else {
            return;
        };
        let bags = global_bags();
        if let Some(bag) = bags.get(bucket) {
            let capacity = survivor.capacity();
            if bag.push(survivor).is_ok() {
                events::builder_cache_store(capacity, CacheLevel::Global);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    // Thread-local state persists across tests scheduled onto the same
    // harness thread, so anything asserting exact cache behavior runs in a
    // fresh spawned thread.

    #[test]
    fn test_bucket_anchors() {
        let max = 4096;
        assert_eq!(bucket_for(1, max), Some(0));
        assert_eq!(bucket_for(16, max), Some(0));
        assert_eq!(bucket_for(17, max), Some(1));
        assert_eq!(bucket_for(32, max), Some(1));
        assert_eq!(bucket_for(33, max), Some(2));
        assert_eq!(bucket_for(4096, max), Some(8));
        assert_eq!(bucket_for(4097, max), None);
    }

    #[test]
    fn test_bucket_monotonic() {
        let max = settings::options().max_cached_builder_capacity;
        let mut last = 0;
        for c in 1..=max {
            let b = bucket_for(c, max).unwrap();
            assert!(b >= last);
            last = b;
        }
    }

    #[test]
    fn test_cascade_release_then_acquire() {
        thread::spawn(|| {
            // Scenario: empty thread-local cache, two releases into
            // distinct buckets, two acquires that must both hit locally.
            release(String::with_capacity(1024)); // bucket 6
            release(String::with_capacity(2048)); // bucket 7

            let big = acquire(2048);
            assert_eq!(big.capacity(), 2048);
            let small = acquire(1024);
            assert_eq!(small.capacity(), 1024);

            big.detach();
            small.detach();
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_larger_instance_wins_slot() {
        thread::spawn(|| {
            // Both capacities map to bucket 6; the larger one should end
            // up owning the slot and the smaller cascade to bucket 5.
            release(String::with_capacity(600));
            release(String::with_capacity(1024));

            let b = acquire(1000);
            assert!(b.capacity() >= 1000);
            b.detach();
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_same_bucket_reacquire_hits_cache() {
        thread::spawn(|| {
            {
                let mut b = acquire(512);
                b.push_str("warm");
            } // released on drop
            let b = acquire(512);
            // A hit comes back cleared with enough room.
            assert!(b.is_empty());
            assert!(b.capacity() >= 512);
            b.detach();
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_finish_returns_content_and_recycles() {
        thread::spawn(|| {
            let mut b = acquire(256);
            b.push_str("hello");
            let out = b.finish();
            assert_eq!(out, "hello");

            // The 256-capacity builder is back in the cache and clean.
            let again = acquire(256);
            assert!(again.is_empty());
            assert!(again.capacity() >= 256);
            again.detach();
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_oversized_builder_not_cached() {
        let max = settings::options().max_cached_builder_capacity;
        release(String::with_capacity(max + 1));
        // Nothing to assert beyond "did not panic": the drop is silent.
    }

    #[test]
    fn test_scoped_guard_releases_on_drop() {
        thread::spawn(|| {
            {
                let mut b = acquire(128);
                b.push('x');
            }
            let b = acquire(128);
            assert!(b.is_empty());
            b.detach();
        })
        .join()
        .unwrap();
    }
}
