// src/events.rs
//! Diagnostic event emission.
//!
//! Every observable lifecycle step (stream create/dispose, capacity moves,
//! buffer allocate/release, builder cache traffic) is a `tracing` event with
//! a fixed name and level under the `segbuf::events` target.  Emission is
//! gated on a process-wide monitoring flag so a disabled sink costs one
//! relaxed atomic load.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::alloc::Backing;

/// Tracing target for all diagnostic events.
pub const TARGET: &str = "segbuf::events";

static MONITORING: AtomicBool = AtomicBool::new(true);

/// Enables or disables diagnostic event emission.
pub fn set_monitoring(enabled: bool) {
    MONITORING.store(enabled, Ordering::Relaxed);
}

#[inline]
pub(crate) fn enabled() -> bool {
    MONITORING.load(Ordering::Relaxed)
}

/// Which cache level served or stored a builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLevel {
    /// Thread-local slot array.
    Local,
    /// Process-wide bounded bag.
    Global,
}

impl CacheLevel {
    fn as_str(self) -> &'static str {
        match self {
            Self::Local => "Local",
            Self::Global => "Global",
        }
    }
}

pub(crate) fn stream_created(stream_id: u64, mode: &'static str, capacity: usize) {
    if enabled() {
        tracing::info!(target: TARGET, stream_id, mode, capacity, "StreamCreated");
    }
}

pub(crate) fn stream_disposed(stream_id: u64) {
    if enabled() {
        tracing::info!(target: TARGET, stream_id, "StreamDisposed");
    }
}

pub(crate) fn stream_finalized(stream_id: u64) {
    if enabled() {
        tracing::warn!(target: TARGET, stream_id, "StreamFinalized");
    }
}

pub(crate) fn capacity_expand(stream_id: u64, old_capacity: usize, new_capacity: usize) {
    if enabled() {
        tracing::info!(target: TARGET, stream_id, old_capacity, new_capacity, "CapacityExpand");
    }
}

pub(crate) fn capacity_reduced(stream_id: u64, old_capacity: usize, new_capacity: usize) {
    if enabled() {
        tracing::info!(target: TARGET, stream_id, old_capacity, new_capacity, "CapacityReduced");
    }
}

pub(crate) fn buffer_allocated(size: usize, backing: Backing) {
    if enabled() {
        tracing::info!(target: TARGET, size, backing = backing.as_str(), "BufferAllocated");
    }
}

pub(crate) fn buffer_released(size: usize, backing: Backing) {
    if enabled() {
        tracing::info!(target: TARGET, size, backing = backing.as_str(), "BufferReleased");
    }
}

pub(crate) fn stream_to_array(stream_id: u64, size: usize) {
    if enabled() {
        tracing::warn!(target: TARGET, stream_id, size, "StreamToArray");
    }
}

pub(crate) fn builder_create(capacity: usize) {
    if enabled() {
        tracing::info!(target: TARGET, capacity, "BuilderCreate");
    }
}

pub(crate) fn builder_cache_miss(capacity: usize) {
    if enabled() {
        tracing::info!(target: TARGET, capacity, "BuilderCacheMiss");
    }
}

pub(crate) fn builder_cache_hit(capacity: usize, cache: CacheLevel) {
    if enabled() {
        tracing::info!(target: TARGET, capacity, cache = cache.as_str(), "BuilderCacheHit");
    }
}

pub(crate) fn builder_cache_store(capacity: usize, cache: CacheLevel) {
    if enabled() {
        tracing::info!(target: TARGET, capacity, cache = cache.as_str(), "BuilderCacheStore");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitoring_toggle() {
        set_monitoring(false);
        assert!(!enabled());
        set_monitoring(true);
        assert!(enabled());
    }
}
