// src/pool/large.rs
//! Process-wide large-buffer pool.
//!
//! Buffers live in one bounded bag per ladder step.  The linear ladder
//! sizes step *i* at `(i + 1) * unit`; the exponential ladder at
//! `unit << i`; both stop at the configured ceiling.  Requests beyond the
//! ceiling are allocated exactly and never pooled.
//!
//! Rental takes the smallest fitting step and walks upward through the
//! bags before allocating fresh — a buffer one step too big beats a fresh
//! allocation.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam::queue::ArrayQueue;

use crate::alloc::LargeBuffer;
use crate::error::Result;
use crate::pool::scrubber;
use crate::pool::stats::LargePoolStats;
use crate::settings::{self, LadderKind, ZeroBufferBehavior};

/// Idle buffers retained per ladder step.
const STEP_RETENTION: usize = 4;

struct LargePoolStatsInner {
    rented: AtomicUsize,
    returned: AtomicUsize,
    allocated: AtomicUsize,
    released: AtomicUsize,
}

/// The process-wide ladder-indexed pool of large buffers.
pub(crate) struct LargePool {
    bags: Vec<ArrayQueue<LargeBuffer>>,
    sizes: Vec<usize>,
    ladder: LadderKind,
    unit: usize,
    stats: LargePoolStatsInner,
}

impl LargePool {
    fn new() -> Self {
        let opts = settings::options();
        let mut sizes = Vec::new();
        match opts.ladder {
            LadderKind::Linear => {
                let mut size = opts.large_growth_unit;
                while size <= opts.max_buffer_size {
                    sizes.push(size);
                    size += opts.large_growth_unit;
                }
            }
            LadderKind::Exponential => {
                let mut size = opts.large_growth_unit;
                while size <= opts.max_buffer_size {
                    sizes.push(size);
                    match size.checked_mul(2) {
                        Some(next) => size = next,
                        None => break,
                    }
                }
            }
        }
        debug_assert!(!sizes.is_empty());
        let bags = sizes.iter().map(|_| ArrayQueue::new(STEP_RETENTION)).collect();
        Self {
            bags,
            sizes,
            ladder: opts.ladder,
            unit: opts.large_growth_unit,
            stats: LargePoolStatsInner {
                rented: AtomicUsize::new(0),
                returned: AtomicUsize::new(0),
                allocated: AtomicUsize::new(0),
                released: AtomicUsize::new(0),
            },
        }
    }

    /// Smallest ladder step whose size covers `min_size`, or `None` when the
    /// request exceeds the ladder top.
    ///
    /// O(1) for both shapes: integer division for linear, bit-length for
    /// exponential.
    fn step_for(&self, min_size: usize) -> Option<usize> {
        let step = match self.ladder {
            LadderKind::Linear => min_size.saturating_sub(1) / self.unit,
            LadderKind::Exponential => {
                if min_size <= self.unit {
                    0
                } else {
                    let ceil_log2 = (min_size - 1).ilog2() + 1;
                    (ceil_log2 - self.unit.trailing_zeros()) as usize
                }
            }
        };
        (step < self.sizes.len()).then_some(step)
    }

    /// Rents a buffer of at least `min_size` bytes.
    pub(crate) fn rent(&self, min_size: usize, scrub_on_rent: bool) -> Result<LargeBuffer> {
        self.stats.rented.fetch_add(1, Ordering::Relaxed);

        let Some(step) = self.step_for(min_size) else {
            // Beyond the ladder: exact allocation, never pooled.
            self.stats.allocated.fetch_add(1, Ordering::Relaxed);
            return LargeBuffer::alloc(min_size, None);
        };

        for bag in &self.bags[step..] {
            if let Some(mut buf) = bag.pop() {
                if scrub_on_rent {
                    buf.scrub();
                }
                return Ok(buf);
            }
        }

        self.stats.allocated.fetch_add(1, Ordering::Relaxed);
        LargeBuffer::alloc(self.sizes[step], Some(step))
    }

    /// Returns a rented buffer under the given zeroing behavior.
    ///
    /// Never fails: over-max and surplus buffers are quietly freed.
    pub(crate) fn give_back(&self, buf: LargeBuffer, behavior: ZeroBufferBehavior) {
        self.stats.returned.fetch_add(1, Ordering::Relaxed);

        if buf.step().is_none() {
            self.stats.released.fetch_add(1, Ordering::Relaxed);
            buf.release();
            return;
        }
        if buf.is_clean() {
            self.insert(buf);
            return;
        }
        match behavior {
            ZeroBufferBehavior::OnRelease => {
                let mut buf = buf;
                buf.scrub();
                self.insert(buf);
            }
            ZeroBufferBehavior::OutOfBand => scrubber::scrubber().submit_large(buf),
            ZeroBufferBehavior::None => self.insert(buf),
        }
    }

    /// Pushes a buffer into its step bag, or frees it when the bag is full.
    /// Also the scrubber's reinsertion entry point.
    pub(crate) fn insert(&self, buf: LargeBuffer) {
        let step = match buf.step() {
            Some(step) if step < self.bags.len() => step,
            _ => {
                self.stats.released.fetch_add(1, Ordering::Relaxed);
                buf.release();
                return;
            }
        };
        if let Err(buf) = self.bags[step].push(buf) {
            self.stats.released.fetch_add(1, Ordering::Relaxed);
            buf.release();
        }
    }

    /// Pre-allocates `count` buffers at the step covering `min_size`.
    pub(crate) fn warm(&self, min_size: usize, count: usize) -> Result<()> {
        let Some(step) = self.step_for(min_size) else {
            return Ok(());
        };
        for _ in 0..count.min(STEP_RETENTION) {
            self.stats.allocated.fetch_add(1, Ordering::Relaxed);
            let buf = LargeBuffer::alloc(self.sizes[step], Some(step))?;
            if let Err(buf) = self.bags[step].push(buf) {
                buf.release();
                break;
            }
        }
        Ok(())
    }

    /// Frees every idle buffer in every bag.
    pub(crate) fn drain(&self) {
        for bag in &self.bags {
            while let Some(buf) = bag.pop() {
                self.stats.released.fetch_add(1, Ordering::Relaxed);
                buf.release();
            }
        }
    }

    /// Returns a snapshot of pool statistics.
    pub(crate) fn stats(&self) -> LargePoolStats {
        LargePoolStats {
            free: self.bags.iter().map(|b| b.len()).sum(),
            rented: self.stats.rented.load(Ordering::Relaxed),
            returned: self.stats.returned.load(Ordering::Relaxed),
            allocated: self.stats.allocated.load(Ordering::Relaxed),
            released: self.stats.released.load(Ordering::Relaxed),
            ladder_steps: self.sizes.len(),
        }
    }
}

static LARGE_POOL: OnceLock<LargePool> = OnceLock::new();

/// The process-wide large-buffer pool.
pub(crate) fn large_pool() -> &'static LargePool {
    LARGE_POOL.get_or_init(LargePool::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_pool(unit: usize, max: usize) -> LargePool {
        let sizes: Vec<usize> = (1..=max / unit).map(|i| i * unit).collect();
        let bags = sizes.iter().map(|_| ArrayQueue::new(STEP_RETENTION)).collect();
        LargePool {
            bags,
            sizes,
            ladder: LadderKind::Linear,
            unit,
            stats: LargePoolStatsInner {
                rented: AtomicUsize::new(0),
                returned: AtomicUsize::new(0),
                allocated: AtomicUsize::new(0),
                released: AtomicUsize::new(0),
            },
        }
    }

    fn exponential_pool(base: usize, max: usize) -> LargePool {
        let mut sizes = Vec::new();
        let mut size = base;
        while size <= max {
            sizes.push(size);
            size *= 2;
        }
        let bags = sizes.iter().map(|_| ArrayQueue::new(STEP_RETENTION)).collect();
        LargePool {
            bags,
            sizes,
            ladder: LadderKind::Exponential,
            unit: base,
            stats: LargePoolStatsInner {
                rented: AtomicUsize::new(0),
                returned: AtomicUsize::new(0),
                allocated: AtomicUsize::new(0),
                released: AtomicUsize::new(0),
            },
        }
    }

    const MIB: usize = 1024 * 1024;

    #[test]
    fn test_linear_step_lookup() {
        let pool = linear_pool(MIB, 8 * MIB);
        assert_eq!(pool.step_for(1), Some(0));
        assert_eq!(pool.step_for(MIB), Some(0));
        assert_eq!(pool.step_for(MIB + 1), Some(1));
        assert_eq!(pool.step_for(8 * MIB), Some(7));
        assert_eq!(pool.step_for(8 * MIB + 1), None);
    }

    #[test]
    fn test_exponential_step_lookup() {
        let pool = exponential_pool(16 * MIB, 256 * MIB);
        assert_eq!(pool.step_for(MIB), Some(0));
        assert_eq!(pool.step_for(16 * MIB), Some(0));
        assert_eq!(pool.step_for(20 * MIB), Some(1)); // 32 MiB step
        assert_eq!(pool.step_for(200 * MIB), Some(4)); // 256 MiB step
        assert_eq!(pool.step_for(300 * MIB), None);
    }

    #[test]
    fn test_rent_rounds_up_to_step() {
        let pool = linear_pool(MIB, 8 * MIB);
        let buf = pool.rent(MIB + 1, true).unwrap();
        assert_eq!(buf.len(), 2 * MIB);
        pool.give_back(buf, ZeroBufferBehavior::OnRelease);
    }

    #[test]
    fn test_walk_up_prefers_pooled_over_fresh() {
        let pool = linear_pool(MIB, 8 * MIB);
        // Seed a 3 MiB buffer, then ask for 2 MiB: the pooled larger
        // buffer wins over a fresh exact-step allocation.
        let seed = pool.rent(3 * MIB, true).unwrap();
        pool.give_back(seed, ZeroBufferBehavior::OnRelease);
        let allocated_before = pool.stats().allocated;
        let buf = pool.rent(2 * MIB, true).unwrap();
        assert_eq!(buf.len(), 3 * MIB);
        assert_eq!(pool.stats().allocated, allocated_before);
        pool.give_back(buf, ZeroBufferBehavior::OnRelease);
    }

    #[test]
    fn test_over_max_never_pooled() {
        let pool = linear_pool(MIB, 4 * MIB);
        let buf = pool.rent(5 * MIB, true).unwrap();
        assert_eq!(buf.len(), 5 * MIB);
        assert_eq!(buf.step(), None);
        let released_before = pool.stats().released;
        pool.give_back(buf, ZeroBufferBehavior::OnRelease);
        assert_eq!(pool.stats().released, released_before + 1);
        assert_eq!(pool.stats().free, 0);
    }

    #[test]
    fn test_step_retention_cap() {
        let pool = linear_pool(MIB, 4 * MIB);
        let bufs: Vec<_> = (0..STEP_RETENTION + 2)
            .map(|_| LargeBuffer::alloc(MIB, Some(0)).unwrap())
            .collect();
        for buf in bufs {
            pool.give_back(buf, ZeroBufferBehavior::OnRelease);
        }
        assert_eq!(pool.stats().free, STEP_RETENTION);
    }

    #[test]
    fn test_drain_empties_bags() {
        let pool = linear_pool(MIB, 4 * MIB);
        pool.warm(MIB, 2).unwrap();
        assert_eq!(pool.stats().free, 2);
        pool.drain();
        assert_eq!(pool.stats().free, 0);
    }
}
