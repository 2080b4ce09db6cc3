// src/pool/block.rs
//! Process-wide small-block pool.
//!
//! A single lock-free free list serves every dynamic stream in the process.
//! Retention is soft-capped by the peak concurrent rental count: the pool
//! keeps at most as many idle blocks as were ever rented at once, and
//! surplus returns are freed back to the allocator.
//!
//! # Zeroing
//!
//! The return path follows the owning stream's [`ZeroBufferBehavior`]:
//! inline scrub (`OnRelease`), hand-off to the background scrubber
//! (`OutOfBand`), or dirty reinsertion (`None`).  The rent path re-scrubs
//! any dirty block before exposure unless the renter opted out, so the
//! scrubber is an optimization, not a correctness requirement.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::alloc::Block;
use crate::error::Result;
use crate::pool::scrubber;
use crate::pool::stats::BlockPoolStats;
use crate::settings::ZeroBufferBehavior;

// ---------------------------------------------------------------------------
// BlockPool
// ---------------------------------------------------------------------------

pub(crate) struct BlockPoolStatsInner {
    rented: AtomicUsize,
    returned: AtomicUsize,
    allocated: AtomicUsize,
    released: AtomicUsize,
}

/// The process-wide pool of segment blocks.
///
/// `idle` shadows the free-list depth for the retention check.  It is bumped
/// before the matching queue operation and not in the same atomic step, so
/// the reading side sees at-least-as-large values; under heavy concurrency
/// the free list may transiently exceed the soft cap by a small constant,
/// which the heuristic tolerates.
pub(crate) struct BlockPool {
    free: crossbeam::queue::SegQueue<Block>,
    idle: AtomicUsize,
    outstanding: AtomicUsize,
    peak: AtomicUsize,
    stats: BlockPoolStatsInner,
}

impl BlockPool {
    fn new() -> Self {
        Self {
            free: crossbeam::queue::SegQueue::new(),
            idle: AtomicUsize::new(0),
            outstanding: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            stats: BlockPoolStatsInner {
                rented: AtomicUsize::new(0),
                returned: AtomicUsize::new(0),
                allocated: AtomicUsize::new(0),
                released: AtomicUsize::new(0),
            },
        }
    }

    fn take_idle(&self) -> Option<Block> {
        let block = self.free.pop()?;
        self.idle.fetch_sub(1, Ordering::Relaxed);
        Some(block)
    }

    fn park_idle(&self, block: Block) {
        self.idle.fetch_add(1, Ordering::Relaxed);
        self.free.push(block);
    }

    /// Approximate free-list depth.
    #[inline]
    fn idle_count(&self) -> usize {
        self.idle.load(Ordering::Relaxed)
    }

    /// Pops a free block or allocates a fresh one.
    ///
    /// With `scrub_on_rent` the block is guaranteed zero on return; without
    /// it (the `None` policy) a reused block may expose stale bytes.
    pub(crate) fn rent(&self, scrub_on_rent: bool) -> Result<Block> {
        self.stats.rented.fetch_add(1, Ordering::Relaxed);

        let block = match self.take_idle() {
            Some(mut block) => {
                if scrub_on_rent {
                    block.scrub();
                }
                block
            }
            None => {
                self.stats.allocated.fetch_add(1, Ordering::Relaxed);
                Block::alloc()?
            }
        };

        let now = self.outstanding.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak.fetch_max(now, Ordering::Relaxed);
        Ok(block)
    }

    /// Returns a rented block under the given zeroing behavior.
    ///
    /// Never fails: surplus blocks are quietly freed.
    pub(crate) fn give_back(&self, block: Block, behavior: ZeroBufferBehavior) {
        self.outstanding.fetch_sub(1, Ordering::Relaxed);
        self.stats.returned.fetch_add(1, Ordering::Relaxed);

        if block.is_clean() {
            // Never written since the last scrub; skip the queue entirely.
            self.insert(block);
            return;
        }
        match behavior {
            ZeroBufferBehavior::OnRelease => {
                let mut block = block;
                block.scrub();
                self.insert(block);
            }
            ZeroBufferBehavior::OutOfBand => scrubber::scrubber().submit_block(block),
            ZeroBufferBehavior::None => self.insert(block),
        }
    }

    /// Parks a block on the free list, or frees it when the list is at the
    /// retention cap.  Also the scrubber's reinsertion entry point.
    pub(crate) fn insert(&self, block: Block) {
        if self.idle_count() < self.retention_cap() {
            self.park_idle(block);
        } else {
            self.stats.released.fetch_add(1, Ordering::Relaxed);
            block.release();
        }
    }

    /// Soft retention cap: the peak concurrent rental count.
    fn retention_cap(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }

    /// Pre-allocates blocks until roughly `target` are idle.
    ///
    /// Raises the retention cap so the warmed blocks survive the next
    /// return-path cap check.
    pub(crate) fn warm(&self, target: usize) -> Result<()> {
        self.peak.fetch_max(target, Ordering::Relaxed);
        for _ in self.idle_count()..target {
            self.stats.allocated.fetch_add(1, Ordering::Relaxed);
            self.park_idle(Block::alloc()?);
        }
        Ok(())
    }

    /// Frees every idle block and resets the high-water mark.
    pub(crate) fn drain(&self) {
        while let Some(block) = self.take_idle() {
            self.stats.released.fetch_add(1, Ordering::Relaxed);
            block.release();
        }
        self.peak
            .store(self.outstanding.load(Ordering::Relaxed), Ordering::Relaxed);
    }

    /// Returns a snapshot of pool statistics.
    ///
    /// All counters use `Relaxed` ordering; values are eventually consistent.
    pub(crate) fn stats(&self) -> BlockPoolStats {
        BlockPoolStats {
            free: self.idle_count(),
            outstanding: self.outstanding.load(Ordering::Relaxed),
            peak_outstanding: self.peak.load(Ordering::Relaxed),
            rented: self.stats.rented.load(Ordering::Relaxed),
            returned: self.stats.returned.load(Ordering::Relaxed),
            allocated: self.stats.allocated.load(Ordering::Relaxed),
            released: self.stats.released.load(Ordering::Relaxed),
        }
    }
}

static BLOCK_POOL: OnceLock<BlockPool> = OnceLock::new();

/// The process-wide block pool.
pub(crate) fn block_pool() -> &'static BlockPool {
    BLOCK_POOL.get_or_init(BlockPool::new)
}
