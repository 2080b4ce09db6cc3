// src/pool/stats.rs
//! Statistics snapshots for the process-wide pools.

/// Statistics for the small-block pool.
#[derive(Debug, Clone)]
pub struct BlockPoolStats {
    /// Number of blocks currently idle on the free list
    pub free: usize,
    /// Number of blocks currently rented out
    pub outstanding: usize,
    /// Highest concurrent rental count observed (the retention soft cap)
    pub peak_outstanding: usize,
    /// Total rent_block calls
    pub rented: usize,
    /// Total blocks returned
    pub returned: usize,
    /// Total fresh allocations
    pub allocated: usize,
    /// Total blocks freed back to the allocator
    pub released: usize,
}

impl BlockPoolStats {
    /// Returns the pool hit rate as a percentage (0.0-100.0).
    ///
    /// A higher hit rate indicates better block reuse and fewer allocations.
    pub fn hit_rate(&self) -> f64 {
        if self.rented == 0 {
            return 0.0;
        }
        let reused = self.rented.saturating_sub(self.allocated);
        (reused as f64 / self.rented as f64) * 100.0
    }
}

/// Statistics for the large-buffer pool.
#[derive(Debug, Clone)]
pub struct LargePoolStats {
    /// Number of buffers currently idle across all ladder steps
    pub free: usize,
    /// Total rent_large calls
    pub rented: usize,
    /// Total buffers returned
    pub returned: usize,
    /// Total fresh allocations (including over-max passthroughs)
    pub allocated: usize,
    /// Total buffers freed back to the allocator
    pub released: usize,
    /// Number of ladder steps
    pub ladder_steps: usize,
}

impl LargePoolStats {
    /// Returns the pool hit rate as a percentage (0.0-100.0).
    pub fn hit_rate(&self) -> f64 {
        if self.rented == 0 {
            return 0.0;
        }
        let reused = self.rented.saturating_sub(self.allocated);
        (reused as f64 / self.rented as f64) * 100.0
    }
}
