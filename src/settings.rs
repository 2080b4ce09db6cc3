// src/settings.rs
//! Per-stream settings and the latched process-wide options.
//!
//! Stream settings are plain values with chainable `with_*` mutators.  The
//! process-wide [`GlobalOptions`] (block size, promotion threshold, large
//! buffer ladder shape, native backing switch) latch on first allocator use:
//! [`configure`] installs them beforehand, and once latched any further
//! attempt only produces a warning.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// When returned pool memory is zeroed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZeroBufferBehavior {
    /// Returned buffers are queued to the background scrubber and zeroed
    /// off the caller's thread.  Default for dynamic streams.
    #[default]
    OutOfBand,
    /// Returned buffers are zeroed synchronously before re-entering the
    /// pool.  Forced for fixed (wrapped) streams.
    OnRelease,
    /// No zeroing.  A rented buffer may expose stale bytes; callers own
    /// overwrite semantics.
    None,
}

/// Per-stream configuration.
///
/// Settings are value-typed: each mutator returns an updated copy, so they
/// chain without touching the original.
///
/// # Examples
///
/// ```
/// use segbuf::{StreamSettings, ZeroBufferBehavior};
///
/// let settings = StreamSettings::default()
///     .with_zero_behavior(ZeroBufferBehavior::OnRelease);
/// assert_eq!(settings.zero_behavior, ZeroBufferBehavior::OnRelease);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamSettings {
    /// Zeroing discipline for storage this stream returns to the pools.
    pub zero_behavior: ZeroBufferBehavior,
}

impl StreamSettings {
    /// Returns a copy with the given zeroing behavior.
    #[must_use]
    pub fn with_zero_behavior(mut self, behavior: ZeroBufferBehavior) -> Self {
        self.zero_behavior = behavior;
        self
    }
}

/// Shape of the large-buffer size ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LadderKind {
    /// Step `i` holds buffers of `(i + 1) * unit` bytes.
    Linear,
    /// Step `i` holds buffers of `unit << i` bytes.
    Exponential,
}

/// Process-wide options, latched at first allocator use.
#[derive(Debug, Clone)]
pub struct GlobalOptions {
    /// Size of one segment block in bytes.  Power of two.
    pub block_size: usize,
    /// Aggregate segmented capacity above which a stream promotes to a
    /// single large buffer.
    pub promotion_threshold: usize,
    /// Linear step / exponential base of the large-buffer ladder.  Power
    /// of two.
    pub large_growth_unit: usize,
    /// Ladder shape for the large-buffer pool.
    pub ladder: LadderKind,
    /// Ceiling for a single pooled large buffer.  Bigger requests are
    /// allocated exactly and never pooled.
    pub max_buffer_size: usize,
    /// Back large buffers with anonymous OS pages instead of the managed
    /// heap.
    pub use_native_large_buffers: bool,
    /// Strict upper cap on cached string-builder capacity.
    pub max_cached_builder_capacity: usize,
}

/// Default segment block size (64 KiB).
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;
/// Default promotion threshold (1 MiB).
pub const DEFAULT_PROMOTION_THRESHOLD: usize = 1024 * 1024;
/// Default large-buffer growth unit (1 MiB).
pub const DEFAULT_LARGE_GROWTH_UNIT: usize = 1024 * 1024;
/// Default single-buffer ceiling (128 MiB).
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 128 * 1024 * 1024;
/// Default builder-cache capacity cap.
pub const DEFAULT_MAX_CACHED_BUILDER_CAPACITY: usize = 4096;

// Builder buckets are a fixed-width thread-local array; capacities above
// this cannot be bucketed.
pub(crate) const MAX_CACHEABLE_BUILDER_CAPACITY: usize = 512 * 1024;

impl Default for GlobalOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            promotion_threshold: DEFAULT_PROMOTION_THRESHOLD,
            large_growth_unit: DEFAULT_LARGE_GROWTH_UNIT,
            ladder: LadderKind::Linear,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            use_native_large_buffers: false,
            max_cached_builder_capacity: DEFAULT_MAX_CACHED_BUILDER_CAPACITY,
        }
    }
}

impl GlobalOptions {
    /// Returns a copy with the given block size.
    #[must_use]
    pub fn with_block_size(mut self, bytes: usize) -> Self {
        self.block_size = bytes;
        self
    }

    /// Returns a copy with the given promotion threshold.
    #[must_use]
    pub fn with_promotion_threshold(mut self, bytes: usize) -> Self {
        self.promotion_threshold = bytes;
        self
    }

    /// Returns a copy with the given ladder growth unit.
    #[must_use]
    pub fn with_large_growth_unit(mut self, bytes: usize) -> Self {
        self.large_growth_unit = bytes;
        self
    }

    /// Returns a copy with the given ladder shape.
    #[must_use]
    pub fn with_ladder(mut self, ladder: LadderKind) -> Self {
        self.ladder = ladder;
        self
    }

    /// Returns a copy with the given single-buffer ceiling.
    #[must_use]
    pub fn with_max_buffer_size(mut self, bytes: usize) -> Self {
        self.max_buffer_size = bytes;
        self
    }

    /// Returns a copy with native large-buffer backing switched on or off.
    #[must_use]
    pub fn with_native_large_buffers(mut self, enabled: bool) -> Self {
        self.use_native_large_buffers = enabled;
        self
    }

    /// Returns a copy with the given builder-cache capacity cap.
    #[must_use]
    pub fn with_max_cached_builder_capacity(mut self, bytes: usize) -> Self {
        self.max_cached_builder_capacity = bytes;
        self
    }

    /// Loads defaults, applies `SEGBUF_*` environment overrides, then
    /// normalizes.
    fn from_env() -> Self {
        let mut opts = Self::default();
        if let Some(v) = env_usize("SEGBUF_BLOCK_SIZE") {
            opts.block_size = v;
        }
        if let Some(v) = env_usize("SEGBUF_PROMOTION_THRESHOLD") {
            opts.promotion_threshold = v;
        }
        if let Some(v) = env_usize("SEGBUF_LARGE_GROWTH_UNIT") {
            opts.large_growth_unit = v;
        }
        if let Some(v) = env_bool("SEGBUF_EXPONENTIAL_LARGE") {
            opts.ladder = if v {
                LadderKind::Exponential
            } else {
                LadderKind::Linear
            };
        }
        if let Some(v) = env_usize("SEGBUF_MAX_BUFFER_SIZE") {
            opts.max_buffer_size = v;
        }
        if let Some(v) = env_bool("SEGBUF_NATIVE_LARGE") {
            opts.use_native_large_buffers = v;
        }
        if let Some(v) = env_usize("SEGBUF_MAX_CACHED_BUILDER") {
            opts.max_cached_builder_capacity = v;
        }
        opts.normalized()
    }

    /// Clamps and rounds fields to valid values.  Block size and growth
    /// unit must be powers of two for the shift/mask positional math.
    #[must_use]
    pub(crate) fn normalized(mut self) -> Self {
        self.block_size = self
            .block_size
            .clamp(4096, 16 * 1024 * 1024)
            .next_power_of_two();
        self.large_growth_unit = self
            .large_growth_unit
            .clamp(self.block_size, 1 << 30)
            .next_power_of_two();
        self.promotion_threshold = self
            .promotion_threshold
            .clamp(self.block_size, self.max_buffer_size.max(self.block_size));
        self.max_buffer_size = self.max_buffer_size.max(self.large_growth_unit);
        self.max_cached_builder_capacity = self
            .max_cached_builder_capacity
            .min(MAX_CACHEABLE_BUILDER_CAPACITY);
        self
    }
}

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok()?.trim().parse().ok()
}

fn env_bool(name: &str) -> Option<bool> {
    match std::env::var(name).ok()?.trim() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

static OPTIONS: OnceLock<GlobalOptions> = OnceLock::new();

// Advisory mirror of the native switch for callers that toggle it through
// set_use_native_large_buffers() before the options latch.
static NATIVE_STAGE: AtomicBool = AtomicBool::new(false);
static NATIVE_STAGED: AtomicBool = AtomicBool::new(false);

/// The latched process-wide options.
///
/// The first call latches: defaults, `SEGBUF_*` environment overrides, then
/// whatever [`configure`] installed beforehand.
pub fn options() -> &'static GlobalOptions {
    OPTIONS.get_or_init(|| {
        let mut opts = GlobalOptions::from_env();
        if NATIVE_STAGED.load(Ordering::Acquire) {
            opts.use_native_large_buffers = NATIVE_STAGE.load(Ordering::Acquire);
        }
        opts
    })
}

/// Installs process-wide options before the first allocator use.
///
/// Returns `false` (and warns) if the options were already latched; the
/// running configuration is unchanged in that case.
///
/// # Examples
///
/// ```
/// use segbuf::GlobalOptions;
///
/// segbuf::configure(GlobalOptions::default().with_block_size(64 * 1024));
/// ```
pub fn configure(opts: GlobalOptions) -> bool {
    let accepted = OPTIONS.set(opts.normalized()).is_ok();
    if !accepted {
        tracing::warn!(
            target: crate::events::TARGET,
            "configuration ignored: global options already latched"
        );
    }
    accepted
}

/// Switches large buffers to native (OS page) backing.
///
/// Latched together with the rest of the options at first allocator use;
/// calling this afterwards only updates the advisory flag and warns.
pub fn set_use_native_large_buffers(enabled: bool) {
    NATIVE_STAGE.store(enabled, Ordering::Release);
    NATIVE_STAGED.store(true, Ordering::Release);
    if OPTIONS.get().is_some() {
        tracing::warn!(
            target: crate::events::TARGET,
            enabled,
            "native large-buffer switch changed after latch; allocator keeps the latched value"
        );
    }
}

/// Whether large buffers use native backing (latched value).
pub fn use_native_large_buffers() -> bool {
    options().use_native_large_buffers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_chain() {
        let s = StreamSettings::default().with_zero_behavior(ZeroBufferBehavior::None);
        assert_eq!(s.zero_behavior, ZeroBufferBehavior::None);
        // The original is untouched (value semantics).
        let base = StreamSettings::default();
        let _ = base.with_zero_behavior(ZeroBufferBehavior::OnRelease);
        assert_eq!(base.zero_behavior, ZeroBufferBehavior::OutOfBand);
    }

    #[test]
    fn test_normalize_rounds_block_size() {
        let opts = GlobalOptions::default().with_block_size(40_000).normalized();
        assert_eq!(opts.block_size, 65_536);
        assert!(opts.block_size.is_power_of_two());
    }

    #[test]
    fn test_normalize_orders_thresholds() {
        let opts = GlobalOptions::default()
            .with_promotion_threshold(1024)
            .normalized();
        assert!(opts.promotion_threshold >= opts.block_size);
        assert!(opts.max_buffer_size >= opts.large_growth_unit);
    }

    #[test]
    fn test_builder_cap_clamped() {
        let opts = GlobalOptions::default()
            .with_max_cached_builder_capacity(usize::MAX)
            .normalized();
        assert_eq!(
            opts.max_cached_builder_capacity,
            MAX_CACHEABLE_BUILDER_CAPACITY
        );
    }
}
