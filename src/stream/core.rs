// src/stream/core.rs
//! Core stream state and lifecycle.
//!
//! A [`SegStream`] is a seekable, growable in-memory byte stream whose
//! storage is rented from the process-wide pools: a chain of fixed-size
//! blocks while small, a single ladder-sized large buffer once it grows
//! past the promotion threshold, or a caller-supplied vec in fixed mode.

use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};

use zeroize::Zeroize;

use crate::alloc::LargeBuffer;
use crate::error::{Result, StreamError};
use crate::events;
use crate::pool::large::large_pool;
use crate::settings::{self, StreamSettings, ZeroBufferBehavior};
use crate::stream::segments::SegmentChain;

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) struct FixedBuf {
    pub(crate) data: Vec<u8>,
    pub(crate) start: usize,
    pub(crate) span: usize,
}

pub(crate) enum State {
    Segmented(SegmentChain),
    Large(LargeBuffer),
    Fixed(FixedBuf),
    Closed,
}

/// A segmented, pool-backed in-memory byte stream.
///
/// Behaves like an ordinary growable cursor over bytes, but the backing
/// storage is rented from process-wide pools and returned (zeroed per the
/// stream's [`StreamSettings`]) when the stream is closed or dropped.
///
/// Streams are single-owner: `Send` but not shareable without external
/// synchronization, the same contract as any other byte stream.
///
/// # Examples
///
/// ```
/// use std::io::{Read, Seek, SeekFrom, Write};
/// use segbuf::SegStream;
///
/// let mut stream = SegStream::new();
/// stream.write_all(b"hello")?;
/// stream.seek(SeekFrom::Start(0))?;
///
/// let mut out = String::new();
/// stream.read_to_string(&mut out)?;
/// assert_eq!(out, "hello");
/// # Ok::<(), std::io::Error>(())
/// ```
pub struct SegStream {
    pub(crate) state: State,
    pub(crate) len: usize,
    pub(crate) pos: usize,
    pub(crate) settings: StreamSettings,
    pub(crate) id: u64,
}

impl SegStream {
    /// Creates an empty dynamic stream with default settings.
    ///
    /// No storage is rented until the first write.
    pub fn new() -> Self {
        Self::with_settings(StreamSettings::default())
    }

    /// Creates an empty dynamic stream with the given settings.
    pub fn with_settings(settings: StreamSettings) -> Self {
        let id = NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed);
        events::stream_created(id, "segmented", 0);
        Self {
            state: State::Segmented(SegmentChain::new()),
            len: 0,
            pos: 0,
            settings,
            id,
        }
    }

    /// Creates a dynamic stream with storage for `capacity` bytes already
    /// rented.
    ///
    /// A capacity above the promotion threshold goes straight to
    /// large-buffer mode.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        Self::with_capacity_and_settings(capacity, StreamSettings::default())
    }

    /// Creates a dynamic stream with pre-rented storage and the given
    /// settings.
    pub fn with_capacity_and_settings(capacity: usize, settings: StreamSettings) -> Result<Self> {
        let id = NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed);
        let behavior = settings.zero_behavior;
        let threshold = settings::options().promotion_threshold;
        let state = if capacity > threshold {
            let buf = large_pool().rent(capacity, behavior != ZeroBufferBehavior::None)?;
            events::stream_created(id, "large", buf.len());
            State::Large(buf)
        } else {
            let mut chain = SegmentChain::new();
            chain.ensure_capacity(capacity, behavior)?;
            events::stream_created(id, "segmented", chain.capacity());
            State::Segmented(chain)
        };
        Ok(Self {
            state,
            len: 0,
            pos: 0,
            settings,
            id,
        })
    }

    /// Wraps a caller-supplied vec as a fixed stream over its whole length.
    ///
    /// Fixed streams cannot grow; the zeroing behavior is forced to
    /// `OnRelease`, so the wrapped span is wiped when the stream closes.
    pub fn wrap(data: Vec<u8>) -> Self {
        let span = data.len();
        Self::wrap_range(data, 0, span).expect("whole-vec range is always valid")
    }

    /// Wraps `count` bytes of a caller-supplied vec starting at `offset`.
    pub fn wrap_range(data: Vec<u8>, offset: usize, count: usize) -> Result<Self> {
        let end = offset
            .checked_add(count)
            .ok_or(StreamError::CapacityOverflow)?;
        if end > data.len() {
            return Err(StreamError::PositionOutOfBounds);
        }
        let id = NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed);
        events::stream_created(id, "fixed", count);
        Ok(Self {
            state: State::Fixed(FixedBuf {
                data,
                start: offset,
                span: count,
            }),
            len: count,
            pos: 0,
            settings: StreamSettings::default().with_zero_behavior(ZeroBufferBehavior::OnRelease),
            id,
        })
    }

    /// Logical length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the stream holds no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current physical capacity in bytes.
    pub fn capacity(&self) -> usize {
        match &self.state {
            State::Segmented(chain) => chain.capacity(),
            State::Large(buf) => buf.len(),
            State::Fixed(fixed) => fixed.span,
            State::Closed => 0,
        }
    }

    /// Current read/write position.
    ///
    /// May point past the end; a write there zero-fills the gap.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Sets the read/write position.  Positions past the end are allowed.
    pub fn set_position(&mut self, pos: usize) -> Result<()> {
        self.check_open()?;
        self.pos = pos;
        Ok(())
    }

    /// The stream's settings.
    #[inline]
    pub fn settings(&self) -> StreamSettings {
        self.settings
    }

    /// Returns `true` if the stream wraps a caller-supplied buffer.
    pub fn is_fixed(&self) -> bool {
        matches!(self.state, State::Fixed(_))
    }

    /// Returns `true` once the stream has been closed.
    pub fn is_closed(&self) -> bool {
        matches!(self.state, State::Closed)
    }

    #[inline]
    pub(crate) fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(StreamError::Closed)
        } else {
            Ok(())
        }
    }

    /// Closes the stream, returning all rented storage to the pools.
    ///
    /// Idempotent; every later operation fails with
    /// [`StreamError::Closed`].  A fixed stream's wrapped span is wiped
    /// unless the zeroing behavior is `None`.
    pub fn close(&mut self) {
        if self.is_closed() {
            return;
        }
        self.release_storage();
        events::stream_disposed(self.id);
    }

    /// Recovers the wrapped vec from a fixed stream without wiping it.
    ///
    /// Fails with [`StreamError::NoContiguousBuffer`] for dynamic streams,
    /// whose storage belongs to the pools.  The stream is consumed and
    /// closed either way.
    pub fn into_inner(mut self) -> Result<Vec<u8>> {
        match mem::replace(&mut self.state, State::Closed) {
            State::Fixed(fixed) => {
                events::stream_disposed(self.id);
                Ok(fixed.data)
            }
            other => {
                self.state = other;
                self.close();
                Err(StreamError::NoContiguousBuffer)
            }
        }
    }

    fn release_storage(&mut self) {
        let behavior = self.settings.zero_behavior;
        match mem::replace(&mut self.state, State::Closed) {
            State::Segmented(mut chain) => chain.release_all(behavior),
            State::Large(buf) => large_pool().give_back(buf, behavior),
            State::Fixed(mut fixed) => {
                if behavior != ZeroBufferBehavior::None {
                    fixed.data[fixed.start..fixed.start + fixed.span].zeroize();
                }
            }
            State::Closed => {}
        }
        self.len = 0;
        self.pos = 0;
    }

    // -----------------------------------------------------------------
    // Capacity transitions
    // -----------------------------------------------------------------

    /// Grows physical capacity to cover `needed` bytes, promoting to
    /// large-buffer mode when the request passes the threshold.
    ///
    /// On failure the stream keeps its previous capacity (no half-grown
    /// state).
    pub(crate) fn grow_to(&mut self, needed: usize) -> Result<()> {
        let behavior = self.settings.zero_behavior;
        let threshold = settings::options().promotion_threshold;
        let len = self.len;
        let id = self.id;
        match &mut self.state {
            State::Closed => return Err(StreamError::Closed),
            State::Fixed(fixed) => {
                return if needed <= fixed.span {
                    Ok(())
                } else {
                    Err(StreamError::FixedCapacity)
                };
            }
            State::Large(buf) => {
                if needed <= buf.len() {
                    return Ok(());
                }
                let old_capacity = buf.len();
                let mut bigger =
                    large_pool().rent(needed, behavior != ZeroBufferBehavior::None)?;
                if len > 0 {
                    bigger.mark_dirty();
                    bigger.as_mut_slice()[..len].copy_from_slice(&buf.as_slice()[..len]);
                }
                let new_capacity = bigger.len();
                let old = mem::replace(buf, bigger);
                large_pool().give_back(old, behavior);
                events::capacity_expand(id, old_capacity, new_capacity);
                return Ok(());
            }
            State::Segmented(chain) => {
                if needed <= chain.capacity() {
                    return Ok(());
                }
                if needed <= threshold {
                    let old_capacity = chain.capacity();
                    chain.ensure_capacity(needed, behavior)?;
                    events::capacity_expand(id, old_capacity, chain.capacity());
                    return Ok(());
                }
            }
        }
        self.promote(needed)
    }

    /// Moves segmented content into one rented large buffer.
    fn promote(&mut self, needed: usize) -> Result<()> {
        let behavior = self.settings.zero_behavior;
        let len = self.len;
        let State::Segmented(chain) = &mut self.state else {
            unreachable!("promotion starts from segmented mode");
        };
        let old_capacity = chain.capacity();
        let mut buf = large_pool().rent(needed, behavior != ZeroBufferBehavior::None)?;
        if len > 0 {
            buf.mark_dirty();
            chain.read_at(0, &mut buf.as_mut_slice()[..len]);
        }
        chain.release_all(behavior);
        let new_capacity = buf.len();
        self.state = State::Large(buf);
        events::capacity_expand(self.id, old_capacity, new_capacity);
        Ok(())
    }

    /// Releases capacity no longer needed for `target_len` bytes.
    ///
    /// Large-buffer streams demote back to segments only once the length
    /// falls below half the promotion threshold — the hysteresis that keeps
    /// near-threshold workloads from thrashing between modes.  Shrinking
    /// never fails; if the pool cannot supply demotion blocks the stream
    /// simply stays large.
    pub(crate) fn shrink_for(&mut self, target_len: usize) {
        let behavior = self.settings.zero_behavior;
        let threshold = settings::options().promotion_threshold;
        let id = self.id;
        match &mut self.state {
            State::Segmented(chain) => {
                let old_capacity = chain.capacity();
                chain.reduce_capacity(target_len, behavior);
                if chain.capacity() < old_capacity {
                    events::capacity_reduced(id, old_capacity, chain.capacity());
                }
            }
            State::Large(buf) => {
                if target_len >= threshold / 2 {
                    return;
                }
                let mut chain = SegmentChain::new();
                if chain.ensure_capacity(target_len, behavior).is_err() {
                    return;
                }
                if target_len > 0 {
                    chain.write_at(0, &buf.as_slice()[..target_len]);
                }
                let old_capacity = buf.len();
                let old = mem::replace(&mut self.state, State::Segmented(chain));
                if let State::Large(buf) = old {
                    large_pool().give_back(buf, behavior);
                }
                let new_capacity = self.capacity();
                events::capacity_reduced(id, old_capacity, new_capacity);
            }
            State::Fixed(_) | State::Closed => {}
        }
    }
}

impl Default for SegStream {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SegStream {
    /// Best-effort safety net: an unclosed stream still returns its rented
    /// storage, but the drop is reported at warn level.
    fn drop(&mut self) {
        if !self.is_closed() {
            self.release_storage();
            events::stream_finalized(self.id);
        }
    }
}

impl std::fmt::Debug for SegStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match &self.state {
            State::Segmented(_) => "segmented",
            State::Large(_) => "large",
            State::Fixed(_) => "fixed",
            State::Closed => "closed",
        };
        f.debug_struct("SegStream")
            .field("mode", &mode)
            .field("len", &self.len)
            .field("pos", &self.pos)
            .field("capacity", &self.capacity())
            .finish()
    }
}
