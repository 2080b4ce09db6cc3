// src/alloc/mod.rs
//! Raw storage: fixed-size blocks and ladder-sized large buffers.
//!
//! Blocks are always managed (heap) memory.  Large buffers are managed or
//! native (anonymous OS pages) depending on the latched process-wide switch;
//! above this module the backing is invisible — both expose plain byte
//! slices.  All managed allocation is fallible: exhaustion surfaces as
//! [`StreamError::OutOfMemory`] instead of aborting.

#[cfg(any(unix, windows))]
pub(crate) mod native;

use zeroize::Zeroize;

use crate::error::{Result, StreamError};
use crate::events;
use crate::settings;

/// Storage backing of a large buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backing {
    /// Ordinary heap allocation.
    Managed,
    /// Anonymous pages mapped from the operating system.
    Native,
}

impl Backing {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Managed => "Managed",
            Self::Native => "Native",
        }
    }
}

fn zeroed_vec(size: usize) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    data.try_reserve_exact(size)
        .map_err(|_| StreamError::OutOfMemory)?;
    data.resize(size, 0);
    Ok(data)
}

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

/// One fixed-size segment block.
///
/// The `clean` flag tracks whether the contents are known-zero; the rent
/// path re-scrubs dirty blocks before exposure, so out-of-band scrubbing is
/// an optimization rather than a correctness requirement.
pub(crate) struct Block {
    data: Vec<u8>,
    clean: bool,
}

impl Block {
    /// Allocates a zeroed block of the process-wide block size.
    pub(crate) fn alloc() -> Result<Self> {
        let size = settings::options().block_size;
        let data = zeroed_vec(size)?;
        events::buffer_allocated(size, Backing::Managed);
        Ok(Self { data, clean: true })
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    #[inline]
    pub(crate) fn is_clean(&self) -> bool {
        self.clean
    }

    /// Marks the contents stale.  Called whenever a writable slice is handed
    /// out.
    #[inline]
    pub(crate) fn mark_dirty(&mut self) {
        self.clean = false;
    }

    /// Zero-fills the whole block (compiler-resistant) and marks it clean.
    pub(crate) fn scrub(&mut self) {
        if !self.clean {
            self.data.as_mut_slice().zeroize();
            self.clean = true;
        }
    }

    /// Frees the block, emitting the release event.
    pub(crate) fn release(self) {
        events::buffer_released(self.len(), Backing::Managed);
    }
}

// ---------------------------------------------------------------------------
// LargeBuffer
// ---------------------------------------------------------------------------

enum Storage {
    Managed(Vec<u8>),
    #[cfg(any(unix, windows))]
    Native(native::NativeMem),
}

/// A single contiguous buffer from the large-buffer ladder.
pub(crate) struct LargeBuffer {
    storage: Storage,
    /// Ladder step this buffer belongs to; `None` for over-max buffers,
    /// which are never pooled.
    step: Option<usize>,
    clean: bool,
}

impl LargeBuffer {
    /// Allocates a zeroed buffer of exactly `size` bytes.
    ///
    /// The managed/native choice reads the latched process-wide switch.
    pub(crate) fn alloc(size: usize, step: Option<usize>) -> Result<Self> {
        let storage = if settings::use_native_large_buffers() {
            Self::alloc_native(size)?
        } else {
            Storage::Managed(zeroed_vec(size)?)
        };
        let buf = Self {
            storage,
            step,
            clean: true,
        };
        events::buffer_allocated(size, buf.backing());
        Ok(buf)
    }

    #[cfg(any(unix, windows))]
    fn alloc_native(size: usize) -> Result<Storage> {
        Ok(Storage::Native(native::NativeMem::alloc(size)?))
    }

    #[cfg(not(any(unix, windows)))]
    fn alloc_native(size: usize) -> Result<Storage> {
        // No page-mapping primitive on this target; fall back to the heap.
        Ok(Storage::Managed(zeroed_vec(size)?))
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        match &self.storage {
            Storage::Managed(v) => v.len(),
            #[cfg(any(unix, windows))]
            Storage::Native(m) => m.len(),
        }
    }

    #[inline]
    pub(crate) fn as_slice(&self) -> &[u8] {
        match &self.storage {
            Storage::Managed(v) => v,
            #[cfg(any(unix, windows))]
            Storage::Native(m) => m.as_slice(),
        }
    }

    #[inline]
    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        match &mut self.storage {
            Storage::Managed(v) => v,
            #[cfg(any(unix, windows))]
            Storage::Native(m) => m.as_mut_slice(),
        }
    }

    #[inline]
    pub(crate) fn backing(&self) -> Backing {
        match &self.storage {
            Storage::Managed(_) => Backing::Managed,
            #[cfg(any(unix, windows))]
            Storage::Native(_) => Backing::Native,
        }
    }

    #[inline]
    pub(crate) fn step(&self) -> Option<usize> {
        self.step
    }

    #[inline]
    pub(crate) fn is_clean(&self) -> bool {
        self.clean
    }

    #[inline]
    pub(crate) fn mark_dirty(&mut self) {
        self.clean = false;
    }

    /// Zero-fills the whole buffer and marks it clean.
    pub(crate) fn scrub(&mut self) {
        if !self.clean {
            self.as_mut_slice().zeroize();
            self.clean = true;
        }
    }

    /// Frees the buffer, emitting the release event.
    pub(crate) fn release(self) {
        events::buffer_released(self.len(), self.backing());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_is_zeroed_and_sized() {
        let block = Block::alloc().unwrap();
        assert_eq!(block.len(), settings::options().block_size);
        assert!(block.as_slice().iter().all(|&b| b == 0));
        assert!(block.is_clean());
    }

    #[test]
    fn test_block_scrub_restores_zero() {
        let mut block = Block::alloc().unwrap();
        block.mark_dirty();
        block.as_mut_slice()[..16].copy_from_slice(&[0xAA; 16]);
        block.scrub();
        assert!(block.is_clean());
        assert!(block.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_large_buffer_managed() {
        let buf = LargeBuffer::alloc(1024 * 1024, Some(0)).unwrap();
        assert_eq!(buf.len(), 1024 * 1024);
        assert_eq!(buf.step(), Some(0));
        assert!(buf.as_slice().iter().all(|&b| b == 0));
    }

    #[cfg(any(unix, windows))]
    #[test]
    fn test_native_mem_round_trip() {
        let mut mem = native::NativeMem::alloc(8192).unwrap();
        assert_eq!(mem.len(), 8192);
        assert!(mem.as_slice().iter().all(|&b| b == 0));
        mem.as_mut_slice()[0] = 0x5A;
        assert_eq!(mem.as_slice()[0], 0x5A);
    }
}
