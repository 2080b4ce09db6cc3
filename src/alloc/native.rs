// src/alloc/native.rs
//! Anonymous-page allocation for native large buffers.
//!
//! Pages come straight from the operating system (`mmap` on unix,
//! `VirtualAlloc` on windows) and bypass the managed heap entirely, so
//! multi-megabyte buffers cannot fragment it.  The mapping is exclusively
//! owned and unmapped on drop.

use std::ptr::NonNull;

use crate::error::{Result, StreamError};

/// An exclusively-owned anonymous memory mapping.
///
/// Freshly mapped pages are zero-filled by the OS.
pub(crate) struct NativeMem {
    ptr: NonNull<u8>,
    len: usize,
}

// The mapping is owned by exactly one holder at a time (a stream or a pool
// free list); no aliasing exists.
unsafe impl Send for NativeMem {}
unsafe impl Sync for NativeMem {}

impl NativeMem {
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr is a live mapping of exactly `len` readable bytes.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    #[inline]
    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: ptr is a live mapping of exactly `len` writable bytes and
        // we hold the only reference.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

#[cfg(unix)]
impl NativeMem {
    /// Maps `len` anonymous private pages.
    pub(crate) fn alloc(len: usize) -> Result<Self> {
        debug_assert!(len > 0);
        // SAFETY: requesting a fresh anonymous private mapping; no fd, no
        // existing address is touched.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(StreamError::OutOfMemory);
        }
        Ok(Self {
            ptr: NonNull::new(ptr.cast()).ok_or(StreamError::OutOfMemory)?,
            len,
        })
    }
}

#[cfg(unix)]
impl Drop for NativeMem {
    fn drop(&mut self) {
        // SAFETY: ptr/len describe the mapping created in alloc() and it has
        // not been unmapped before.
        unsafe {
            libc::munmap(self.ptr.as_ptr().cast(), self.len);
        }
    }
}

#[cfg(windows)]
impl NativeMem {
    /// Commits `len` bytes of fresh virtual address space.
    pub(crate) fn alloc(len: usize) -> Result<Self> {
        use windows_sys::Win32::System::Memory::{
            MEM_COMMIT, MEM_RESERVE, PAGE_READWRITE, VirtualAlloc,
        };
        debug_assert!(len > 0);
        // SAFETY: reserving and committing a fresh region; no existing
        // address is touched.
        let ptr = unsafe {
            VirtualAlloc(
                std::ptr::null(),
                len,
                MEM_COMMIT | MEM_RESERVE,
                PAGE_READWRITE,
            )
        };
        Ok(Self {
            ptr: NonNull::new(ptr.cast()).ok_or(StreamError::OutOfMemory)?,
            len,
        })
    }
}

#[cfg(windows)]
impl Drop for NativeMem {
    fn drop(&mut self) {
        use windows_sys::Win32::System::Memory::{MEM_RELEASE, VirtualFree};
        // SAFETY: ptr is the base of the region from VirtualAlloc; with
        // MEM_RELEASE the size must be 0.
        unsafe {
            VirtualFree(self.ptr.as_ptr().cast(), 0, MEM_RELEASE);
        }
    }
}
