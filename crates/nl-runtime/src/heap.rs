//! The heap capability the allocator is built on.
//!
//! [`RawHeap`] is passed explicitly into
//! [`RuntimeAllocator`](crate::RuntimeAllocator) instead of reaching for
//! a process global. [`SystemHeap`] forwards to the Rust global allocator;
//! [`TrackedHeap`](crate::TrackedHeap), [`Region`](crate::Region) and the
//! test doubles in `nl-test-utils` wrap or replace it.

#![allow(unsafe_code)]

use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::Arc;

use crate::error::AllocError;

/// Counters reported by heaps that keep a ledger.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Blocks handed out since creation.
    pub allocations: u64,
    /// Blocks taken back since creation.
    pub releases: u64,
    /// Releases that were refused as invalid.
    pub invalid_releases: u64,
    /// Blocks currently outstanding.
    pub live_blocks: usize,
    /// Bytes currently outstanding.
    pub live_bytes: usize,
    /// High-water mark of `live_bytes`.
    pub peak_bytes: usize,
}

/// A source of raw memory blocks.
///
/// # Safety
///
/// Implementors must return blocks that are valid for reads and writes of
/// `layout.size()` bytes, aligned to `layout.align()`, and disjoint from
/// every other live block. A block stays valid until it is passed to
/// [`release`](RawHeap::release).
pub unsafe trait RawHeap: Send + Sync {
    /// Reserve a block for `layout`. Contents are unspecified.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Return a block to the heap.
    ///
    /// # Safety
    ///
    /// `block` must have been returned by [`allocate`](RawHeap::allocate)
    /// on this heap with the same `layout`, and must not have been released
    /// already. Heaps that keep a ledger detect violations and return
    /// [`AllocError::InvalidRelease`]; others have undefined behaviour.
    unsafe fn release(&self, block: NonNull<u8>, layout: Layout) -> Result<(), AllocError>;

    /// Whether `block` is currently live, for heaps that know.
    ///
    /// `None` means the heap keeps no ledger.
    fn is_live(&self, _block: NonNull<u8>) -> Option<bool> {
        None
    }

    /// Ledger counters, for heaps that keep them.
    fn stats(&self) -> Option<HeapStats> {
        None
    }

    /// Record a release that was refused before it reached
    /// [`release`](RawHeap::release), such as a slice whose block is no
    /// longer live or whose descriptor is corrupt. The block is not touched.
    ///
    /// Heaps without a ledger ignore it.
    fn refuse(&self, _block: NonNull<u8>, _error: &AllocError) {}
}

/// The host allocator (`std::alloc::alloc` / `dealloc`).
///
/// Zero-sized requests are served as one-byte blocks so every allocation
/// has a distinct, releasable address.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemHeap;

impl SystemHeap {
    fn backing_layout(layout: Layout) -> Layout {
        if layout.size() == 0 {
            // SAFETY: size 1 rounded up to a valid power-of-two alignment
            // cannot exceed isize::MAX.
            unsafe { Layout::from_size_align_unchecked(1, layout.align()) }
        } else {
            layout
        }
    }
}

// SAFETY: std::alloc::alloc returns blocks satisfying `layout`, and the
// global allocator is thread-safe.
unsafe impl RawHeap for SystemHeap {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let backing = Self::backing_layout(layout);
        // SAFETY: backing.size() is non-zero.
        let ptr = unsafe { alloc::alloc(backing) };
        NonNull::new(ptr).ok_or(AllocError::OutOfMemory {
            requested: layout.size(),
        })
    }

    unsafe fn release(&self, block: NonNull<u8>, layout: Layout) -> Result<(), AllocError> {
        // SAFETY: caller guarantees `block` came from `allocate(layout)`,
        // which used the same backing layout.
        unsafe { alloc::dealloc(block.as_ptr(), Self::backing_layout(layout)) };
        Ok(())
    }
}

macro_rules! forward_raw_heap {
    ($($wrapper:ty),*) => {$(
        // SAFETY: forwards every call to the wrapped heap unchanged.
        unsafe impl<H: RawHeap + ?Sized> RawHeap for $wrapper {
            fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
                (**self).allocate(layout)
            }

            unsafe fn release(&self, block: NonNull<u8>, layout: Layout) -> Result<(), AllocError> {
                // SAFETY: the caller's contract is forwarded as-is.
                unsafe { (**self).release(block, layout) }
            }

            fn is_live(&self, block: NonNull<u8>) -> Option<bool> {
                (**self).is_live(block)
            }

            fn stats(&self) -> Option<HeapStats> {
                (**self).stats()
            }

            fn refuse(&self, block: NonNull<u8>, error: &AllocError) {
                (**self).refuse(block, error)
            }
        }
    )*};
}

forward_raw_heap!(&H, Box<H>, Arc<H>);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_heap_round_trip() {
        let heap = SystemHeap;
        let layout = Layout::from_size_align(64, 16).unwrap();
        let block = heap.allocate(layout).unwrap();
        assert_eq!(block.as_ptr() as usize % 16, 0);
        // SAFETY: block is valid for 64 bytes.
        unsafe {
            block.as_ptr().write_bytes(0xAB, 64);
            assert_eq!(*block.as_ptr().add(63), 0xAB);
            heap.release(block, layout).unwrap();
        }
    }

    #[test]
    fn zero_sized_requests_get_distinct_addresses() {
        let heap = SystemHeap;
        let layout = Layout::from_size_align(0, 8).unwrap();
        let a = heap.allocate(layout).unwrap();
        let b = heap.allocate(layout).unwrap();
        assert_ne!(a, b);
        // SAFETY: both came from allocate(layout) above.
        unsafe {
            heap.release(a, layout).unwrap();
            heap.release(b, layout).unwrap();
        }
    }

    #[test]
    fn system_heap_keeps_no_ledger() {
        let heap = SystemHeap;
        assert_eq!(heap.stats(), None);
        assert_eq!(heap.is_live(NonNull::dangling()), None);
    }

    #[test]
    fn shared_heap_forwards() {
        let heap: Arc<dyn RawHeap> = Arc::new(SystemHeap);
        let layout = Layout::from_size_align(8, 8).unwrap();
        let block = heap.allocate(layout).unwrap();
        // SAFETY: allocated from the same heap with the same layout.
        unsafe { heap.release(block, layout).unwrap() };
    }
}
