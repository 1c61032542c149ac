//! The runtime allocator: objects and slices on top of a [`RawHeap`].
//!
//! Each operation maps to exactly one heap call. The allocator holds no
//! mutable state of its own, so it is as thread-safe as its heap.

#![allow(unsafe_code)]

use std::ptr::NonNull;

use crate::config::{ConfigError, RuntimeConfig};
use crate::error::{AllocError, ReleaseFault};
use crate::handle::{ObjectRef, SliceRef};
use crate::heap::{HeapStats, RawHeap};
use crate::layout::{object_layout, slice_layout, SliceHeader, HEADER_SIZE};

/// Allocates and releases objects and slices for generated code.
///
/// # Example
///
/// ```
/// use nl_runtime::{RuntimeAllocator, RuntimeConfig, SystemHeap, HEADER_SIZE};
///
/// let rt = RuntimeAllocator::new(SystemHeap, RuntimeConfig::default()).unwrap();
/// let slice = rt.allocate_slice(4, 4).unwrap();
/// unsafe {
///     assert_eq!(slice.len(), 4);
///     assert_eq!(slice.data(), slice.base().as_ptr().add(HEADER_SIZE));
///     slice.payload_mut(4).copy_from_slice(&[1; 16]);
///     rt.release_slice(slice, 4).unwrap();
/// }
/// ```
pub struct RuntimeAllocator<H> {
    heap: H,
    config: RuntimeConfig,
}

impl<H: RawHeap> RuntimeAllocator<H> {
    /// Build an allocator over `heap`. Fails if `config` is invalid.
    pub fn new(heap: H, config: RuntimeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { heap, config })
    }

    /// The heap this allocator draws from.
    pub fn heap(&self) -> &H {
        &self.heap
    }

    /// The configuration the allocator was built with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Ledger counters, if the heap keeps them.
    pub fn stats(&self) -> Option<HeapStats> {
        self.heap.stats()
    }

    /// Reserve an uninitialised object of exactly `size` bytes.
    pub fn allocate_object(&self, size: usize) -> Result<ObjectRef, AllocError> {
        let layout = object_layout(size, self.config.alignment)?;
        let block = self.heap.allocate(layout).inspect_err(|e| {
            tracing::debug!(size, error = %e, "object allocation failed");
        })?;
        tracing::trace!(size, address = ?block, "allocate_object");
        Ok(ObjectRef::from_non_null(block))
    }

    /// Release an object allocated by [`allocate_object`](Self::allocate_object).
    ///
    /// # Safety
    ///
    /// `object` must have come from this allocator with the same `size`, and
    /// must not have been released already. Tracking heaps report violations
    /// as [`AllocError::InvalidRelease`]; on other heaps they are undefined
    /// behaviour.
    pub unsafe fn release_object(&self, object: ObjectRef, size: usize) -> Result<(), AllocError> {
        let layout = object_layout(size, self.config.alignment)
            .map_err(|_| self.refused(object.as_non_null(), ReleaseFault::InvalidSize { size }))?;
        tracing::trace!(size, address = ?object, "release_object");
        // SAFETY: forwarded caller contract.
        unsafe { self.heap.release(object.as_non_null(), layout) }
    }

    /// Reserve one block holding a descriptor and `length` elements of
    /// `element_size` bytes.
    ///
    /// The descriptor's `data` is `base + HEADER_SIZE` and its `len` is
    /// `length`. Payload bytes are uninitialised.
    pub fn allocate_slice(&self, length: usize, element_size: usize) -> Result<SliceRef, AllocError> {
        let layout = slice_layout(length, element_size, self.config.alignment)?;
        let base = self.heap.allocate(layout).inspect_err(|e| {
            tracing::debug!(length, element_size, error = %e, "slice allocation failed");
        })?;

        let header = base.cast::<SliceHeader>();
        // SAFETY: the block is at least HEADER_SIZE bytes and aligned for
        // SliceHeader (slice_layout raises alignment to HEADER_ALIGN).
        // `data` is a byte offset from the base, at most one past the end of
        // the block when the payload is empty.
        unsafe {
            let data = base.as_ptr().add(HEADER_SIZE);
            header.as_ptr().write(SliceHeader { data, len: length });
        }
        tracing::trace!(length, element_size, address = ?base, "allocate_slice");
        Ok(SliceRef::from_non_null(header))
    }

    /// Release a slice allocated by [`allocate_slice`](Self::allocate_slice).
    ///
    /// `element_size` is combined with the descriptor's `len` to recover the
    /// block layout. Only the block at the descriptor address is released.
    ///
    /// # Safety
    ///
    /// `slice` must have come from this allocator with the same
    /// `element_size`, and must not have been released already. Tracking
    /// heaps report violations as [`AllocError::InvalidRelease`] without
    /// reading the descriptor; on other heaps they are undefined behaviour.
    pub unsafe fn release_slice(&self, slice: SliceRef, element_size: usize) -> Result<(), AllocError> {
        let base = slice.base();
        if self.heap.is_live(base) == Some(false) {
            return Err(self.refused(base, ReleaseFault::NotLive));
        }

        // SAFETY: the caller guarantees the slice is live, and a tracking
        // heap has just confirmed it.
        let (data, length) = unsafe { (slice.data(), slice.len()) };
        if data != slice.expected_data() {
            return Err(self.refused(base, ReleaseFault::CorruptDescriptor));
        }
        let layout = slice_layout(length, element_size, self.config.alignment)
            .map_err(|_| self.refused(base, ReleaseFault::CorruptDescriptor))?;
        tracing::trace!(length, element_size, address = ?base, "release_slice");
        // SAFETY: forwarded caller contract; layout matches the allocation
        // when element_size does.
        unsafe { self.heap.release(base, layout) }
    }

    /// Whether `block` is live, for heaps that keep a ledger.
    pub fn is_live(&self, block: NonNull<u8>) -> Option<bool> {
        self.heap.is_live(block)
    }

    /// Build the error for a release rejected before it reached the heap,
    /// and let the heap's ledger count it.
    fn refused(&self, block: NonNull<u8>, fault: ReleaseFault) -> AllocError {
        let err = AllocError::InvalidRelease {
            address: block.as_ptr() as usize,
            fault,
        };
        self.heap.refuse(block, &err);
        err
    }
}
