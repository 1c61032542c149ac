//! Object and slice references handed to generated code.
//!
//! Both are thin, `Copy` address wrappers with the same ABI as a C pointer.
//! Ownership is a caller contract: whoever holds the reference returned by
//! an allocation owns the block until it passes the reference to the
//! matching release call.

#![allow(unsafe_code)]

use std::fmt;
use std::ptr::NonNull;
use std::slice;

use crate::layout::{SliceHeader, HEADER_SIZE};

/// Address of an untyped object block.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef(NonNull<u8>);

impl ObjectRef {
    /// Wrap a raw object address.
    pub fn from_non_null(ptr: NonNull<u8>) -> Self {
        Self(ptr)
    }

    /// Wrap a raw object address, returning `None` for null.
    pub fn from_ptr(ptr: *mut u8) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    /// Start of the object block.
    pub fn as_ptr(self) -> *mut u8 {
        self.0.as_ptr()
    }

    /// Start of the object block, non-null.
    pub fn as_non_null(self) -> NonNull<u8> {
        self.0
    }

    /// View the object as bytes.
    ///
    /// # Safety
    ///
    /// The object must be live, at least `size` bytes long, fully
    /// initialised over those bytes, and not aliased mutably for `'a`.
    pub unsafe fn bytes<'a>(self, size: usize) -> &'a [u8] {
        // SAFETY: upheld by the caller.
        unsafe { slice::from_raw_parts(self.0.as_ptr(), size) }
    }

    /// View the object as mutable bytes.
    ///
    /// # Safety
    ///
    /// The object must be live, at least `size` bytes long, and not
    /// otherwise aliased for `'a`.
    pub unsafe fn bytes_mut<'a>(self, size: usize) -> &'a mut [u8] {
        // SAFETY: upheld by the caller.
        unsafe { slice::from_raw_parts_mut(self.0.as_ptr(), size) }
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({:p})", self.0)
    }
}

/// Address of a slice descriptor, which is also the slice block's base.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SliceRef(NonNull<SliceHeader>);

impl SliceRef {
    /// Wrap a raw descriptor address.
    pub fn from_non_null(ptr: NonNull<SliceHeader>) -> Self {
        Self(ptr)
    }

    /// Wrap a raw descriptor address, returning `None` for null.
    pub fn from_ptr(ptr: *mut SliceHeader) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    /// Descriptor address.
    pub fn as_ptr(self) -> *mut SliceHeader {
        self.0.as_ptr()
    }

    /// Block base address. Identical to the descriptor address.
    pub fn base(self) -> NonNull<u8> {
        self.0.cast()
    }

    /// Where the payload starts for this block: `base + HEADER_SIZE` bytes.
    ///
    /// Computed from the block address alone; does not read the descriptor.
    pub fn expected_data(self) -> *mut u8 {
        self.base().as_ptr().wrapping_add(HEADER_SIZE)
    }

    /// Element count stored in the descriptor.
    ///
    /// # Safety
    ///
    /// The slice must be live.
    pub unsafe fn len(self) -> usize {
        // SAFETY: a live slice block starts with an initialised header.
        unsafe { (*self.0.as_ptr()).len }
    }

    /// Whether the descriptor records zero elements.
    ///
    /// # Safety
    ///
    /// The slice must be live.
    pub unsafe fn is_empty(self) -> bool {
        // SAFETY: forwarded.
        unsafe { self.len() == 0 }
    }

    /// Payload address stored in the descriptor.
    ///
    /// # Safety
    ///
    /// The slice must be live.
    pub unsafe fn data(self) -> *mut u8 {
        // SAFETY: a live slice block starts with an initialised header.
        unsafe { (*self.0.as_ptr()).data }
    }

    /// View the payload as bytes.
    ///
    /// # Safety
    ///
    /// The slice must be live, allocated with `element_size`, its payload
    /// fully initialised, and not aliased mutably for `'a`.
    pub unsafe fn payload<'a>(self, element_size: usize) -> &'a [u8] {
        // SAFETY: the block holds `len * element_size` payload bytes at `data`.
        unsafe { slice::from_raw_parts(self.data(), self.len() * element_size) }
    }

    /// View the payload as mutable bytes.
    ///
    /// # Safety
    ///
    /// The slice must be live, allocated with `element_size`, and its
    /// payload not otherwise aliased for `'a`. Bytes may be uninitialised
    /// before the first write.
    pub unsafe fn payload_mut<'a>(self, element_size: usize) -> &'a mut [u8] {
        // SAFETY: the block holds `len * element_size` payload bytes at `data`.
        unsafe { slice::from_raw_parts_mut(self.data(), self.len() * element_size) }
    }
}

// SAFETY: a reference names a heap block, not thread-local state; moving
// it to another thread moves ownership of the block with it.
unsafe impl Send for ObjectRef {}
// SAFETY: as above.
unsafe impl Send for SliceRef {}

impl fmt::Debug for SliceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SliceRef({:p})", self.0)
    }
}
