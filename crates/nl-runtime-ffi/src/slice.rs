//! Slice allocation FFI: `nl_new_slice`, `nl_drop_slice`, the fixed-width
//! helpers, and checked variants.
//!
//! The returned `NlSlice*` is the block base: the descriptor sits at offset
//! 0 and its `data` points `HEADER_SIZE` bytes further into the same block.

use std::mem;
use std::ptr;

use nl_runtime::{RawHeap, RuntimeAllocator, SliceRef};

use crate::runtime::{exhausted, invalid_release, runtime};
use crate::status::NlStatus;
use crate::types::NlSlice;

pub(crate) fn new_slice_in<H: RawHeap>(
    rt: &RuntimeAllocator<H>,
    length: usize,
    element_size: usize,
) -> *mut NlSlice {
    match rt.allocate_slice(length, element_size) {
        Ok(slice) => slice.as_ptr().cast(),
        Err(e) => exhausted(rt, &e),
    }
}

/// # Safety
///
/// `slice` is null or was returned for `element_size` and is still owned.
#[allow(unsafe_code)]
pub(crate) unsafe fn drop_slice_in<H: RawHeap>(
    rt: &RuntimeAllocator<H>,
    slice: *mut NlSlice,
    element_size: usize,
) {
    let Some(slice) = SliceRef::from_ptr(slice.cast()) else {
        return;
    };
    // SAFETY: forwarded caller contract.
    if let Err(e) = unsafe { rt.release_slice(slice, element_size) } {
        invalid_release(&e);
    }
}

#[allow(unsafe_code)]
pub(crate) fn try_new_slice_in<H: RawHeap>(
    rt: &RuntimeAllocator<H>,
    length: usize,
    element_size: usize,
    out: *mut *mut NlSlice,
) -> i32 {
    if out.is_null() {
        return NlStatus::InvalidArgument as i32;
    }
    let (addr, status) = match rt.allocate_slice(length, element_size) {
        Ok(slice) => (slice.as_ptr().cast(), NlStatus::Ok),
        Err(e) => (ptr::null_mut(), NlStatus::from(&e)),
    };
    // SAFETY: out is non-null and writable per caller contract.
    unsafe { out.write(addr) };
    status as i32
}

/// # Safety
///
/// As [`drop_slice_in`], except that violations caught by a tracking heap
/// are reported instead of aborting.
#[allow(unsafe_code)]
pub(crate) unsafe fn try_drop_slice_in<H: RawHeap>(
    rt: &RuntimeAllocator<H>,
    slice: *mut NlSlice,
    element_size: usize,
) -> i32 {
    let Some(slice) = SliceRef::from_ptr(slice.cast()) else {
        return NlStatus::InvalidArgument as i32;
    };
    // SAFETY: forwarded caller contract.
    match unsafe { rt.release_slice(slice, element_size) } {
        Ok(()) => NlStatus::Ok as i32,
        Err(e) => NlStatus::from(&e) as i32,
    }
}

/// Allocate a slice of `length` elements of `element_size` bytes.
///
/// The payload is uninitialised. On exhaustion, aborts or returns null
/// according to the runtime's exhaustion policy.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn nl_new_slice(length: usize, element_size: usize) -> *mut NlSlice {
    ffi_guard_or!(ptr::null_mut(), {
        new_slice_in(runtime(), length, element_size)
    })
}

/// Release a slice allocated with the same `element_size`.
///
/// Null is a no-op. A release detected as invalid aborts the process.
///
/// # Safety
///
/// `slice` must be null or a live slice allocated with `element_size` and
/// owned by the caller. Its descriptor must not have been modified.
#[no_mangle]
#[allow(unsafe_code)]
pub unsafe extern "C" fn nl_drop_slice(slice: *mut NlSlice, element_size: usize) {
    // SAFETY: forwarded caller contract.
    ffi_guard_or!((), {
        unsafe { drop_slice_in(runtime(), slice, element_size) }
    })
}

/// Allocate a slice of `length` bytes. Release with `element_size` 1.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn nl_alloc_slice_u8(length: usize) -> *mut NlSlice {
    ffi_guard_or!(ptr::null_mut(), {
        new_slice_in(runtime(), length, mem::size_of::<u8>())
    })
}

/// Allocate a slice of `length` 32-bit words. Release with `element_size` 4.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn nl_alloc_slice_u32(length: usize) -> *mut NlSlice {
    ffi_guard_or!(ptr::null_mut(), {
        new_slice_in(runtime(), length, mem::size_of::<u32>())
    })
}

/// Allocate a slice, writing its address (or null) to `out`.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn nl_try_new_slice(
    length: usize,
    element_size: usize,
    out: *mut *mut NlSlice,
) -> i32 {
    ffi_guard!({ try_new_slice_in(runtime(), length, element_size, out) })
}

/// Release a slice, reporting invalid releases instead of aborting.
///
/// # Safety
///
/// As `nl_drop_slice`. Double releases are only reported when the runtime
/// tracks allocations; otherwise they are undefined behaviour.
#[no_mangle]
#[allow(unsafe_code)]
pub unsafe extern "C" fn nl_try_drop_slice(slice: *mut NlSlice, element_size: usize) -> i32 {
    // SAFETY: forwarded caller contract.
    ffi_guard!({ unsafe { try_drop_slice_in(runtime(), slice, element_size) } })
}
