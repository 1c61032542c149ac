//! Object allocation FFI: `nl_new_object`, `nl_drop_object` and checked
//! variants.

use std::ffi::c_void;
use std::ptr;

use nl_runtime::{ObjectRef, RawHeap, RuntimeAllocator};

use crate::runtime::{exhausted, invalid_release, runtime};
use crate::status::NlStatus;

pub(crate) fn new_object_in<H: RawHeap>(rt: &RuntimeAllocator<H>, size: usize) -> *mut c_void {
    match rt.allocate_object(size) {
        Ok(obj) => obj.as_ptr().cast(),
        Err(e) => exhausted(rt, &e),
    }
}

/// # Safety
///
/// `object` is null or was returned for `size` bytes and is still owned.
#[allow(unsafe_code)]
pub(crate) unsafe fn drop_object_in<H: RawHeap>(
    rt: &RuntimeAllocator<H>,
    object: *mut c_void,
    size: usize,
) {
    let Some(obj) = ObjectRef::from_ptr(object.cast()) else {
        return;
    };
    // SAFETY: forwarded caller contract.
    if let Err(e) = unsafe { rt.release_object(obj, size) } {
        invalid_release(&e);
    }
}

#[allow(unsafe_code)]
pub(crate) fn try_new_object_in<H: RawHeap>(
    rt: &RuntimeAllocator<H>,
    size: usize,
    out: *mut *mut c_void,
) -> i32 {
    if out.is_null() {
        return NlStatus::InvalidArgument as i32;
    }
    let (addr, status) = match rt.allocate_object(size) {
        Ok(obj) => (obj.as_ptr().cast(), NlStatus::Ok),
        Err(e) => (ptr::null_mut(), NlStatus::from(&e)),
    };
    // SAFETY: out is non-null and writable per caller contract.
    unsafe { out.write(addr) };
    status as i32
}

/// # Safety
///
/// As [`drop_object_in`], except that violations caught by a tracking heap
/// are reported instead of aborting.
#[allow(unsafe_code)]
pub(crate) unsafe fn try_drop_object_in<H: RawHeap>(
    rt: &RuntimeAllocator<H>,
    object: *mut c_void,
    size: usize,
) -> i32 {
    let Some(obj) = ObjectRef::from_ptr(object.cast()) else {
        return NlStatus::InvalidArgument as i32;
    };
    // SAFETY: forwarded caller contract.
    match unsafe { rt.release_object(obj, size) } {
        Ok(()) => NlStatus::Ok as i32,
        Err(e) => NlStatus::from(&e) as i32,
    }
}

/// Allocate an uninitialised object of `size` bytes.
///
/// On exhaustion, aborts or returns null according to the runtime's
/// exhaustion policy.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn nl_new_object(size: usize) -> *mut c_void {
    ffi_guard_or!(ptr::null_mut(), { new_object_in(runtime(), size) })
}

/// Release an object allocated by `nl_new_object` with the same `size`.
///
/// Null is a no-op. A release detected as invalid aborts the process.
///
/// # Safety
///
/// `object` must be null or a live object of `size` bytes owned by the
/// caller.
#[no_mangle]
#[allow(unsafe_code)]
pub unsafe extern "C" fn nl_drop_object(object: *mut c_void, size: usize) {
    // SAFETY: forwarded caller contract.
    ffi_guard_or!((), { unsafe { drop_object_in(runtime(), object, size) } })
}

/// Allocate an object, writing its address (or null) to `out`.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn nl_try_new_object(size: usize, out: *mut *mut c_void) -> i32 {
    ffi_guard!({ try_new_object_in(runtime(), size, out) })
}

/// Release an object, reporting invalid releases instead of aborting.
///
/// # Safety
///
/// As `nl_drop_object`. Double releases are only reported when the
/// runtime tracks allocations; otherwise they are undefined behaviour.
#[no_mangle]
#[allow(unsafe_code)]
pub unsafe extern "C" fn nl_try_drop_object(object: *mut c_void, size: usize) -> i32 {
    // SAFETY: forwarded caller contract.
    ffi_guard!({ unsafe { try_drop_object_in(runtime(), object, size) } })
}
