//! C ABI of the nl runtime allocator.
//!
//! Generated programs link this crate (static or dynamic) and call the
//! `nl_*` symbols declared in `include/nl_runtime.h`. All entry points
//! share one process-wide [`nl_runtime::RuntimeAllocator`], configured from
//! the environment on first use or explicitly through `nl_runtime_init`.
//!
//! Unchecked entry points (`nl_new_*`, `nl_drop_*`, `nl_alloc_slice_*`)
//! mirror the classic runtime contract: they never report errors, they
//! abort or return null. Checked `nl_try_*` variants return an
//! [`NlStatus`] code instead.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

use std::cell::RefCell;
use std::ffi::c_char;

thread_local! {
    static LAST_PANIC: RefCell<String> = const { RefCell::new(String::new()) };
}

fn record_panic(payload: Box<dyn std::any::Any + Send>) {
    let msg = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    };
    tracing::error!(message = %msg, "panic caught at FFI boundary");
    LAST_PANIC.with(|cell| *cell.borrow_mut() = msg);
}

/// Run `$body`, converting a panic into `NlStatus::Panicked`.
macro_rules! ffi_guard {
    ($body:block) => {
        match ::std::panic::catch_unwind(::std::panic::AssertUnwindSafe(|| $body)) {
            Ok(status) => status,
            Err(payload) => {
                $crate::record_panic(payload);
                $crate::NlStatus::Panicked as i32
            }
        }
    };
}

/// Run `$body`, returning `$fallback` if it panics.
macro_rules! ffi_guard_or {
    ($fallback:expr, $body:block) => {
        match ::std::panic::catch_unwind(::std::panic::AssertUnwindSafe(|| $body)) {
            Ok(value) => value,
            Err(payload) => {
                $crate::record_panic(payload);
                $fallback
            }
        }
    };
}

pub mod object;
pub mod runtime;
pub mod slice;
pub mod status;
pub mod types;

pub use status::NlStatus;
pub use types::{NlExhaustionPolicy, NlRuntimeStats, NlSlice};

/// Copy the message of the last panic caught on this thread into `buf`.
///
/// Returns the full message length in bytes, excluding the terminator. At
/// most `cap - 1` bytes are copied and the result is always NUL-terminated
/// when `cap > 0`. Pass a null `buf` to query the length. Returns 0 if no
/// panic has been caught on this thread.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn nl_last_panic_message(buf: *mut c_char, cap: usize) -> i32 {
    LAST_PANIC.with(|cell| {
        let msg = cell.borrow();
        let bytes = msg.as_bytes();
        if !buf.is_null() && cap > 0 {
            let n = bytes.len().min(cap - 1);
            // SAFETY: buf is valid for cap bytes per caller contract; n < cap.
            unsafe {
                std::ptr::copy_nonoverlapping(bytes.as_ptr(), buf.cast::<u8>(), n);
                buf.add(n).write(0);
            }
        }
        i32::try_from(bytes.len()).unwrap_or(i32::MAX)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clear() {
        LAST_PANIC.with(|cell| cell.borrow_mut().clear());
    }

    #[test]
    fn guard_converts_panic_to_status() {
        clear();
        let status: i32 = ffi_guard!({
            panic!("guarded failure");
        });
        assert_eq!(status, NlStatus::Panicked as i32);

        let len = nl_last_panic_message(std::ptr::null_mut(), 0);
        assert!(len > 0);
        let mut buf = vec![0u8; len as usize + 1];
        let len2 = nl_last_panic_message(buf.as_mut_ptr().cast(), buf.len());
        assert_eq!(len, len2);
        let msg = std::str::from_utf8(&buf[..len as usize]).unwrap();
        assert!(msg.contains("guarded failure"), "got {msg:?}");
    }

    #[test]
    fn guard_or_returns_fallback() {
        clear();
        let p: *mut u8 = ffi_guard_or!(std::ptr::null_mut(), {
            panic!("no pointer for you");
        });
        assert!(p.is_null());
    }

    #[test]
    fn guard_passes_through_value() {
        assert_eq!(ffi_guard!({ 7 }), 7);
        assert_eq!(ffi_guard_or!(0usize, { 3usize }), 3);
    }

    #[test]
    fn message_truncates_to_capacity() {
        clear();
        let _: i32 = ffi_guard!({
            panic!("0123456789");
        });
        let mut buf = [0xFFu8; 5];
        let len = nl_last_panic_message(buf.as_mut_ptr().cast(), buf.len());
        assert_eq!(len, 10);
        assert_eq!(&buf, b"0123\0");
    }

    #[test]
    fn no_panic_reports_zero() {
        clear();
        assert_eq!(nl_last_panic_message(std::ptr::null_mut(), 0), 0);
    }
}
