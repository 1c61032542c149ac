//! Process-wide runtime instance and its lifecycle FFI.
//!
//! The runtime is built lazily on first use from `NL_RUNTIME_*`
//! environment variables, or explicitly by `nl_runtime_init` before any
//! allocation. Once built it is never torn down: blocks may outlive any
//! notion of "shutdown" in generated code.

use std::alloc::{handle_alloc_error, Layout};
use std::process;
use std::ptr;
use std::sync::{Arc, OnceLock};

use nl_runtime::{
    AllocError, ExhaustionPolicy, RawHeap, RuntimeAllocator, RuntimeConfig, SystemHeap,
    TrackedHeap,
};

use crate::status::NlStatus;
use crate::types::{NlExhaustionPolicy, NlRuntimeStats};

/// Heap behind the process-wide runtime: tracked or plain system heap.
pub(crate) type GlobalHeap = Arc<dyn RawHeap>;

static RUNTIME: OnceLock<RuntimeAllocator<GlobalHeap>> = OnceLock::new();

/// The process-wide runtime, built from the environment on first use.
pub(crate) fn runtime() -> &'static RuntimeAllocator<GlobalHeap> {
    RUNTIME.get_or_init(|| build(RuntimeConfig::from_env()))
}

fn build(config: RuntimeConfig) -> RuntimeAllocator<GlobalHeap> {
    let heap: GlobalHeap = if config.track_allocations {
        Arc::new(TrackedHeap::new(SystemHeap))
    } else {
        Arc::new(SystemHeap)
    };
    tracing::debug!(
        exhaustion = ?config.exhaustion,
        track_allocations = config.track_allocations,
        alignment = config.alignment,
        "nl runtime initialised"
    );
    match RuntimeAllocator::new(Arc::clone(&heap), config) {
        Ok(rt) => rt,
        Err(e) => {
            tracing::warn!(error = %e, "falling back to default runtime config");
            match RuntimeAllocator::new(heap, RuntimeConfig::default()) {
                Ok(rt) => rt,
                Err(_) => process::abort(),
            }
        }
    }
}

/// Apply the exhaustion policy for an unchecked entry point.
///
/// Returns null under [`ExhaustionPolicy::ReturnNull`]; otherwise does not
/// return.
pub(crate) fn exhausted<T, H: RawHeap>(rt: &RuntimeAllocator<H>, err: &AllocError) -> *mut T {
    match rt.config().exhaustion {
        ExhaustionPolicy::ReturnNull => {
            tracing::warn!(error = %err, "allocation failed, returning null");
            ptr::null_mut()
        }
        ExhaustionPolicy::Abort => {
            tracing::error!(error = %err, "allocation failed, aborting");
            match err {
                AllocError::OutOfMemory { requested } => {
                    match Layout::from_size_align(*requested, rt.config().alignment) {
                        Ok(layout) => handle_alloc_error(layout),
                        Err(_) => process::abort(),
                    }
                }
                _ => process::abort(),
            }
        }
    }
}

/// Fatal handling of a release the caller was not entitled to make.
pub(crate) fn invalid_release(err: &AllocError) -> ! {
    tracing::error!(error = %err, "invalid release, aborting");
    process::abort()
}

/// Initialise the runtime explicitly, before the first allocation.
///
/// `exhaustion` is an `NlExhaustionPolicy` value, `track` is 0 or 1, and
/// `alignment` is the block alignment in bytes (0 keeps the default).
/// Returns `AlreadyInitialized` if the runtime was already built, either by
/// an earlier call or lazily by an allocation.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn nl_runtime_init(exhaustion: i32, track: u8, alignment: usize) -> i32 {
    ffi_guard!({
        let Some(policy) = NlExhaustionPolicy::from_raw(exhaustion) else {
            return NlStatus::InvalidArgument as i32;
        };
        let config = RuntimeConfig {
            exhaustion: policy.into(),
            track_allocations: track != 0,
            alignment: if alignment == 0 {
                RuntimeConfig::DEFAULT_ALIGN
            } else {
                alignment
            },
        };
        if let Err(e) = config.validate() {
            return NlStatus::from(&e) as i32;
        }
        let mut installed = false;
        RUNTIME.get_or_init(|| {
            installed = true;
            build(config)
        });
        if installed {
            NlStatus::Ok as i32
        } else {
            NlStatus::AlreadyInitialized as i32
        }
    })
}

/// Copy the ledger counters into `out`.
///
/// Returns `NotTracked` when the runtime was built without tracking.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn nl_runtime_stats(out: *mut NlRuntimeStats) -> i32 {
    ffi_guard!({
        if out.is_null() {
            return NlStatus::InvalidArgument as i32;
        }
        match runtime().stats() {
            Some(stats) => {
                // SAFETY: out is non-null and valid per caller contract.
                unsafe { out.write(NlRuntimeStats::from(stats)) };
                NlStatus::Ok as i32
            }
            None => NlStatus::NotTracked as i32,
        }
    })
}
