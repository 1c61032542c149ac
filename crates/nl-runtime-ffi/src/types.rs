//! C-compatible types shared with generated code.

use std::ffi::c_void;
use std::mem;

use nl_runtime::{HeapStats, SliceHeader};

/// Slice descriptor as seen from C.
///
/// Identical in size, alignment and field offsets to
/// [`SliceHeader`]; the payload follows it in the same block.
#[repr(C)]
#[derive(Debug)]
pub struct NlSlice {
    /// Address of the first payload byte.
    pub data: *mut c_void,
    /// Number of elements.
    pub len: usize,
}

const _: () = {
    assert!(mem::size_of::<NlSlice>() == mem::size_of::<SliceHeader>());
    assert!(mem::align_of::<NlSlice>() == mem::align_of::<SliceHeader>());
    assert!(mem::offset_of!(NlSlice, data) == mem::offset_of!(SliceHeader, data));
    assert!(mem::offset_of!(NlSlice, len) == mem::offset_of!(SliceHeader, len));
};

/// Ledger counters reported by `nl_runtime_stats`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NlRuntimeStats {
    /// Blocks handed out since start-up.
    pub allocations: u64,
    /// Blocks released since start-up.
    pub releases: u64,
    /// Releases refused as invalid.
    pub invalid_releases: u64,
    /// Blocks currently outstanding.
    pub live_blocks: u64,
    /// Bytes currently outstanding.
    pub live_bytes: u64,
    /// High-water mark of `live_bytes`.
    pub peak_bytes: u64,
}

impl From<HeapStats> for NlRuntimeStats {
    fn from(s: HeapStats) -> Self {
        Self {
            allocations: s.allocations,
            releases: s.releases,
            invalid_releases: s.invalid_releases,
            live_blocks: s.live_blocks as u64,
            live_bytes: s.live_bytes as u64,
            peak_bytes: s.peak_bytes as u64,
        }
    }
}

/// C exhaustion policy selector for `nl_runtime_init`.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NlExhaustionPolicy {
    /// Abort the process on exhaustion.
    Abort = 0,
    /// Return null on exhaustion.
    ReturnNull = 1,
}

impl NlExhaustionPolicy {
    pub(crate) fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Abort),
            1 => Some(Self::ReturnNull),
            _ => None,
        }
    }
}

impl From<NlExhaustionPolicy> for nl_runtime::ExhaustionPolicy {
    fn from(p: NlExhaustionPolicy) -> Self {
        match p {
            NlExhaustionPolicy::Abort => Self::Abort,
            NlExhaustionPolicy::ReturnNull => Self::ReturnNull,
        }
    }
}
