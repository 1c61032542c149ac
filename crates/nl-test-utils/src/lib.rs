//! Test utilities for nl runtime development.
//!
//! Provides [`CountingHeap`], an instrumented [`RawHeap`] double that
//! counts blocks and bytes, detects leaks and invalid releases, and can be
//! told to fail, plus payload [`fixtures`] and a tracing initialiser.

#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![allow(unsafe_code)]

pub mod fixtures;

use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::{Mutex, MutexGuard, Once};

use nl_runtime::{AllocError, HeapStats, LiveBlock, RawHeap, SystemHeap, TrackedHeap};

/// When a [`CountingHeap`] starts refusing allocations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePlan {
    /// Never fail.
    #[default]
    Never,
    /// Succeed for the first `n` allocations, then fail every one after.
    AfterAllocations(u64),
    /// Fail any allocation that would push live bytes above the budget.
    ByteBudget(usize),
}

/// Instrumented heap test double.
///
/// Backed by the system heap through a [`TrackedHeap`], so releases are
/// checked against a ledger. Invalid releases are refused and counted
/// rather than freed, which keeps double-release tests memory safe.
pub struct CountingHeap {
    tracked: TrackedHeap<SystemHeap>,
    plan: Mutex<FailurePlan>,
    refused: Mutex<u64>,
}

impl CountingHeap {
    pub fn new() -> Self {
        Self::with_plan(FailurePlan::Never)
    }

    pub fn with_plan(plan: FailurePlan) -> Self {
        Self {
            tracked: TrackedHeap::new(SystemHeap),
            plan: Mutex::new(plan),
            refused: Mutex::new(0),
        }
    }

    /// Replace the failure plan for subsequent allocations.
    pub fn set_plan(&self, plan: FailurePlan) {
        *lock(&self.plan) = plan;
    }

    pub fn counters(&self) -> HeapStats {
        self.tracked.stats().unwrap_or_default()
    }

    pub fn live_blocks(&self) -> usize {
        self.counters().live_blocks
    }

    pub fn live_bytes(&self) -> usize {
        self.counters().live_bytes
    }

    pub fn invalid_releases(&self) -> u64 {
        self.counters().invalid_releases
    }

    /// Allocations refused by the failure plan.
    pub fn refused_allocations(&self) -> u64 {
        *lock(&self.refused)
    }

    pub fn leaks(&self) -> Vec<LiveBlock> {
        self.tracked.leaks()
    }

    /// Panic with a leak report if any block is still live.
    pub fn assert_no_leaks(&self) {
        let leaks = self.leaks();
        assert!(
            leaks.is_empty(),
            "{} block(s) leaked: {:?}",
            leaks.len(),
            leaks
        );
    }

    fn should_fail(&self, layout: Layout) -> bool {
        let stats = self.counters();
        match *lock(&self.plan) {
            FailurePlan::Never => false,
            FailurePlan::AfterAllocations(n) => stats.allocations >= n,
            FailurePlan::ByteBudget(budget) => stats
                .live_bytes
                .checked_add(layout.size())
                .map_or(true, |total| total > budget),
        }
    }
}

impl Default for CountingHeap {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: all blocks come from the system heap via TrackedHeap, which only
// forwards releases it has validated.
unsafe impl RawHeap for CountingHeap {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if self.should_fail(layout) {
            *lock(&self.refused) += 1;
            return Err(AllocError::OutOfMemory {
                requested: layout.size(),
            });
        }
        self.tracked.allocate(layout)
    }

    unsafe fn release(&self, block: NonNull<u8>, layout: Layout) -> Result<(), AllocError> {
        // SAFETY: TrackedHeap validates before releasing.
        unsafe { self.tracked.release(block, layout) }
    }

    fn is_live(&self, block: NonNull<u8>) -> Option<bool> {
        self.tracked.is_live(block)
    }

    fn stats(&self) -> Option<HeapStats> {
        self.tracked.stats()
    }

    fn refuse(&self, block: NonNull<u8>, error: &AllocError) {
        self.tracked.refuse(block, error)
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Install a `tracing` subscriber honouring `RUST_LOG`, once per process.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
