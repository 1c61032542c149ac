//! Region heap: release many blocks with one call.
//!
//! [`Region`] records every block it hands out. Generated code for a scope
//! can allocate freely through a region and then drop the whole scope with
//! [`reset`](Region::reset) (or by dropping the region) instead of pairing
//! every allocation with a release. Individual releases still work and are
//! checked against the region's ledger.

#![allow(unsafe_code)]

use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::{Mutex, MutexGuard};

use crate::error::AllocError;
use crate::heap::{HeapStats, RawHeap, SystemHeap};
use crate::ledger::Ledger;

/// A heap wrapper whose outstanding blocks are freed together.
pub struct Region<H: RawHeap = SystemHeap> {
    inner: H,
    ledger: Mutex<Ledger>,
}

impl Region<SystemHeap> {
    /// A region over the system heap.
    pub fn system() -> Self {
        Self::new(SystemHeap)
    }
}

impl<H: RawHeap> Region<H> {
    /// Create an empty region drawing blocks from `inner`.
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            ledger: Mutex::new(Ledger::new()),
        }
    }

    /// Number of blocks currently outstanding.
    pub fn live_blocks(&self) -> usize {
        self.ledger().stats().live_blocks
    }

    /// Bytes currently outstanding.
    pub fn live_bytes(&self) -> usize {
        self.ledger().stats().live_bytes
    }

    /// Release every outstanding block back to the inner heap.
    ///
    /// Returns how many blocks were released. Every reference obtained from
    /// this region before the call is dangling afterwards.
    pub fn reset(&self) -> usize {
        let drained = self.ledger().drain();
        let count = drained.len();
        for block in drained {
            // SAFETY: addresses in the ledger are non-null blocks this region
            // obtained from `inner` with exactly `block.layout`, and draining
            // removed them so they cannot be released twice.
            let result = unsafe {
                self.inner
                    .release(NonNull::new_unchecked(block.address as *mut u8), block.layout)
            };
            if let Err(e) = result {
                tracing::error!(error = %e, "inner heap refused region block");
            }
        }
        if count > 0 {
            tracing::trace!(blocks = count, "region reset");
        }
        count
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// SAFETY: blocks come from the inner heap unchanged; a block is released to
// the inner heap at most once, either individually or by `reset`.
unsafe impl<H: RawHeap> RawHeap for Region<H> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let block = self.inner.allocate(layout)?;
        self.ledger().record(block, layout);
        Ok(block)
    }

    unsafe fn release(&self, block: NonNull<u8>, layout: Layout) -> Result<(), AllocError> {
        self.ledger().retire(block, layout)?;
        // SAFETY: the ledger confirmed the block is live with this size.
        unsafe { self.inner.release(block, layout) }
    }

    fn is_live(&self, block: NonNull<u8>) -> Option<bool> {
        Some(self.ledger().contains(block))
    }

    fn stats(&self) -> Option<HeapStats> {
        Some(self.ledger().stats())
    }

    fn refuse(&self, _block: NonNull<u8>, error: &AllocError) {
        tracing::debug!(error = %error, "region refused release");
        self.ledger().refuse();
    }
}

impl<H: RawHeap> Drop for Region<H> {
    fn drop(&mut self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::TrackedHeap;
    use crate::{RuntimeAllocator, RuntimeConfig};
    use std::sync::Arc;

    #[test]
    fn reset_releases_everything_at_once() {
        let backing = Arc::new(TrackedHeap::new(SystemHeap));
        let region = Region::new(Arc::clone(&backing));
        let rt = RuntimeAllocator::new(&region, RuntimeConfig::default()).unwrap();

        for i in 0..10 {
            rt.allocate_object(i * 8).unwrap();
            rt.allocate_slice(i, 4).unwrap();
        }
        assert_eq!(region.live_blocks(), 20);
        assert_eq!(backing.stats().unwrap().live_blocks, 20);

        assert_eq!(region.reset(), 20);
        assert_eq!(region.live_blocks(), 0);
        assert_eq!(backing.stats().unwrap().live_blocks, 0);
    }

    #[test]
    fn individual_release_then_reset_does_not_double_free() {
        let backing = Arc::new(TrackedHeap::new(SystemHeap));
        let region = Region::new(Arc::clone(&backing));
        let rt = RuntimeAllocator::new(&region, RuntimeConfig::default()).unwrap();

        let obj = rt.allocate_object(24).unwrap();
        let _kept = rt.allocate_object(24).unwrap();
        // SAFETY: obj is live and owned by this test.
        unsafe { rt.release_object(obj, 24).unwrap() };
        assert_eq!(region.live_blocks(), 1);

        assert_eq!(region.reset(), 1);
        assert_eq!(backing.stats().unwrap().invalid_releases, 0);
    }

    #[test]
    fn drop_releases_outstanding_blocks() {
        let backing = Arc::new(TrackedHeap::new(SystemHeap));
        {
            let region = Region::new(Arc::clone(&backing));
            let layout = Layout::from_size_align(128, 16).unwrap();
            region.allocate(layout).unwrap();
            region.allocate(layout).unwrap();
        }
        assert!(backing.leaks().is_empty());
    }

    #[test]
    fn release_after_reset_is_refused() {
        let region = Region::system();
        let layout = Layout::from_size_align(16, 16).unwrap();
        let block = region.allocate(layout).unwrap();
        region.reset();
        // SAFETY: the region refuses the stale block before touching it.
        let err = unsafe { region.release(block, layout) }.unwrap_err();
        assert!(matches!(err, AllocError::InvalidRelease { .. }));
    }
}
