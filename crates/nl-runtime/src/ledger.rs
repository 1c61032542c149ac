//! Live-block bookkeeping and the [`TrackedHeap`] wrapper.
//!
//! [`Ledger`] maps block addresses to the layout they were allocated with.
//! It backs both [`TrackedHeap`] (debug-build release checking) and
//! [`Region`](crate::Region) (release-everything-at-once).

#![allow(unsafe_code)]

use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::{Mutex, MutexGuard};

use indexmap::IndexMap;

use crate::error::{AllocError, ReleaseFault};
use crate::heap::{HeapStats, RawHeap};

/// Outstanding block recorded by a [`Ledger`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LiveBlock {
    /// Block base address.
    pub address: usize,
    /// Layout the block was allocated with.
    pub layout: Layout,
}

#[derive(Clone, Copy, Debug)]
struct Entry {
    layout: Layout,
    seq: u64,
}

/// Address → layout map of live blocks plus running counters.
///
/// Insert and remove are O(1). Each entry carries its allocation sequence
/// number, so leak reports still list blocks oldest first.
#[derive(Debug, Default)]
pub struct Ledger {
    live: IndexMap<usize, Entry>,
    stats: HeapStats,
}

impl Ledger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly allocated block.
    pub fn record(&mut self, block: NonNull<u8>, layout: Layout) {
        let seq = self.stats.allocations;
        self.live.insert(block.as_ptr() as usize, Entry { layout, seq });
        self.stats.allocations += 1;
        self.stats.live_blocks = self.live.len();
        self.stats.live_bytes += layout.size();
        self.stats.peak_bytes = self.stats.peak_bytes.max(self.stats.live_bytes);
    }

    /// Check that `block` may be released with `layout`, and if so forget it.
    ///
    /// A refused release leaves the ledger unchanged apart from the
    /// `invalid_releases` counter.
    pub fn retire(&mut self, block: NonNull<u8>, layout: Layout) -> Result<(), AllocError> {
        let address = block.as_ptr() as usize;
        let fault = match self.live.get(&address) {
            None => Some(ReleaseFault::NotLive),
            Some(entry) if entry.layout.size() != layout.size() => {
                Some(ReleaseFault::SizeMismatch {
                    expected: entry.layout.size(),
                    actual: layout.size(),
                })
            }
            Some(entry) if entry.layout.align() != layout.align() => {
                Some(ReleaseFault::AlignMismatch {
                    expected: entry.layout.align(),
                    actual: layout.align(),
                })
            }
            Some(_) => None,
        };
        if let Some(fault) = fault {
            self.stats.invalid_releases += 1;
            return Err(AllocError::InvalidRelease { address, fault });
        }
        self.live.swap_remove(&address);
        self.stats.releases += 1;
        self.stats.live_blocks = self.live.len();
        self.stats.live_bytes -= layout.size();
        Ok(())
    }

    /// Count a release refused before it reached [`retire`](Self::retire).
    pub fn refuse(&mut self) {
        self.stats.invalid_releases += 1;
    }

    /// Whether `block` is currently recorded as live.
    pub fn contains(&self, block: NonNull<u8>) -> bool {
        self.live.contains_key(&(block.as_ptr() as usize))
    }

    /// Outstanding blocks, oldest first.
    pub fn live_blocks(&self) -> Vec<LiveBlock> {
        let mut entries: Vec<(usize, Entry)> =
            self.live.iter().map(|(&address, &entry)| (address, entry)).collect();
        oldest_first(&mut entries)
    }

    /// Remove and return every outstanding block, oldest first.
    pub fn drain(&mut self) -> Vec<LiveBlock> {
        let mut entries: Vec<(usize, Entry)> = self.live.drain(..).collect();
        let drained = oldest_first(&mut entries);
        self.stats.releases += drained.len() as u64;
        self.stats.live_blocks = 0;
        self.stats.live_bytes = 0;
        drained
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> HeapStats {
        self.stats
    }
}

fn oldest_first(entries: &mut [(usize, Entry)]) -> Vec<LiveBlock> {
    entries.sort_unstable_by_key(|(_, entry)| entry.seq);
    entries
        .iter()
        .map(|&(address, entry)| LiveBlock {
            address,
            layout: entry.layout,
        })
        .collect()
}

/// Heap wrapper that refuses releases the caller is not entitled to.
///
/// Every block handed out by the inner heap is recorded. A release of an
/// unknown address, a second release, or a release with the wrong size is
/// reported as [`AllocError::InvalidRelease`] and *not* forwarded, so the
/// inner heap never sees it.
pub struct TrackedHeap<H> {
    inner: H,
    ledger: Mutex<Ledger>,
}

impl<H: RawHeap> TrackedHeap<H> {
    /// Wrap `inner`.
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            ledger: Mutex::new(Ledger::new()),
        }
    }

    /// The wrapped heap.
    pub fn inner(&self) -> &H {
        &self.inner
    }

    /// Blocks still outstanding, oldest first.
    pub fn leaks(&self) -> Vec<LiveBlock> {
        self.ledger().live_blocks()
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        // A panic while holding the lock cannot leave the map half-updated:
        // every mutation is a single insert/remove plus counter bumps.
        self.ledger.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// SAFETY: blocks come from the inner heap unchanged; releases are only
// forwarded for blocks the ledger recorded with the same size.
unsafe impl<H: RawHeap> RawHeap for TrackedHeap<H> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let block = self.inner.allocate(layout)?;
        self.ledger().record(block, layout);
        Ok(block)
    }

    unsafe fn release(&self, block: NonNull<u8>, layout: Layout) -> Result<(), AllocError> {
        let mut ledger = self.ledger();
        if let Err(e) = ledger.retire(block, layout) {
            tracing::error!(error = %e, "release refused");
            return Err(e);
        }
        drop(ledger);
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
        tracing::error!(error = %error, "release refused");
        self.ledger().refuse();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::SystemHeap;

    fn layout(size: usize) -> Layout {
        Layout::from_size_align(size, 16).unwrap()
    }

    #[test]
    fn counters_follow_alloc_and_release() {
        let heap = TrackedHeap::new(SystemHeap);
        let a = heap.allocate(layout(32)).unwrap();
        let b = heap.allocate(layout(64)).unwrap();
        let stats = heap.stats().unwrap();
        assert_eq!(stats.live_blocks, 2);
        assert_eq!(stats.live_bytes, 96);
        assert_eq!(stats.peak_bytes, 96);

        // SAFETY: both blocks came from this heap with these layouts.
        unsafe {
            heap.release(a, layout(32)).unwrap();
            heap.release(b, layout(64)).unwrap();
        }
        let stats = heap.stats().unwrap();
        assert_eq!(stats.allocations, 2);
        assert_eq!(stats.releases, 2);
        assert_eq!(stats.live_blocks, 0);
        assert_eq!(stats.live_bytes, 0);
        assert_eq!(stats.peak_bytes, 96);
        assert!(heap.leaks().is_empty());
    }

    #[test]
    fn double_release_is_refused() {
        let heap = TrackedHeap::new(SystemHeap);
        let a = heap.allocate(layout(8)).unwrap();
        // SAFETY: first release is valid; the second is caught by the ledger
        // before reaching the system heap.
        unsafe {
            heap.release(a, layout(8)).unwrap();
            let err = heap.release(a, layout(8)).unwrap_err();
            assert_eq!(
                err,
                AllocError::InvalidRelease {
                    address: a.as_ptr() as usize,
                    fault: ReleaseFault::NotLive,
                }
            );
        }
        assert_eq!(heap.stats().unwrap().invalid_releases, 1);
    }

    #[test]
    fn size_mismatch_is_refused_and_block_stays_live() {
        let heap = TrackedHeap::new(SystemHeap);
        let a = heap.allocate(layout(48)).unwrap();
        // SAFETY: the mismatched release is refused; the valid one follows.
        unsafe {
            let err = heap.release(a, layout(16)).unwrap_err();
            assert!(matches!(
                err,
                AllocError::InvalidRelease {
                    fault: ReleaseFault::SizeMismatch {
                        expected: 48,
                        actual: 16
                    },
                    ..
                }
            ));
            assert_eq!(heap.is_live(a), Some(true));
            heap.release(a, layout(48)).unwrap();
        }
        assert_eq!(heap.is_live(a), Some(false));
    }

    #[test]
    fn leaks_are_listed_oldest_first() {
        let heap = TrackedHeap::new(SystemHeap);
        let a = heap.allocate(layout(1)).unwrap();
        let b = heap.allocate(layout(2)).unwrap();
        let leaks = heap.leaks();
        assert_eq!(leaks.len(), 2);
        assert_eq!(leaks[0].address, a.as_ptr() as usize);
        assert_eq!(leaks[1].address, b.as_ptr() as usize);
        // SAFETY: cleanup of live blocks.
        unsafe {
            heap.release(a, layout(1)).unwrap();
            heap.release(b, layout(2)).unwrap();
        }
    }

    #[test]
    fn drain_empties_the_ledger() {
        let mut ledger = Ledger::new();
        let block = NonNull::<u8>::dangling();
        ledger.record(block, layout(4));
        let drained = ledger.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(ledger.stats().live_bytes, 0);
        assert_eq!(ledger.stats().releases, 1);
        assert!(!ledger.contains(block));
    }

    #[test]
    fn alignment_mismatch_is_refused_and_block_stays_live() {
        let heap = TrackedHeap::new(SystemHeap);
        let a = heap.allocate(layout(32)).unwrap();
        let wrong = Layout::from_size_align(32, 8).unwrap();
        // SAFETY: the mismatched release is refused before reaching dealloc.
        unsafe {
            assert_eq!(
                heap.release(a, wrong).unwrap_err(),
                AllocError::InvalidRelease {
                    address: a.as_ptr() as usize,
                    fault: ReleaseFault::AlignMismatch {
                        expected: 16,
                        actual: 8
                    },
                }
            );
            assert_eq!(heap.is_live(a), Some(true));
            heap.release(a, layout(32)).unwrap();
        }
        assert_eq!(heap.stats().unwrap().invalid_releases, 1);
    }

    #[test]
    fn leaks_stay_oldest_first_after_out_of_order_release() {
        let heap = TrackedHeap::new(SystemHeap);
        let blocks: Vec<_> = (1..=4).map(|n| heap.allocate(layout(n)).unwrap()).collect();
        // SAFETY: releasing the first block once; it is live.
        unsafe { heap.release(blocks[0], layout(1)).unwrap() };
        let leaks: Vec<usize> = heap.leaks().iter().map(|b| b.address).collect();
        let expected: Vec<usize> = blocks[1..].iter().map(|b| b.as_ptr() as usize).collect();
        assert_eq!(leaks, expected);
        // SAFETY: cleanup of the remaining live blocks.
        unsafe {
            for (i, &b) in blocks.iter().enumerate().skip(1) {
                heap.release(b, layout(i + 1)).unwrap();
            }
        }
    }

    #[test]
    fn refusals_are_counted() {
        let heap = TrackedHeap::new(SystemHeap);
        let err = AllocError::InvalidRelease {
            address: 0x40,
            fault: ReleaseFault::NotLive,
        };
        heap.refuse(NonNull::dangling(), &err);
        let stats = heap.stats().unwrap();
        assert_eq!(stats.invalid_releases, 1);
        assert_eq!(stats.releases, 0);
    }

    #[test]
    fn release_cost_does_not_grow_with_live_count() {
        // Front-to-back release of a large ledger.
        let mut ledger = Ledger::new();
        let count = 50_000usize;
        for i in 1..=count {
            let block = NonNull::new((i * 16) as *mut u8).unwrap();
            ledger.record(block, layout(16));
        }
        for i in 1..=count {
            let block = NonNull::new((i * 16) as *mut u8).unwrap();
            ledger.retire(block, layout(16)).unwrap();
        }
        assert_eq!(ledger.stats().live_blocks, 0);
        assert_eq!(ledger.stats().releases, count as u64);
    }
}
