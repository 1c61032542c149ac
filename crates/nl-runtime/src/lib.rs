//! Object and slice allocation runtime for nl generated code.
//!
//! Generated code never calls the host allocator directly. It asks this
//! crate for untyped objects and for slices, and hands them back when it
//! is done. There is no garbage collection and no reference counting:
//! every allocation is released explicitly by its single owner.
//!
//! # Architecture
//!
//! ```text
//! RuntimeAllocator<H: RawHeap>   (objects, slices, layout contract)
//! └── H
//!     ├── SystemHeap             (std::alloc, the default)
//!     ├── TrackedHeap<H>         (ledger: double/mismatched release checks)
//!     └── Region<H>              (ledger + release-all on reset/drop)
//! ```
//!
//! # Slice blocks
//!
//! A slice is one block: a [`SliceHeader`] (`data`, `len`) followed by
//! `len * element_size` payload bytes. `data` is always
//! `base + HEADER_SIZE`, and releasing the slice releases only the block
//! at the descriptor address. See [`layout`] for the exact byte map.
//!
//! # Unsafe code
//!
//! The crate denies `unsafe` by default. [`heap`], [`handle`], [`ledger`],
//! [`region`] and [`allocator`] opt in, and every block states its
//! invariant in a `SAFETY:` comment.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod allocator;
pub mod config;
pub mod error;
pub mod handle;
pub mod heap;
pub mod layout;
pub mod ledger;
pub mod region;

// Public re-exports for the primary API surface.
pub use allocator::RuntimeAllocator;
pub use config::{ConfigError, ExhaustionPolicy, RuntimeConfig};
pub use error::{AllocError, ReleaseFault};
pub use handle::{ObjectRef, SliceRef};
pub use heap::{HeapStats, RawHeap, SystemHeap};
pub use layout::{SliceHeader, HEADER_SIZE};
pub use ledger::{LiveBlock, TrackedHeap};
pub use region::Region;
