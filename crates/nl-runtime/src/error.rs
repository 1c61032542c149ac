//! Allocation error types.
//!
//! Two failure classes exist: the heap could not satisfy a request
//! ([`AllocError::OutOfMemory`], [`AllocError::CapacityOverflow`]), and the
//! caller broke the single-owner release contract
//! ([`AllocError::InvalidRelease`]). The second is only ever reported by
//! heaps that keep a ledger; on an untracked heap it is undefined behaviour.

use std::error::Error;
use std::fmt;

/// Errors that can occur during runtime allocation and release.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AllocError {
    /// The heap could not provide a block of the requested size.
    OutOfMemory {
        /// Number of bytes requested, including any slice header.
        requested: usize,
    },
    /// `length * element_size + HEADER_SIZE` does not fit in a `Layout`.
    CapacityOverflow {
        /// Requested element count.
        length: usize,
        /// Requested element size in bytes.
        element_size: usize,
    },
    /// A release was refused because the caller does not own the block.
    InvalidRelease {
        /// Address passed to the release call.
        address: usize,
        /// What was wrong with the release.
        fault: ReleaseFault,
    },
}

/// Why a release was rejected by a tracking heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReleaseFault {
    /// The block is not live: already released, or never handed out.
    NotLive,
    /// The block is live but was released with a different size than it
    /// was allocated with.
    SizeMismatch {
        /// Size recorded at allocation time.
        expected: usize,
        /// Size supplied (or recomputed) at release time.
        actual: usize,
    },
    /// The block is live and the size matches, but it was released with a
    /// different alignment than it was allocated with.
    AlignMismatch {
        /// Alignment recorded at allocation time.
        expected: usize,
        /// Alignment supplied at release time.
        actual: usize,
    },
    /// The object size supplied at release time could never have been
    /// allocated.
    InvalidSize {
        /// The rejected size in bytes.
        size: usize,
    },
    /// The slice descriptor does not describe a block this runtime could
    /// have produced: its data field does not point just past the header,
    /// or its length and the supplied element size overflow.
    CorruptDescriptor,
}

impl AllocError {
    /// Whether this error signals heap exhaustion rather than misuse.
    pub fn is_exhaustion(&self) -> bool {
        matches!(
            self,
            Self::OutOfMemory { .. } | Self::CapacityOverflow { .. }
        )
    }
}

impl fmt::Display for ReleaseFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotLive => write!(f, "block is not live (double or foreign release)"),
            Self::CorruptDescriptor => write!(f, "slice descriptor is corrupt"),
            Self::InvalidSize { size } => write!(f, "object size {size} exceeds any valid layout"),
            Self::AlignMismatch { expected, actual } => {
                write!(
                    f,
                    "alignment mismatch: allocated at {expected}, released at {actual}"
                )
            }
            Self::SizeMismatch { expected, actual } => {
                write!(
                    f,
                    "size mismatch: allocated {expected} bytes, released as {actual} bytes"
                )
            }
        }
    }
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory { requested } => {
                write!(f, "out of memory: requested {requested} bytes")
            }
            Self::CapacityOverflow {
                length,
                element_size,
            } => {
                write!(
                    f,
                    "capacity overflow: {length} elements of {element_size} bytes"
                )
            }
            Self::InvalidRelease { address, fault } => {
                write!(f, "invalid release of {address:#x}: {fault}")
            }
        }
    }
}

impl Error for AllocError {}
