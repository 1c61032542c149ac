//! Binary layout of objects and slice blocks.
//!
//! A slice occupies one block: the [`SliceHeader`] descriptor at offset 0,
//! followed immediately by the tightly packed payload.
//!
//! ```text
//! base                      base + HEADER_SIZE
//! │                         │
//! ▼                         ▼
//! ┌────────────┬────────────┬──────────┬──────────┬─────┐
//! │ data: *u8  │ len: usize │ elem 0   │ elem 1   │ ... │
//! └────────────┴────────────┴──────────┴──────────┴─────┘
//!   SliceHeader (HEADER_SIZE bytes)   length * element_size bytes
//! ```
//!
//! `data` always equals `base + HEADER_SIZE` in bytes. It is never derived
//! by offsetting a `*mut SliceHeader` (that would scale by the header size a
//! second time and land outside the block).

use std::alloc::Layout;
use std::mem;

use crate::error::AllocError;

/// Slice descriptor written at the start of every slice block.
///
/// Field order and `repr(C)` are part of the ABI with generated code.
#[repr(C)]
#[derive(Debug)]
pub struct SliceHeader {
    /// Address of the first payload byte.
    pub data: *mut u8,
    /// Number of elements (not bytes).
    pub len: usize,
}

/// Size of [`SliceHeader`] in bytes: 16 on 64-bit targets, 8 on 32-bit.
pub const HEADER_SIZE: usize = mem::size_of::<SliceHeader>();

/// Alignment of [`SliceHeader`]; the minimum alignment of any slice block.
pub const HEADER_ALIGN: usize = mem::align_of::<SliceHeader>();

/// Layout of an object block of `size` bytes.
pub fn object_layout(size: usize, align: usize) -> Result<Layout, AllocError> {
    Layout::from_size_align(size, align).map_err(|_| AllocError::CapacityOverflow {
        length: 1,
        element_size: size,
    })
}

/// Number of payload bytes in a slice of `length` elements.
pub fn payload_bytes(length: usize, element_size: usize) -> Result<usize, AllocError> {
    length
        .checked_mul(element_size)
        .ok_or(AllocError::CapacityOverflow {
            length,
            element_size,
        })
}

/// Layout of a whole slice block: header plus payload.
///
/// `align` is raised to [`HEADER_ALIGN`] if it is smaller.
pub fn slice_layout(
    length: usize,
    element_size: usize,
    align: usize,
) -> Result<Layout, AllocError> {
    let overflow = AllocError::CapacityOverflow {
        length,
        element_size,
    };
    let total = payload_bytes(length, element_size)?
        .checked_add(HEADER_SIZE)
        .ok_or_else(|| overflow.clone())?;
    Layout::from_size_align(total, align.max(HEADER_ALIGN)).map_err(|_| overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_two_words_without_padding() {
        assert_eq!(HEADER_SIZE, 2 * mem::size_of::<usize>());
        assert_eq!(mem::offset_of!(SliceHeader, data), 0);
        assert_eq!(mem::offset_of!(SliceHeader, len), mem::size_of::<usize>());
    }

    #[test]
    fn four_by_four_slice_reserves_header_plus_sixteen() {
        let layout = slice_layout(4, 4, 16).unwrap();
        assert_eq!(layout.size(), HEADER_SIZE + 16);
        assert_eq!(layout.align(), 16);
    }

    #[test]
    fn empty_slice_is_header_only() {
        let layout = slice_layout(0, 8, 16).unwrap();
        assert_eq!(layout.size(), HEADER_SIZE);
        let layout = slice_layout(1000, 0, 16).unwrap();
        assert_eq!(layout.size(), HEADER_SIZE);
    }

    #[test]
    fn small_alignment_is_raised_to_header_alignment() {
        let layout = slice_layout(3, 1, 1).unwrap();
        assert_eq!(layout.align(), HEADER_ALIGN);
    }

    #[test]
    fn multiplication_overflow_is_reported() {
        assert_eq!(
            slice_layout(usize::MAX, 2, 16),
            Err(AllocError::CapacityOverflow {
                length: usize::MAX,
                element_size: 2
            })
        );
    }

    #[test]
    fn header_addition_overflow_is_reported() {
        assert!(matches!(
            slice_layout(usize::MAX, 1, 16),
            Err(AllocError::CapacityOverflow { .. })
        ));
    }

    #[test]
    fn sizes_above_isize_max_are_rejected() {
        assert!(object_layout(isize::MAX as usize, 16).is_err());
        assert!(object_layout(0, 16).is_ok());
    }
}
