//! Payload fixtures for slice and object tests.
//!
//! - [`fill_pattern`] / [`check_pattern`]: deterministic byte patterns.
//! - [`header_snapshot`]: copy a descriptor out for before/after checks.

use nl_runtime::{ObjectRef, SliceRef};

/// Byte written at `index` for a given `seed`.
pub fn pattern_byte(seed: u8, index: usize) -> u8 {
    seed.wrapping_mul(31).wrapping_add(index as u8)
}

/// Fill every payload byte of `slice` with the seeded pattern.
///
/// # Safety
///
/// `slice` must be live, allocated with `element_size`, and not aliased.
pub unsafe fn fill_pattern(slice: SliceRef, element_size: usize, seed: u8) {
    // SAFETY: forwarded caller contract.
    let payload = unsafe { slice.payload_mut(element_size) };
    for (i, b) in payload.iter_mut().enumerate() {
        *b = pattern_byte(seed, i);
    }
}

/// Index of the first payload byte that does not match the pattern.
///
/// # Safety
///
/// `slice` must be live, allocated with `element_size`, and previously
/// filled with [`fill_pattern`].
pub unsafe fn check_pattern(slice: SliceRef, element_size: usize, seed: u8) -> Option<usize> {
    // SAFETY: forwarded caller contract.
    let payload = unsafe { slice.payload(element_size) };
    payload
        .iter()
        .enumerate()
        .find(|&(i, &b)| b != pattern_byte(seed, i))
        .map(|(i, _)| i)
}

/// Fill `size` bytes of `object` with the seeded pattern.
///
/// # Safety
///
/// `object` must be live and at least `size` bytes long.
pub unsafe fn fill_object(object: ObjectRef, size: usize, seed: u8) {
    // SAFETY: forwarded caller contract.
    let bytes = unsafe { object.bytes_mut(size) };
    for (i, b) in bytes.iter_mut().enumerate() {
        *b = pattern_byte(seed, i);
    }
}

/// Whether `size` bytes of `object` still hold the seeded pattern.
///
/// # Safety
///
/// `object` must be live and previously filled with [`fill_object`].
pub unsafe fn object_matches(object: ObjectRef, size: usize, seed: u8) -> bool {
    // SAFETY: forwarded caller contract.
    let bytes = unsafe { object.bytes(size) };
    bytes
        .iter()
        .enumerate()
        .all(|(i, &b)| b == pattern_byte(seed, i))
}

/// `(data address, len)` of a live slice's descriptor.
///
/// # Safety
///
/// `slice` must be live.
pub unsafe fn header_snapshot(slice: SliceRef) -> (usize, usize) {
    // SAFETY: forwarded caller contract.
    unsafe { (slice.data() as usize, slice.len()) }
}
