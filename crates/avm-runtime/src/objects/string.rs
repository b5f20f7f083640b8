//! String object: `hash: u32, len: u32, bytes`.
//!
//! Strings are immutable byte sequences; they are not required to be UTF-8.

use crate::error::HeapError;
use crate::gc::{GcRef, Heap};
use crate::value::ValueKind;

const HEADER: usize = 8;

#[inline]
pub const fn payload_size(len: usize) -> usize {
    HEADER + len
}

/// Shift-and-xor hash seeded with the length.
pub fn hash_bytes(bytes: &[u8]) -> u32 {
    let mut h = bytes.len() as u32;
    for &c in bytes {
        h ^= (h << 5).wrapping_add(h >> 2).wrapping_add(c as u32);
    }
    h
}

/// Fills a fresh allocation of `payload_size(bytes.len())`.
pub fn init(heap: &mut Heap, r: GcRef, bytes: &[u8]) -> Result<(), HeapError> {
    heap.expect(r, ValueKind::String)?;
    let payload = heap.payload_mut(r)?;
    if payload.len() != payload_size(bytes.len()) {
        return Err(HeapError::InvalidRef(r.offset()));
    }
    payload[..4].copy_from_slice(&hash_bytes(bytes).to_le_bytes());
    payload[4..8].copy_from_slice(&(bytes.len() as u32).to_le_bytes());
    payload[HEADER..].copy_from_slice(bytes);
    Ok(())
}

pub fn bytes(heap: &Heap, r: GcRef) -> Result<&[u8], HeapError> {
    heap.expect(r, ValueKind::String)?;
    Ok(&heap.payload(r)?[HEADER..])
}

pub fn len(heap: &Heap, r: GcRef) -> Result<usize, HeapError> {
    bytes(heap, r).map(<[u8]>::len)
}

pub fn hash(heap: &Heap, r: GcRef) -> Result<u32, HeapError> {
    heap.expect(r, ValueKind::String)?;
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&heap.payload(r)?[..4]);
    Ok(u32::from_le_bytes(raw))
}
