//! Tuple object: `len: u64` followed by `len` value slots.

use crate::error::HeapError;
use crate::gc::{GcRef, Heap};
use crate::objects::{read_u64, read_value, write_u64, write_value};
use crate::value::{Value, ValueKind, SLOT_BYTES};

#[inline]
pub const fn payload_size(len: usize) -> usize {
    8 + len * SLOT_BYTES
}

/// Records the length of a fresh allocation. Slots start out nil.
pub fn init(heap: &mut Heap, r: GcRef, len: usize) -> Result<(), HeapError> {
    heap.expect(r, ValueKind::Tuple)?;
    let payload = heap.payload_mut(r)?;
    if payload.len() != payload_size(len) {
        return Err(HeapError::InvalidRef(r.offset()));
    }
    write_u64(payload, 0, len as u64);
    Ok(())
}

pub fn len(heap: &Heap, r: GcRef) -> Result<usize, HeapError> {
    heap.expect(r, ValueKind::Tuple)?;
    Ok(read_u64(heap.payload(r)?, 0) as usize)
}

fn slot_at(heap: &Heap, r: GcRef, idx: i64) -> Result<usize, HeapError> {
    let len = len(heap, r)?;
    usize::try_from(idx)
        .ok()
        .filter(|&i| i < len)
        .map(|i| 8 + i * SLOT_BYTES)
        .ok_or(HeapError::IndexOutOfBounds { index: idx, len })
}

pub fn get(heap: &Heap, r: GcRef, idx: i64) -> Result<Value, HeapError> {
    let at = slot_at(heap, r, idx)?;
    Ok(read_value(heap.payload(r)?, at))
}

pub fn set(heap: &mut Heap, r: GcRef, idx: i64, v: Value) -> Result<(), HeapError> {
    let at = slot_at(heap, r, idx)?;
    write_value(heap.payload_mut(r)?, at, v);
    Ok(())
}
