//! Array object: `len: u64` plus one value slot holding the backing tuple
//! (nil while the array has never held an element).
//!
//! Growing an array allocates, so it is done by the heap's owner; this
//! module only reads and rewires the fields.

use crate::error::HeapError;
use crate::gc::{GcRef, Heap};
use crate::objects::{read_u64, read_value, tuple, write_u64, write_value};
use crate::value::{Value, ValueKind};

pub const PAYLOAD_SIZE: usize = 8 + crate::value::SLOT_BYTES;

pub fn len(heap: &Heap, r: GcRef) -> Result<usize, HeapError> {
    heap.expect(r, ValueKind::Array)?;
    Ok(read_u64(heap.payload(r)?, 0) as usize)
}

pub fn set_len(heap: &mut Heap, r: GcRef, len: usize) -> Result<(), HeapError> {
    heap.expect(r, ValueKind::Array)?;
    write_u64(heap.payload_mut(r)?, 0, len as u64);
    Ok(())
}

pub fn backing(heap: &Heap, r: GcRef) -> Result<Option<GcRef>, HeapError> {
    heap.expect(r, ValueKind::Array)?;
    Ok(read_value(heap.payload(r)?, 8).gc_ref())
}

pub fn set_backing(heap: &mut Heap, r: GcRef, store: GcRef) -> Result<(), HeapError> {
    heap.expect(r, ValueKind::Array)?;
    heap.expect(store, ValueKind::Tuple)?;
    write_value(heap.payload_mut(r)?, 8, Value::Tuple(store));
    Ok(())
}

/// Number of elements the backing tuple can hold.
pub fn capacity(heap: &Heap, r: GcRef) -> Result<usize, HeapError> {
    match backing(heap, r)? {
        Some(store) => tuple::len(heap, store),
        None => Ok(0),
    }
}

fn check_index(heap: &Heap, r: GcRef, idx: i64) -> Result<GcRef, HeapError> {
    let len = len(heap, r)?;
    if idx < 0 || idx as usize >= len {
        return Err(HeapError::IndexOutOfBounds { index: idx, len });
    }
    backing(heap, r)?.ok_or(HeapError::InvalidRef(r.offset()))
}

pub fn get(heap: &Heap, r: GcRef, idx: i64) -> Result<Value, HeapError> {
    let store = check_index(heap, r, idx)?;
    tuple::get(heap, store, idx)
}

pub fn set(heap: &mut Heap, r: GcRef, idx: i64, v: Value) -> Result<(), HeapError> {
    let store = check_index(heap, r, idx)?;
    tuple::set(heap, store, idx, v)
}

/// Appends in place. Fails with `IndexOutOfBounds` when the backing tuple is
/// full; the caller grows it and retries.
pub fn push_within_capacity(heap: &mut Heap, r: GcRef, v: Value) -> Result<(), HeapError> {
    let len = len(heap, r)?;
    let cap = capacity(heap, r)?;
    if len >= cap {
        return Err(HeapError::IndexOutOfBounds {
            index: len as i64,
            len: cap,
        });
    }
    set_len(heap, r, len + 1)?;
    set(heap, r, len as i64, v)
}
