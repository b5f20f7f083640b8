//! Table object: `len: u64` plus one value slot holding a backing tuple of
//! key/value pairs laid out as `k0, v0, k1, v1, ...`.
//!
//! Lookup is a linear scan. Tables in actor programs are small, and a flat
//! layout keeps the collector's job to "one slot, one tuple".

use crate::error::HeapError;
use crate::gc::{GcRef, Heap};
use crate::objects::{read_u64, read_value, tuple, values_equal, write_u64, write_value};
use crate::value::{Value, ValueKind};

pub const PAYLOAD_SIZE: usize = 8 + crate::value::SLOT_BYTES;

pub fn len(heap: &Heap, r: GcRef) -> Result<usize, HeapError> {
    heap.expect(r, ValueKind::Table)?;
    Ok(read_u64(heap.payload(r)?, 0) as usize)
}

fn set_len(heap: &mut Heap, r: GcRef, len: usize) -> Result<(), HeapError> {
    write_u64(heap.payload_mut(r)?, 0, len as u64);
    Ok(())
}

pub fn backing(heap: &Heap, r: GcRef) -> Result<Option<GcRef>, HeapError> {
    heap.expect(r, ValueKind::Table)?;
    Ok(read_value(heap.payload(r)?, 8).gc_ref())
}

/// Installs a new pair store, copying over the existing pairs.
pub fn set_backing(heap: &mut Heap, r: GcRef, store: GcRef) -> Result<(), HeapError> {
    let len = len(heap, r)?;
    if tuple::len(heap, store)? < len * 2 {
        return Err(HeapError::IndexOutOfBounds {
            index: (len * 2) as i64,
            len: tuple::len(heap, store)?,
        });
    }
    if let Some(old) = backing(heap, r)? {
        for i in 0..(len * 2) as i64 {
            let v = tuple::get(heap, old, i)?;
            tuple::set(heap, store, i, v)?;
        }
    }
    write_value(heap.payload_mut(r)?, 8, Value::Tuple(store));
    Ok(())
}

/// Number of pairs the backing store can hold.
pub fn capacity(heap: &Heap, r: GcRef) -> Result<usize, HeapError> {
    match backing(heap, r)? {
        Some(store) => Ok(tuple::len(heap, store)? / 2),
        None => Ok(0),
    }
}

fn find(heap: &Heap, r: GcRef, key: Value) -> Result<Option<(GcRef, i64)>, HeapError> {
    let len = len(heap, r)?;
    let Some(store) = backing(heap, r)? else {
        return Ok(None);
    };
    for i in 0..len as i64 {
        if values_equal(heap, tuple::get(heap, store, i * 2)?, key)? {
            return Ok(Some((store, i * 2)));
        }
    }
    Ok(None)
}

/// Value stored under `key`, or nil.
pub fn get(heap: &Heap, r: GcRef, key: Value) -> Result<Value, HeapError> {
    match find(heap, r, key)? {
        Some((store, at)) => tuple::get(heap, store, at + 1),
        None => Ok(Value::Nil),
    }
}

/// Inserts or replaces. Returns `Ok(false)` when a new key does not fit the
/// current store; the caller grows it and retries.
pub fn try_set(heap: &mut Heap, r: GcRef, key: Value, v: Value) -> Result<bool, HeapError> {
    if let Some((store, at)) = find(heap, r, key)? {
        tuple::set(heap, store, at + 1, v)?;
        return Ok(true);
    }
    let len = len(heap, r)?;
    if len >= capacity(heap, r)? {
        return Ok(false);
    }
    let store = backing(heap, r)?.ok_or(HeapError::InvalidRef(r.offset()))?;
    tuple::set(heap, store, (len * 2) as i64, key)?;
    tuple::set(heap, store, (len * 2 + 1) as i64, v)?;
    set_len(heap, r, len + 1)?;
    Ok(true)
}
