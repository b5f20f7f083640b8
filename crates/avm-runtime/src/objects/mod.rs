//! Heap object layouts.
//!
//! Each module knows one object kind's payload layout and offers accessors
//! over an existing allocation. Allocation itself goes through the owner of
//! the heap, which is the only party that knows the roots.

pub mod array;
pub mod string;
pub mod table;
pub mod tuple;

use crate::error::HeapError;
use crate::gc::Heap;
use crate::value::{Value, SLOT_BYTES};

pub(crate) fn read_u64(payload: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&payload[at..at + 8]);
    u64::from_le_bytes(raw)
}

pub(crate) fn write_u64(payload: &mut [u8], at: usize, v: u64) {
    payload[at..at + 8].copy_from_slice(&v.to_le_bytes());
}

pub(crate) fn read_value(payload: &[u8], at: usize) -> Value {
    Value::read_slot(&payload[at..at + SLOT_BYTES])
}

pub(crate) fn write_value(payload: &mut [u8], at: usize, v: Value) {
    v.write_slot(&mut payload[at..at + SLOT_BYTES]);
}

/// Structural equality where it matters for lookups: strings compare by
/// content, other collectables by identity, scalars by value.
pub fn values_equal(heap: &Heap, a: Value, b: Value) -> Result<bool, HeapError> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => {
            if x == y {
                return Ok(true);
            }
            Ok(string::hash(heap, x)? == string::hash(heap, y)?
                && string::bytes(heap, x)? == string::bytes(heap, y)?)
        }
        _ => Ok(a == b),
    }
}
