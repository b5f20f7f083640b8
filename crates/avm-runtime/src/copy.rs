//! Deep copy of value graphs between heaps.
//!
//! Messages and spawn arguments cross actor boundaries by value: the whole
//! graph reachable from the value is copied into the receiver's heap.
//! Shared sub-objects stay shared in the copy, and cycles are preserved.

use hashbrown::{HashMap, HashSet};

use crate::error::HeapError;
use crate::gc::{alloc_size, value_slots, GcRef, Heap};
use crate::objects::{read_value, write_value};
use crate::value::{Value, SLOT_BYTES};

/// Bytes needed in a destination heap to hold a copy of `v`.
pub fn measure(src: &Heap, v: Value) -> Result<usize, HeapError> {
    let Some(root) = v.gc_ref() else {
        return Ok(0);
    };
    let mut seen = HashSet::new();
    let mut work = vec![root];
    let mut total = 0;
    while let Some(r) = work.pop() {
        if !seen.insert(r) {
            continue;
        }
        let header = src.header(r)?;
        total += alloc_size(header.size);
        let payload = src.payload(r)?;
        let (first, count) = value_slots(header.kind, payload);
        for i in 0..count {
            if let Some(child) = read_value(payload, first + i * SLOT_BYTES).gc_ref() {
                work.push(child);
            }
        }
    }
    Ok(total)
}

/// Copies the graph under `v` from `src` into `dst` without collecting
/// `dst`. Reserve [`measure`] bytes in `dst` first.
pub fn copy_value(src: &Heap, dst: &mut Heap, v: Value) -> Result<Value, HeapError> {
    let Some(root) = v.gc_ref() else {
        return Ok(v);
    };
    let mut forward: HashMap<GcRef, GcRef> = HashMap::new();
    let mut work = Vec::new();
    let new_root = shallow_copy(src, dst, root, &mut forward, &mut work)?;

    while let Some((from, to)) = work.pop() {
        let header = src.header(from)?;
        let (first, count) = value_slots(header.kind, src.payload(from)?);
        for i in 0..count {
            let at = first + i * SLOT_BYTES;
            let child = read_value(src.payload(from)?, at);
            let Some(child_ref) = child.gc_ref() else {
                continue;
            };
            let moved = match forward.get(&child_ref) {
                Some(&r) => r,
                None => shallow_copy(src, dst, child_ref, &mut forward, &mut work)?,
            };
            write_value(dst.payload_mut(to)?, at, child.with_ref(moved));
        }
    }
    Ok(v.with_ref(new_root))
}

/// Copies one object's bytes verbatim. Its value slots still hold `src`
/// offsets until the worklist entry is processed.
fn shallow_copy(
    src: &Heap,
    dst: &mut Heap,
    r: GcRef,
    forward: &mut HashMap<GcRef, GcRef>,
    work: &mut Vec<(GcRef, GcRef)>,
) -> Result<GcRef, HeapError> {
    let header = src.header(r)?;
    let new = dst.try_alloc(header.kind, header.size)?;
    dst.payload_mut(new)?.copy_from_slice(src.payload(r)?);
    forward.insert(r, new);
    work.push((r, new));
    Ok(new)
}
