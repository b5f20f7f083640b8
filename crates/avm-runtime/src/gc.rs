//! Per-actor copying garbage collector.
//!
//! Every actor owns one [`Heap`]. Objects are bump-allocated into a byte
//! buffer and addressed by offset, so a collection can move them freely:
//! live objects reachable from the caller's roots are copied Cheney-style
//! into a fresh buffer and every root and interior slot is rewritten to the
//! new offset. Nothing survives a collection except what the roots reach.
//!
//! Object layout: a 16-byte header (`kind: u8`, 3 pad bytes, `size: u32`,
//! `forward: u64`) followed by `size` payload bytes padded to 8.

use tracing::trace;

use crate::error::HeapError;
use crate::value::{Value, ValueKind, SLOT_BYTES};

pub const HEADER_BYTES: usize = 16;
const NOT_FORWARDED: u64 = u64::MAX;

/// Offset of an object header inside its owning heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GcRef(usize);

impl GcRef {
    #[inline]
    pub const fn new(offset: usize) -> Self {
        Self(offset)
    }

    #[inline]
    pub const fn offset(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcHeader {
    pub kind: ValueKind,
    /// Payload size in bytes, before padding.
    pub size: usize,
    pub forwarded: Option<GcRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapStats {
    pub used: usize,
    pub capacity: usize,
    pub max_capacity: usize,
    pub collections: u64,
}

#[inline]
pub const fn align8(n: usize) -> usize {
    (n + 7) & !7
}

/// Bytes an object with `size` payload bytes occupies, header included.
#[inline]
pub const fn alloc_size(size: usize) -> usize {
    HEADER_BYTES + align8(size)
}

fn read_header(buf: &[u8], off: usize) -> Option<GcHeader> {
    let raw = buf.get(off..off.checked_add(HEADER_BYTES)?)?;
    let kind = ValueKind::from_u8(raw[0])?;
    let mut size = [0u8; 4];
    size.copy_from_slice(&raw[4..8]);
    let mut fwd = [0u8; 8];
    fwd.copy_from_slice(&raw[8..16]);
    let fwd = u64::from_le_bytes(fwd);
    Some(GcHeader {
        kind,
        size: u32::from_le_bytes(size) as usize,
        forwarded: (fwd != NOT_FORWARDED).then_some(GcRef(fwd as usize)),
    })
}

fn write_header(buf: &mut [u8], off: usize, kind: ValueKind, size: usize, forward: u64) {
    let raw = &mut buf[off..off + HEADER_BYTES];
    raw[0] = kind as u8;
    raw[1..4].fill(0);
    raw[4..8].copy_from_slice(&(size as u32).to_le_bytes());
    raw[8..16].copy_from_slice(&forward.to_le_bytes());
}

/// Byte offset (within the payload) and count of value slots an object
/// carries. Only these are scanned and relocated.
pub(crate) fn value_slots(kind: ValueKind, payload: &[u8]) -> (usize, usize) {
    let room = payload.len().saturating_sub(8) / SLOT_BYTES;
    match kind {
        ValueKind::Tuple => {
            let mut len = [0u8; 8];
            len.copy_from_slice(&payload[..8]);
            (8, (u64::from_le_bytes(len) as usize).min(room))
        }
        ValueKind::Array | ValueKind::Table => (8, room.min(1)),
        _ => (8, 0),
    }
}

pub struct Heap {
    cur: Vec<u8>,
    spare: Vec<u8>,
    capacity: usize,
    max_capacity: usize,
    collections: u64,
}

impl Heap {
    pub fn new(initial: usize, max: usize) -> Self {
        let max_capacity = max.min(u32::MAX as usize);
        let capacity = initial.min(max_capacity);
        Self {
            cur: Vec::with_capacity(capacity),
            spare: Vec::new(),
            capacity,
            max_capacity,
            collections: 0,
        }
    }

    #[inline]
    pub fn used(&self) -> usize {
        self.cur.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    #[inline]
    pub fn free(&self) -> usize {
        self.capacity - self.cur.len()
    }

    pub fn stats(&self) -> HeapStats {
        HeapStats {
            used: self.used(),
            capacity: self.capacity,
            max_capacity: self.max_capacity,
            collections: self.collections,
        }
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Allocates without collecting. The payload is zeroed, which reads as
    /// nil in every value slot.
    pub fn try_alloc(&mut self, kind: ValueKind, size: usize) -> Result<GcRef, HeapError> {
        debug_assert!(kind.is_collectable());
        let need = alloc_size(size);
        if size > u32::MAX as usize || need > self.free() {
            return Err(HeapError::OutOfMemory {
                requested: need,
                limit: self.max_capacity,
            });
        }
        let off = self.cur.len();
        self.cur.resize(off + need, 0);
        write_header(&mut self.cur, off, kind, size, NOT_FORWARDED);
        Ok(GcRef(off))
    }

    /// Allocates, collecting first if the object does not fit. Any value in
    /// `roots` may be rewritten; refs held elsewhere are stale afterwards.
    pub fn alloc(
        &mut self,
        kind: ValueKind,
        size: usize,
        roots: &mut [&mut [Value]],
    ) -> Result<GcRef, HeapError> {
        self.reserve(alloc_size(size), roots)?;
        self.try_alloc(kind, size)
    }

    /// Makes sure `bytes` more bytes can be allocated without collecting.
    pub fn reserve(&mut self, bytes: usize, roots: &mut [&mut [Value]]) -> Result<(), HeapError> {
        if bytes <= self.free() {
            return Ok(());
        }
        self.collect(roots, bytes)
    }

    // =========================================================================
    // Collection
    // =========================================================================

    /// Copies everything reachable from `roots` into a fresh buffer sized
    /// for the live data plus `request` bytes of headroom.
    pub fn collect(&mut self, roots: &mut [&mut [Value]], request: usize) -> Result<(), HeapError> {
        let mut to = core::mem::take(&mut self.spare);
        to.clear();
        to.reserve(self.cur.len());

        for slice in roots.iter_mut() {
            for v in slice.iter_mut() {
                *v = self.evacuate(*v, &mut to);
            }
        }

        let mut scan = 0;
        while scan < to.len() {
            let Some(header) = read_header(&to, scan) else {
                break;
            };
            let payload = scan + HEADER_BYTES;
            let (first, count) = value_slots(header.kind, &to[payload..payload + header.size]);
            for i in 0..count {
                let at = payload + first + i * SLOT_BYTES;
                let v = Value::read_slot(&to[at..at + SLOT_BYTES]);
                if v.is_collectable() {
                    self.evacuate(v, &mut to).write_slot(&mut to[at..at + SLOT_BYTES]);
                }
            }
            scan = payload + align8(header.size);
        }

        let before = self.cur.len();
        self.spare = core::mem::replace(&mut self.cur, to);
        self.spare.clear();
        self.collections += 1;

        let live = self.cur.len();
        let wanted = live.saturating_add(request).saturating_mul(2);
        self.capacity = self.capacity.max(wanted).min(self.max_capacity);
        self.cur.reserve(self.capacity - live);
        trace!(before, live, capacity = self.capacity, "heap collected");

        if live.saturating_add(request) > self.capacity {
            return Err(HeapError::OutOfMemory {
                requested: request,
                limit: self.max_capacity,
            });
        }
        Ok(())
    }

    /// Moves one object to `to` (once) and returns `v` pointing at the copy.
    fn evacuate(&mut self, v: Value, to: &mut Vec<u8>) -> Value {
        let Some(r) = v.gc_ref() else {
            return v;
        };
        let Some(header) = read_header(&self.cur, r.0) else {
            debug_assert!(false, "dangling root {:#x}", r.0);
            return v;
        };
        if let Some(fwd) = header.forwarded {
            return v.with_ref(fwd);
        }
        let len = alloc_size(header.size);
        let new_off = to.len();
        to.extend_from_slice(&self.cur[r.0..r.0 + len]);
        write_header(&mut self.cur, r.0, header.kind, header.size, new_off as u64);
        v.with_ref(GcRef(new_off))
    }

    // =========================================================================
    // Access
    // =========================================================================

    pub fn header(&self, r: GcRef) -> Result<GcHeader, HeapError> {
        read_header(&self.cur, r.0)
            .filter(|h| r.0 + alloc_size(h.size) <= self.cur.len())
            .ok_or(HeapError::InvalidRef(r.0))
    }

    /// Header of `r`, checked to be of `kind`.
    pub fn expect(&self, r: GcRef, kind: ValueKind) -> Result<GcHeader, HeapError> {
        let header = self.header(r)?;
        if header.kind != kind {
            return Err(HeapError::KindMismatch {
                expected: kind,
                found: header.kind,
            });
        }
        Ok(header)
    }

    pub fn payload(&self, r: GcRef) -> Result<&[u8], HeapError> {
        let header = self.header(r)?;
        let start = r.0 + HEADER_BYTES;
        Ok(&self.cur[start..start + header.size])
    }

    pub fn payload_mut(&mut self, r: GcRef) -> Result<&mut [u8], HeapError> {
        let header = self.header(r)?;
        let start = r.0 + HEADER_BYTES;
        Ok(&mut self.cur[start..start + header.size])
    }
}

impl core::fmt::Debug for Heap {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Heap").field("stats", &self.stats()).finish()
    }
}
