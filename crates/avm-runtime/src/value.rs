//! Tagged values.
//!
//! A [`Value`] is what lives on actor stacks, in mailboxes and in heap
//! slots. Scalars are stored inline; strings, tuples, arrays and tables
//! refer into the owning actor's heap by offset.

use num_enum::TryFromPrimitive;

use crate::gc::GcRef;
use crate::pid::Pid;

/// Size in bytes of a value slot inside a heap object.
pub const SLOT_BYTES: usize = 16;

/// Value type tags. The numbering is shared with the heap object headers.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
pub enum ValueKind {
    Nil = 0,
    Pid = 1,
    Boolean = 2,
    Pointer = 3,
    Integer = 4,
    Real = 5,
    NativeFunc = 6,
    ByteCodeFunc = 7,
    String = 10,
    Tuple = 11,
    Array = 12,
    Table = 13,
}

impl ValueKind {
    #[inline]
    pub fn from_u8(v: u8) -> Option<Self> {
        Self::try_from(v).ok()
    }

    /// Collectable kinds live in a heap and are moved by collection.
    #[inline]
    pub const fn is_collectable(self) -> bool {
        matches!(
            self,
            ValueKind::String | ValueKind::Tuple | ValueKind::Array | ValueKind::Table
        )
    }
}

/// Index of a registered native function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeId(pub u32);

/// A loaded bytecode prototype: chunk index plus prototype index within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncRef {
    pub chunk: u32,
    pub proto: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Value {
    #[default]
    Nil,
    Pid(Pid),
    Boolean(bool),
    /// Opaque host pointer. Never dereferenced by the VM.
    Pointer(usize),
    Integer(i64),
    Real(f64),
    NativeFunc(NativeId),
    ByteCodeFunc(FuncRef),
    String(GcRef),
    Tuple(GcRef),
    Array(GcRef),
    Table(GcRef),
}

impl Value {
    pub const fn kind(&self) -> ValueKind {
        match self {
            Value::Nil => ValueKind::Nil,
            Value::Pid(_) => ValueKind::Pid,
            Value::Boolean(_) => ValueKind::Boolean,
            Value::Pointer(_) => ValueKind::Pointer,
            Value::Integer(_) => ValueKind::Integer,
            Value::Real(_) => ValueKind::Real,
            Value::NativeFunc(_) => ValueKind::NativeFunc,
            Value::ByteCodeFunc(_) => ValueKind::ByteCodeFunc,
            Value::String(_) => ValueKind::String,
            Value::Tuple(_) => ValueKind::Tuple,
            Value::Array(_) => ValueKind::Array,
            Value::Table(_) => ValueKind::Table,
        }
    }

    #[inline]
    pub const fn is_collectable(&self) -> bool {
        self.kind().is_collectable()
    }

    #[inline]
    pub const fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Only `nil` and `false` are falsy.
    #[inline]
    pub const fn is_falsy(&self) -> bool {
        matches!(self, Value::Nil | Value::Boolean(false))
    }

    #[inline]
    pub const fn is_callable(&self) -> bool {
        matches!(self, Value::NativeFunc(_) | Value::ByteCodeFunc(_))
    }

    pub const fn gc_ref(&self) -> Option<GcRef> {
        match self {
            Value::String(r) | Value::Tuple(r) | Value::Array(r) | Value::Table(r) => Some(*r),
            _ => None,
        }
    }

    /// Builds a collectable value of `kind` pointing at `r`.
    pub const fn collectable(kind: ValueKind, r: GcRef) -> Option<Value> {
        match kind {
            ValueKind::String => Some(Value::String(r)),
            ValueKind::Tuple => Some(Value::Tuple(r)),
            ValueKind::Array => Some(Value::Array(r)),
            ValueKind::Table => Some(Value::Table(r)),
            _ => None,
        }
    }

    /// Same value with its heap reference replaced. Scalars are returned as is.
    pub const fn with_ref(self, r: GcRef) -> Value {
        match self {
            Value::String(_) => Value::String(r),
            Value::Tuple(_) => Value::Tuple(r),
            Value::Array(_) => Value::Array(r),
            Value::Table(_) => Value::Table(r),
            other => other,
        }
    }

    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_pid(&self) -> Option<Pid> {
        match self {
            Value::Pid(p) => Some(*p),
            _ => None,
        }
    }

    // =========================================================================
    // Slot encoding: tag byte, 7 bytes padding, 8 byte payload.
    // =========================================================================

    pub(crate) fn write_slot(&self, out: &mut [u8]) {
        let payload: u64 = match *self {
            Value::Nil => 0,
            Value::Pid(p) => p.raw() as u64,
            Value::Boolean(b) => b as u64,
            Value::Pointer(p) => p as u64,
            Value::Integer(v) => v as u64,
            Value::Real(v) => v.to_bits(),
            Value::NativeFunc(id) => id.0 as u64,
            Value::ByteCodeFunc(f) => ((f.chunk as u64) << 32) | f.proto as u64,
            Value::String(r) | Value::Tuple(r) | Value::Array(r) | Value::Table(r) => {
                r.offset() as u64
            }
        };
        out[..8].copy_from_slice(&[self.kind() as u8, 0, 0, 0, 0, 0, 0, 0]);
        out[8..SLOT_BYTES].copy_from_slice(&payload.to_le_bytes());
    }

    /// Decodes a slot written by [`Value::write_slot`]. Slots are only ever
    /// written by the heap itself; an unknown tag reads as nil.
    pub(crate) fn read_slot(slot: &[u8]) -> Value {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&slot[8..SLOT_BYTES]);
        let payload = u64::from_le_bytes(raw);
        match ValueKind::from_u8(slot[0]) {
            Some(ValueKind::Nil) | None => Value::Nil,
            Some(ValueKind::Pid) => Value::Pid(Pid::from_raw(payload as u32)),
            Some(ValueKind::Boolean) => Value::Boolean(payload != 0),
            Some(ValueKind::Pointer) => Value::Pointer(payload as usize),
            Some(ValueKind::Integer) => Value::Integer(payload as i64),
            Some(ValueKind::Real) => Value::Real(f64::from_bits(payload)),
            Some(ValueKind::NativeFunc) => Value::NativeFunc(NativeId(payload as u32)),
            Some(ValueKind::ByteCodeFunc) => Value::ByteCodeFunc(FuncRef {
                chunk: (payload >> 32) as u32,
                proto: payload as u32,
            }),
            Some(ValueKind::String) => Value::String(GcRef::new(payload as usize)),
            Some(ValueKind::Tuple) => Value::Tuple(GcRef::new(payload as usize)),
            Some(ValueKind::Array) => Value::Array(GcRef::new(payload as usize)),
            Some(ValueKind::Table) => Value::Table(GcRef::new(payload as usize)),
        }
    }
}
