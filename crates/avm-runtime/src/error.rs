use thiserror::Error;

use crate::value::ValueKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeapError {
    #[error("out of memory: {requested} bytes requested, heap limit is {limit} bytes")]
    OutOfMemory { requested: usize, limit: usize },
    #[error("invalid heap reference {0:#x}")]
    InvalidRef(usize),
    #[error("expected {expected:?}, found {found:?}")]
    KindMismatch { expected: ValueKind, found: ValueKind },
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: i64, len: usize },
}
