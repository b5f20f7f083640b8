//! VM error types.

use avm_common_core::CodecError;
use avm_runtime::{HeapError, Pid, ValueKind};
use thiserror::Error;

pub type Result<T, E = VmError> = core::result::Result<T, E>;

/// Runtime failure inside a process. Every variant is recoverable at a
/// catch point, where it surfaces as `(code(), message)`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    #[error("{0}")]
    Raised(String),
    #[error(transparent)]
    Heap(#[from] HeapError),
    #[error("stack overflow")]
    StackOverflow,
    #[error("stack underflow")]
    StackUnderflow,
    #[error("invalid opcode {0:#04x}")]
    InvalidOpcode(u8),
    #[error("jump target {target} outside code of length {len}")]
    InvalidJump { target: i64, len: usize },
    #[error("{what} index {index} out of range")]
    InvalidIndex { what: &'static str, index: i64 },
    #[error("invalid function reference {chunk}:{proto}")]
    InvalidFunction { chunk: u32, proto: u32 },
    #[error("value of kind {0:?} is not callable")]
    NotCallable(ValueKind),
    #[error("expected {expected}, found {found:?}")]
    TypeMismatch {
        expected: &'static str,
        found: ValueKind,
    },
    #[error("invalid pid {0}")]
    InvalidPid(Pid),
    #[error("process table full")]
    ProcessTableFull,
    #[error("mailbox of {0} is full")]
    MailboxFull(Pid),
    #[error("no message has been peeked")]
    NothingPeeked,
    #[error("expected {expected} arguments, got {got}")]
    Arity { expected: usize, got: usize },
    #[error("unknown native function #{0}")]
    UnknownNative(u32),
    #[error("no export {module}:{name}")]
    UnknownExport { module: String, name: String },
}

impl VmError {
    /// Stable status code reported at catch points. Always negative.
    pub fn code(&self) -> i64 {
        match self {
            VmError::Raised(_) => -1,
            VmError::Heap(HeapError::OutOfMemory { .. }) => -2,
            VmError::Heap(_) => -3,
            VmError::StackOverflow => -4,
            VmError::StackUnderflow => -5,
            VmError::InvalidOpcode(_) => -6,
            VmError::InvalidJump { .. } => -7,
            VmError::InvalidIndex { .. } => -8,
            VmError::InvalidFunction { .. } => -9,
            VmError::NotCallable(_) => -10,
            VmError::TypeMismatch { .. } => -11,
            VmError::InvalidPid(_) => -12,
            VmError::ProcessTableFull => -13,
            VmError::MailboxFull(_) => -14,
            VmError::NothingPeeked => -15,
            VmError::Arity { .. } => -16,
            VmError::UnknownNative(_) => -17,
            VmError::UnknownExport { .. } => -18,
        }
    }

    pub(crate) fn type_mismatch(expected: &'static str, found: avm_runtime::Value) -> Self {
        VmError::TypeMismatch {
            expected,
            found: found.kind(),
        }
    }
}

/// Failure while loading or linking a chunk. Nothing from the chunk runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("unresolved import {module}:{name}")]
    Unresolved { module: String, name: String },
    #[error("module {0} is already loaded")]
    DuplicateModule(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid pid layout: {idx_bits} index bits, {gen_bits} generation bits")]
    PidLayout { idx_bits: u8, gen_bits: u8 },
    #[error("initial heap {initial} exceeds max heap {max}")]
    HeapLimits { initial: usize, max: usize },
}
