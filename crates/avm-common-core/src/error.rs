//! Errors raised while building or decoding bytecode.

use thiserror::Error;

use crate::instruction::Opcode;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("payload {payload} does not fit the 24-bit operand of {op:?}")]
    PayloadOutOfRange { op: Opcode, payload: i32 },
    #[error("unexpected end of chunk at byte {0}")]
    UnexpectedEof(usize),
    #[error("bad chunk signature")]
    BadSignature,
    #[error("chunk version {found_major}.{found_minor} is not {expected_major}.{expected_minor}")]
    VersionMismatch {
        found_major: u8,
        found_minor: u8,
        expected_major: u8,
        expected_minor: u8,
    },
    #[error("chunk byte order does not match the host")]
    EndiannessMismatch,
    #[error("chunk {what} width is {found} bytes, host uses {expected}")]
    WidthMismatch {
        what: &'static str,
        found: u8,
        expected: u8,
    },
    #[error("string reference {0} is outside the string table")]
    InvalidStringRef(i64),
    #[error("string table is not valid utf-8")]
    InvalidUtf8,
    #[error("unknown constant tag {0}")]
    InvalidConstantTag(u32),
    #[error("invalid {what} count {count}")]
    InvalidCount { what: &'static str, count: i64 },
    #[error("{0} trailing bytes after the module prototype")]
    TrailingBytes(usize),
}
