//! Core types for the AVM bytecode format.
//!
//! This crate carries everything that has to agree between whoever produces a
//! chunk and the machine that runs it: the 32-bit instruction word, the
//! function prototype tree, and the binary chunk layout.

pub mod bytecode;
pub mod error;
pub mod instruction;
pub mod serialize;

pub use bytecode::{Chunk, ChunkHeader, Constant, Import, Prototype};
pub use error::CodecError;
pub use instruction::{Instruction, Opcode};
