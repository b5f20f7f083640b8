//! AVM runtime.
//!
//! Values, process identifiers and the per-actor heap. Nothing in here knows
//! about instructions or scheduling; the VM crate builds on these pieces.

pub mod copy;
pub mod error;
pub mod gc;
pub mod objects;
pub mod pid;
pub mod value;

pub use error::HeapError;
pub use gc::{GcHeader, GcRef, Heap, HeapStats};
pub use pid::{Pid, PidLayout};
pub use value::{FuncRef, NativeId, Value, ValueKind};
