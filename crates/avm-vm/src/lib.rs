//! AVM virtual machine.
//!
//! Lightweight processes, each an [`Actor`] with a private heap, stack and
//! mailbox, run cooperatively under one [`Scheduler`]. Processes share no
//! memory; a message is deep-copied into the receiver's heap.

pub mod actor;
pub mod clock;
pub mod config;
pub mod error;
pub mod exec;
pub mod loader;
pub mod mailbox;
pub mod native;
pub mod process;
pub mod scheduler;
pub mod stdlib;
pub mod vm;

pub use actor::{Actor, CallFrame, CatchPoint};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{ActorConfig, SchedulerConfig};
pub use error::{ConfigError, LoadError, VmError};
pub use loader::Loader;
pub use mailbox::Mailbox;
pub use native::{NativeCtx, NativeFlow, NativeFn, NativeRegistry};
pub use process::{Process, ProcessState, ProcessTable};
pub use scheduler::{HostArg, RunState, Scheduler};
pub use vm::{ExecResult, Kernel};

pub use avm_common_core as bytecode;
pub use avm_runtime::{FuncRef, NativeId, Pid, Value, ValueKind};
