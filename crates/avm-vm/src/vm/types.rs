//! VM types shared by the interpreter and the scheduler.

use avm_runtime::{Heap, Pid, Value};

use crate::error::{Result, VmError};

/// Outcome of executing a process until it stops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecResult {
    /// Keep going; only seen between instructions.
    Continue,
    /// Voluntary suspension; the process stays runnable.
    Yield,
    /// Blocked in a receive. `None` waits forever, otherwise microseconds.
    Block(Option<u64>),
    /// Explicit exit.
    Exit,
    /// The root call returned.
    Done,
    /// Unrecovered error. The process is finished.
    Panic(VmError),
}

/// Everything a running process may do to the rest of the system.
///
/// The running process is not reachable through it: operations addressed
/// to itself are handled by the caller before getting here.
pub trait Kernel {
    fn self_pid(&self) -> Pid;

    /// Deep-copies `msg` out of `from` into the mailbox of `target`.
    fn send(&mut self, target: Pid, msg: Value, from: &Heap) -> Result<()>;

    /// Starts a process running `callee(args...)`; collectable arguments are
    /// copied out of `from`.
    fn spawn(&mut self, callee: Value, args: &[Value], from: &Heap) -> Result<Pid>;

    /// Asks `target` to exit at its next suspension point.
    fn kill(&mut self, target: Pid) -> Result<()>;
}
