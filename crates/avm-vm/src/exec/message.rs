//! Message instructions: SND, RCV (RMV and RWD are mailbox one-liners)

use avm_runtime::Value;

use crate::actor::Actor;
use crate::error::{Result, VmError};
use crate::exec::jump;
use crate::loader::Loader;
use crate::vm::{ExecResult, Kernel};

/// Pops the message, then the target pid, and delivers a copy.
pub fn send(actor: &mut Actor, kernel: &mut dyn Kernel) -> Result<()> {
    let msg = actor.pop()?;
    let target = actor.pop()?;
    let Value::Pid(pid) = target else {
        return Err(VmError::type_mismatch("pid", target));
    };
    if pid == kernel.self_pid() {
        actor.deliver_local(pid, msg)
    } else {
        kernel.send(pid, msg, actor.heap())
    }
}

/// Replaces the timeout on top of the stack with the next unpeeked
/// message. With none available: a zero timeout jumps at once, a negative
/// (or nil) one blocks forever, a positive one blocks for that many
/// microseconds.
pub fn receive(actor: &mut Actor, code_len: usize, displacement: i32) -> Result<ExecResult> {
    let timeout = actor.pop()?;
    if let Some(msg) = actor.mailbox.peek() {
        actor.push(msg)?;
        return Ok(ExecResult::Continue);
    }
    let timeout = match timeout {
        Value::Integer(t) => t,
        Value::Nil => -1,
        other => return Err(VmError::type_mismatch("integer timeout", other)),
    };
    if timeout == 0 {
        jump(actor, code_len, displacement)?;
        return Ok(ExecResult::Continue);
    }
    actor.pending_receive = Some(displacement);
    Ok(ExecResult::Block((timeout > 0).then_some(timeout as u64)))
}

/// Finishes a receive that blocked: push the message if one came in,
/// otherwise the deadline passed and the receive takes its jump.
pub fn resume_receive(actor: &mut Actor, loader: &Loader, displacement: i32) -> Result<()> {
    if let Some(msg) = actor.mailbox.peek() {
        return actor.push(msg);
    }
    let func = actor.frames.last().ok_or(VmError::StackUnderflow)?.func;
    let code_len = loader.proto(func)?.instructions.len();
    jump(actor, code_len, displacement)
}
