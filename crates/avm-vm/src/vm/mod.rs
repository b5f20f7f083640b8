//! Interpreter loop.

mod types;

pub use types::{ExecResult, Kernel};

use avm_common_core::Opcode;
use avm_runtime::Value;
use tracing::debug;

use crate::actor::Actor;
use crate::error::{Result, VmError};
use crate::exec;
use crate::loader::Loader;

/// Runs `actor` until it suspends, finishes, or fails past its last catch
/// point.
pub fn execute(actor: &mut Actor, loader: &Loader, kernel: &mut dyn Kernel) -> ExecResult {
    loop {
        match run(actor, loader, kernel) {
            Ok(result) => return result,
            Err(err) => {
                if !actor.recover(&err) {
                    return ExecResult::Panic(err);
                }
                debug!(pid = %kernel.self_pid(), code = err.code(), error = %err, "error caught");
            }
        }
    }
}

fn run(actor: &mut Actor, loader: &Loader, kernel: &mut dyn Kernel) -> Result<ExecResult> {
    if let Some(nargs) = actor.entry.take() {
        let result = exec::call::invoke(actor, nargs, loader, kernel)?;
        if result != ExecResult::Continue {
            return Ok(result);
        }
    }
    if let Some(displacement) = actor.pending_receive.take() {
        exec::message::resume_receive(actor, loader, displacement)?;
    }
    loop {
        match step(actor, loader, kernel)? {
            ExecResult::Continue => {}
            other => return Ok(other),
        }
    }
}

fn count(payload: i32) -> Result<usize> {
    usize::try_from(payload).map_err(|_| VmError::InvalidIndex {
        what: "count",
        index: payload as i64,
    })
}

/// Executes one instruction of the innermost frame.
pub fn step(actor: &mut Actor, loader: &Loader, kernel: &mut dyn Kernel) -> Result<ExecResult> {
    let Some(frame) = actor.frames.last_mut() else {
        return Ok(ExecResult::Done);
    };
    let func = frame.func;
    let proto = loader.proto(func)?;
    let ip = frame.ip;
    let Some(&inst) = proto.instructions.get(ip) else {
        // Falling off the end returns.
        return exec::call::ret(actor);
    };
    frame.ip = ip + 1;

    let Some(op) = inst.opcode() else {
        return Err(VmError::InvalidOpcode(inst.op_byte()));
    };
    let payload = inst.payload();
    match op {
        Opcode::Nop => {}
        Opcode::Pop => actor.pop_n(count(payload)?)?,
        Opcode::Ldk => exec::load::ldk(actor, proto, payload)?,
        Opcode::Nil => actor.push(Value::Nil)?,
        Opcode::Ldb => actor.push(Value::Boolean(payload != 0))?,
        Opcode::Lsi => actor.push(Value::Integer(payload as i64))?,
        Opcode::Llv => actor.push(actor.load_local(payload))?,
        Opcode::Slv => {
            let v = actor.pop()?;
            actor.store_local(payload, v)?;
        }
        Opcode::Imp => exec::load::imp(actor, proto, payload)?,
        Opcode::Cls => exec::load::cls(actor, proto, func, payload)?,
        Opcode::Jmp => exec::jump(actor, proto.instructions.len(), payload)?,
        Opcode::Jin => {
            if actor.pop()?.is_falsy() {
                exec::jump(actor, proto.instructions.len(), payload)?;
            }
        }
        Opcode::Ivk => return exec::call::invoke(actor, count(payload)?, loader, kernel),
        Opcode::Ret => return exec::call::ret(actor),
        Opcode::Snd => exec::message::send(actor, kernel)?,
        Opcode::Rcv => return exec::message::receive(actor, proto.instructions.len(), payload),
        Opcode::Rmv => {
            actor.mailbox.remove_peeked().ok_or(VmError::NothingPeeked)?;
        }
        Opcode::Rwd => actor.mailbox.rewind(),
    }
    Ok(ExecResult::Continue)
}
