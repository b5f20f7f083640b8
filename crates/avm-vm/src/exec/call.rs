//! Call instructions: IVK, RET

use avm_runtime::{NativeId, Value};

use crate::actor::Actor;
use crate::error::{Result, VmError};
use crate::loader::Loader;
use crate::native::{NativeCtx, NativeFlow};
use crate::vm::{ExecResult, Kernel};

/// Pops the callee and calls it with the `nargs` values beneath it.
///
/// A bytecode callee gets a new frame whose base is the stack top after
/// the pop, so argument `k` (0-based) sits at `bp - 1 - k`. A native
/// callee runs to completion here.
pub fn invoke(
    actor: &mut Actor,
    nargs: usize,
    loader: &Loader,
    kernel: &mut dyn Kernel,
) -> Result<ExecResult> {
    let callee = actor.pop()?;
    if actor.sp() - actor.bp() < nargs {
        return Err(VmError::StackUnderflow);
    }
    match callee {
        Value::ByteCodeFunc(func) => {
            loader.proto(func)?;
            actor.push_frame(func, nargs)?;
            Ok(ExecResult::Continue)
        }
        Value::NativeFunc(id) => call_native(actor, id, nargs, loader, kernel),
        other => Err(VmError::NotCallable(other.kind())),
    }
}

fn call_native(
    actor: &mut Actor,
    id: NativeId,
    nargs: usize,
    loader: &Loader,
    kernel: &mut dyn Kernel,
) -> Result<ExecResult> {
    let func = loader
        .natives()
        .get(id)
        .ok_or(VmError::UnknownNative(id.0))?
        .func;
    let base = actor.sp();
    let mut ctx = NativeCtx::new(actor, kernel, nargs);
    let flow = func(&mut ctx)?;
    let result = ctx.into_result();

    if let NativeFlow::Call { nargs: inner } = flow {
        return invoke(actor, inner, loader, kernel);
    }
    actor.stack.truncate(base - nargs);
    actor.stack.push(result);
    actor.settle_catch_point()?;
    Ok(match flow {
        NativeFlow::Yield => ExecResult::Yield,
        NativeFlow::Exit => ExecResult::Exit,
        _ if actor.frames.is_empty() => ExecResult::Done,
        _ => ExecResult::Continue,
    })
}

/// Pops the innermost frame. Its result (the stack top, or nil when the
/// frame pushed nothing) replaces the frame's arguments in the caller.
pub fn ret(actor: &mut Actor) -> Result<ExecResult> {
    let frame = actor.frames.pop().ok_or(VmError::StackUnderflow)?;
    let result = if actor.stack.len() > frame.bp {
        actor.stack[actor.stack.len() - 1]
    } else {
        Value::Nil
    };
    actor.stack.truncate(frame.bp - frame.nargs);
    actor.stack.push(result);
    actor.settle_catch_point()?;
    if actor.frames.is_empty() {
        Ok(ExecResult::Done)
    } else {
        Ok(ExecResult::Continue)
    }
}
