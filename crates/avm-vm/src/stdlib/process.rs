//! `std` library: process control and protected calls.

use avm_runtime::Value;

use crate::error::{Result, VmError};
use crate::native::{NativeCtx, NativeFlow, NativeRegistry};

pub(super) fn register(registry: &mut NativeRegistry) {
    registry.register_lib(
        "std",
        &[
            ("self", self_pid),
            ("spawn", spawn),
            ("yield", yield_now),
            ("exit", exit),
            ("error", error),
            ("try", protected_call),
            ("kill", kill),
        ],
    );
}

fn self_pid(ctx: &mut NativeCtx<'_>) -> Result<NativeFlow> {
    let pid = ctx.self_pid();
    ctx.set_result(Value::Pid(pid));
    Ok(NativeFlow::Return)
}

/// `spawn(f, args...)` starts `f(args...)` in a new process.
fn spawn(ctx: &mut NativeCtx<'_>) -> Result<NativeFlow> {
    ctx.expect_args(1)?;
    let callee = ctx.arg(0);
    let args = ctx.args_from(1);
    let (kernel, heap) = ctx.kernel_and_heap();
    let pid = kernel.spawn(callee, &args, heap)?;
    ctx.set_result(Value::Pid(pid));
    Ok(NativeFlow::Return)
}

fn yield_now(_ctx: &mut NativeCtx<'_>) -> Result<NativeFlow> {
    Ok(NativeFlow::Yield)
}

fn exit(_ctx: &mut NativeCtx<'_>) -> Result<NativeFlow> {
    Ok(NativeFlow::Exit)
}

/// `error(msg)` raises a recoverable error carrying `msg`.
fn error(ctx: &mut NativeCtx<'_>) -> Result<NativeFlow> {
    let msg = match ctx.arg(0) {
        Value::String(_) => String::from_utf8_lossy(ctx.actor().string_bytes(ctx.arg(0))?).into_owned(),
        Value::Nil => "error".to_owned(),
        other => format!("{other:?}"),
    };
    Err(VmError::Raised(msg))
}

/// `try(f, args...)` calls `f(args...)` and returns `(0, result)`, or
/// `(code, message)` if it fails.
fn protected_call(ctx: &mut NativeCtx<'_>) -> Result<NativeFlow> {
    ctx.expect_args(1)?;
    ctx.protect();
    // The stack already reads [args..., f]: hand it straight to the call.
    Ok(NativeFlow::Call {
        nargs: ctx.nargs() - 1,
    })
}

/// `kill(pid)` asks a process to exit; killing oneself exits at once.
fn kill(ctx: &mut NativeCtx<'_>) -> Result<NativeFlow> {
    let pid = ctx.arg_pid(0)?;
    if pid == ctx.self_pid() {
        return Ok(NativeFlow::Exit);
    }
    let (kernel, _) = ctx.kernel_and_heap();
    kernel.kill(pid)?;
    Ok(NativeFlow::Return)
}
