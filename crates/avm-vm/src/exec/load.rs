//! Load instructions: LDK, IMP, CLS

use avm_common_core::Constant;
use avm_runtime::{FuncRef, Value};

use crate::actor::Actor;
use crate::error::{Result, VmError};
use crate::loader::LoadedProto;

fn index<'a, T>(items: &'a [T], what: &'static str, idx: i32) -> Result<&'a T> {
    usize::try_from(idx)
        .ok()
        .and_then(|i| items.get(i))
        .ok_or(VmError::InvalidIndex {
            what,
            index: idx as i64,
        })
}

pub fn ldk(actor: &mut Actor, proto: &LoadedProto, idx: i32) -> Result<()> {
    let value = match index(&proto.constants, "constant", idx)? {
        Constant::Integer(v) => Value::Integer(*v),
        Constant::Real(v) => Value::Real(*v),
        Constant::String(s) => actor.new_string(s.as_bytes())?,
    };
    actor.push(value)
}

#[inline]
pub fn imp(actor: &mut Actor, proto: &LoadedProto, idx: i32) -> Result<()> {
    let value = *index(&proto.imports, "import", idx)?;
    actor.push(value)
}

/// Pushes a function value for nested prototype `idx` of the running one.
#[inline]
pub fn cls(actor: &mut Actor, proto: &LoadedProto, func: FuncRef, idx: i32) -> Result<()> {
    let nested = *index(&proto.nesteds, "nested prototype", idx)?;
    actor.push(Value::ByteCodeFunc(FuncRef {
        chunk: func.chunk,
        proto: nested,
    }))
}
