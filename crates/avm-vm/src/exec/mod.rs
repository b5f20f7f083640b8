//! Instruction implementations, grouped by category.

pub mod call;
pub mod load;
pub mod message;

use crate::actor::Actor;
use crate::error::{Result, VmError};

/// Moves the innermost frame's ip by `displacement`, relative to the
/// instruction after the jump. Landing exactly at the end is allowed and
/// returns from the frame.
pub fn jump(actor: &mut Actor, code_len: usize, displacement: i32) -> Result<()> {
    let frame = actor.frames.last_mut().ok_or(VmError::StackUnderflow)?;
    let target = frame.ip as i64 + displacement as i64;
    if target < 0 || target > code_len as i64 {
        return Err(VmError::InvalidJump {
            target,
            len: code_len,
        });
    }
    frame.ip = target as usize;
    Ok(())
}
