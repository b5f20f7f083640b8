//! Actor: the unit of isolation.
//!
//! One heap, one operand stack, one frame chain, one catch-point stack and
//! one mailbox. The stack and the mailbox are the collector's only roots:
//! frames and catch points hold positions, never values.

use avm_runtime::copy;
use avm_runtime::objects::{string, tuple};
use avm_runtime::{FuncRef, GcRef, Heap, Pid, Value, ValueKind};

use crate::config::ActorConfig;
use crate::error::{Result, VmError};
use crate::mailbox::Mailbox;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallFrame {
    pub func: FuncRef,
    /// Next instruction to execute.
    pub ip: usize,
    /// Stack position of local 0; argument `k` sits at `bp - 1 - k`.
    pub bp: usize,
    pub nargs: usize,
}

/// Resumption point for a protected call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatchPoint {
    pub frame_depth: usize,
    /// Stack height to restore; the `(status, value)` tuple lands here.
    pub stack_height: usize,
}

#[derive(Debug)]
pub struct Actor {
    pub(crate) heap: Heap,
    pub(crate) stack: Vec<Value>,
    pub(crate) frames: Vec<CallFrame>,
    pub(crate) catches: Vec<CatchPoint>,
    pub(crate) mailbox: Mailbox,
    /// Argument count of the root call, until the first resumption makes it.
    pub(crate) entry: Option<usize>,
    /// Jump displacement of a receive that suspended.
    pub(crate) pending_receive: Option<i32>,
    max_stack: usize,
    max_frames: usize,
    max_mailbox: usize,
}

impl Actor {
    pub fn new(config: &ActorConfig) -> Self {
        Self {
            heap: Heap::new(config.initial_heap, config.max_heap),
            stack: Vec::new(),
            frames: Vec::new(),
            catches: Vec::new(),
            mailbox: Mailbox::new(),
            entry: None,
            pending_receive: None,
            max_stack: config.max_stack,
            max_frames: config.max_frames,
            max_mailbox: config.max_mailbox,
        }
    }

    #[inline]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    #[inline]
    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    #[inline]
    pub fn frames(&self) -> &[CallFrame] {
        &self.frames
    }

    #[inline]
    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    #[inline]
    pub fn catch_points(&self) -> &[CatchPoint] {
        &self.catches
    }

    #[inline]
    pub fn sp(&self) -> usize {
        self.stack.len()
    }

    #[inline]
    pub fn bp(&self) -> usize {
        self.frames.last().map_or(0, |f| f.bp)
    }

    #[inline]
    fn nargs(&self) -> usize {
        self.frames.last().map_or(0, |f| f.nargs)
    }

    // =========================================================================
    // Stack
    // =========================================================================

    pub fn push(&mut self, v: Value) -> Result<()> {
        if self.stack.len() >= self.max_stack {
            return Err(VmError::StackOverflow);
        }
        self.stack.push(v);
        Ok(())
    }

    /// Pops within the current frame; the frame's arguments are off limits.
    pub fn pop(&mut self) -> Result<Value> {
        if self.stack.len() <= self.bp() {
            return Err(VmError::StackUnderflow);
        }
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    pub fn pop_n(&mut self, n: usize) -> Result<()> {
        if self.stack.len() - self.bp() < n {
            return Err(VmError::StackUnderflow);
        }
        self.stack.truncate(self.stack.len() - n);
        Ok(())
    }

    #[inline]
    pub fn top(&self) -> Option<Value> {
        self.stack.last().copied()
    }

    /// Absolute position of frame-relative `idx`, if inside `[-nargs, sp)`.
    fn local_pos(&self, idx: i32) -> Option<usize> {
        let pos = self.bp() as i64 + idx as i64;
        let low = (self.bp() - self.nargs()) as i64;
        (pos >= low && pos < self.stack.len() as i64).then_some(pos as usize)
    }

    /// Frame-relative read. Anything outside the frame reads as nil.
    pub fn load_local(&self, idx: i32) -> Value {
        self.local_pos(idx).map_or(Value::Nil, |pos| self.stack[pos])
    }

    pub fn store_local(&mut self, idx: i32, v: Value) -> Result<()> {
        let pos = self.local_pos(idx).ok_or(VmError::InvalidIndex {
            what: "local",
            index: idx as i64,
        })?;
        self.stack[pos] = v;
        Ok(())
    }

    // =========================================================================
    // Frames
    // =========================================================================

    pub(crate) fn push_frame(&mut self, func: FuncRef, nargs: usize) -> Result<()> {
        if self.frames.len() >= self.max_frames {
            return Err(VmError::StackOverflow);
        }
        self.frames.push(CallFrame {
            func,
            ip: 0,
            bp: self.stack.len(),
            nargs,
        });
        Ok(())
    }

    /// Stacks the root call: arguments in reverse so that argument 0 ends up
    /// at index -1, then the callee. The call is made on first resumption.
    /// Collectable arguments are deep-copied out of `src`.
    pub fn prepare_entry(&mut self, callee: Value, args: &[Value], src: Option<&Heap>) -> Result<()> {
        if !callee.is_callable() {
            return Err(VmError::NotCallable(callee.kind()));
        }
        let mut need = 0;
        for &arg in args {
            need += match (arg.is_collectable(), src) {
                (false, _) => 0,
                (true, Some(src)) => copy::measure(src, arg)?,
                (true, None) => return Err(VmError::type_mismatch("inline value", arg)),
            };
        }
        self.reserve(need)?;
        for &arg in args.iter().rev() {
            let arg = match src {
                Some(src) => copy::copy_value(src, &mut self.heap, arg)?,
                None => arg,
            };
            self.push(arg)?;
        }
        self.push(callee)?;
        self.entry = Some(args.len());
        Ok(())
    }

    // =========================================================================
    // Heap
    // =========================================================================

    pub fn alloc(&mut self, kind: ValueKind, size: usize) -> Result<GcRef> {
        let Actor {
            heap,
            stack,
            mailbox,
            ..
        } = self;
        Ok(heap.alloc(kind, size, &mut [stack.as_mut_slice(), mailbox.values_mut()])?)
    }

    pub fn reserve(&mut self, bytes: usize) -> Result<()> {
        let Actor {
            heap,
            stack,
            mailbox,
            ..
        } = self;
        Ok(heap.reserve(bytes, &mut [stack.as_mut_slice(), mailbox.values_mut()])?)
    }

    /// Forces a collection.
    pub fn collect(&mut self) -> Result<()> {
        let Actor {
            heap,
            stack,
            mailbox,
            ..
        } = self;
        Ok(heap.collect(&mut [stack.as_mut_slice(), mailbox.values_mut()], 0)?)
    }

    pub fn new_string(&mut self, bytes: &[u8]) -> Result<Value> {
        let r = self.alloc(ValueKind::String, string::payload_size(bytes.len()))?;
        string::init(&mut self.heap, r, bytes)?;
        Ok(Value::String(r))
    }

    /// A tuple of `len` nils.
    pub fn new_tuple(&mut self, len: usize) -> Result<Value> {
        let r = self.alloc(ValueKind::Tuple, tuple::payload_size(len))?;
        tuple::init(&mut self.heap, r, len)?;
        Ok(Value::Tuple(r))
    }

    /// Builds `(a, b)` where `b` sits on top of the stack, keeping it rooted
    /// across the allocation. Pops `b`.
    fn pair_with_top(&mut self, a: Value) -> Result<Value> {
        let t = self.new_tuple(2);
        let b = self.stack.pop().unwrap_or_default();
        let t = t?;
        let r = t.gc_ref().ok_or(VmError::StackUnderflow)?;
        tuple::set(&mut self.heap, r, 0, a)?;
        tuple::set(&mut self.heap, r, 1, b)?;
        Ok(t)
    }

    pub fn string_bytes(&self, v: Value) -> Result<&[u8]> {
        match v {
            Value::String(r) => Ok(string::bytes(&self.heap, r)?),
            other => Err(VmError::type_mismatch("string", other)),
        }
    }

    // =========================================================================
    // Mailbox
    // =========================================================================

    fn check_mailbox(&self, me: Pid) -> Result<()> {
        if self.mailbox.len() >= self.max_mailbox {
            return Err(VmError::MailboxFull(me));
        }
        Ok(())
    }

    /// Appends a deep copy of `msg`, which lives in `src`.
    pub fn deliver(&mut self, me: Pid, src: &Heap, msg: Value) -> Result<()> {
        self.check_mailbox(me)?;
        let msg = if msg.is_collectable() {
            self.reserve(copy::measure(src, msg)?)?;
            copy::copy_value(src, &mut self.heap, msg)?
        } else {
            msg
        };
        self.mailbox.push(msg);
        Ok(())
    }

    /// Self-send. `msg` belongs to this heap but is no longer rooted, so it
    /// is staged in a scratch heap before this heap may collect.
    pub fn deliver_local(&mut self, me: Pid, msg: Value) -> Result<()> {
        if !msg.is_collectable() {
            self.check_mailbox(me)?;
            self.mailbox.push(msg);
            return Ok(());
        }
        let need = copy::measure(&self.heap, msg)?;
        let mut scratch = Heap::new(need, need);
        let staged = copy::copy_value(&self.heap, &mut scratch, msg)?;
        self.deliver(me, &scratch, staged)
    }

    /// Appends a fresh string built from host bytes.
    pub fn deliver_bytes(&mut self, me: Pid, bytes: &[u8]) -> Result<()> {
        self.check_mailbox(me)?;
        let s = self.new_string(bytes)?;
        self.mailbox.push(s);
        Ok(())
    }

    // =========================================================================
    // Catch points
    // =========================================================================

    pub(crate) fn push_catch_point(&mut self, stack_height: usize) {
        self.catches.push(CatchPoint {
            frame_depth: self.frames.len(),
            stack_height,
        });
    }

    /// Called after every return. When the innermost protected call has just
    /// produced its result, wraps it as `(0, result)`. Protected calls nested
    /// directly inside one another finish together, so every catch point the
    /// result completes is settled, innermost first.
    pub(crate) fn settle_catch_point(&mut self) -> Result<()> {
        while self
            .catches
            .last()
            .is_some_and(|cp| cp.frame_depth > self.frames.len())
        {
            self.catches.pop();
        }
        while let Some(&cp) = self.catches.last() {
            if cp.frame_depth != self.frames.len() || cp.stack_height + 1 != self.stack.len() {
                break;
            }
            self.catches.pop();
            let t = self.pair_with_top(Value::Integer(0))?;
            self.stack.push(t);
        }
        Ok(())
    }

    /// Unwinds to the innermost catch point and leaves `(code, message)`
    /// there. Returns false when no catch point can take the error.
    pub(crate) fn recover(&mut self, err: &VmError) -> bool {
        let message = err.to_string();
        while let Some(cp) = self.catches.pop() {
            self.frames.truncate(cp.frame_depth);
            self.stack.truncate(cp.stack_height);
            self.pending_receive = None;
            let status = self
                .new_string(message.as_bytes())
                .and_then(|msg| {
                    self.stack.push(msg);
                    self.pair_with_top(Value::Integer(err.code()))
                });
            if let Ok(t) = status {
                self.stack.push(t);
                return true;
            }
        }
        false
    }
}
