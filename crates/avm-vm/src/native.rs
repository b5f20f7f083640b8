//! Native (host) functions callable from bytecode.
//!
//! Natives are plain function pointers registered under a `(module, name)`
//! pair. Imports naming a registered pair resolve to a native-function
//! value; invoking it runs the function without pushing a frame.

use hashbrown::HashMap;

use avm_runtime::{GcRef, Heap, NativeId, Pid, Value, ValueKind};

use crate::actor::Actor;
use crate::error::{Result, VmError};
use crate::vm::Kernel;

pub type NativeFn = fn(&mut NativeCtx<'_>) -> Result<NativeFlow>;

/// What the interpreter does once a native returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeFlow {
    /// Replace the arguments with the result and continue.
    Return,
    /// Return, then suspend the process until its next turn.
    Yield,
    /// Return, then terminate the process.
    Exit,
    /// Instead of returning, invoke the value on top of the stack with the
    /// `nargs` values below it as arguments.
    Call { nargs: usize },
}

/// A native's view of the calling process.
///
/// Arguments stay on the operand stack for the whole call, so they are
/// rooted and re-reading them after an allocation yields current refs. A
/// result set before an allocation is not rooted: set it last.
pub struct NativeCtx<'a> {
    actor: &'a mut Actor,
    kernel: &'a mut (dyn Kernel + 'a),
    base: usize,
    nargs: usize,
    result: Value,
}

impl<'a> NativeCtx<'a> {
    pub(crate) fn new(actor: &'a mut Actor, kernel: &'a mut (dyn Kernel + 'a), nargs: usize) -> Self {
        let base = actor.sp();
        Self {
            actor,
            kernel,
            base,
            nargs,
            result: Value::Nil,
        }
    }

    #[inline]
    pub fn nargs(&self) -> usize {
        self.nargs
    }

    /// Argument `i` in parameter order; nil when not supplied.
    pub fn arg(&self, i: usize) -> Value {
        if i >= self.nargs {
            return Value::Nil;
        }
        self.actor.stack()[self.base - 1 - i]
    }

    /// Arguments `from..` in parameter order.
    pub fn args_from(&self, from: usize) -> Vec<Value> {
        (from..self.nargs).map(|i| self.arg(i)).collect()
    }

    pub fn expect_args(&self, n: usize) -> Result<()> {
        if self.nargs < n {
            return Err(VmError::Arity {
                expected: n,
                got: self.nargs,
            });
        }
        Ok(())
    }

    pub fn arg_integer(&self, i: usize) -> Result<i64> {
        let v = self.arg(i);
        v.as_integer()
            .ok_or_else(|| VmError::type_mismatch("integer", v))
    }

    pub fn arg_pid(&self, i: usize) -> Result<Pid> {
        let v = self.arg(i);
        v.as_pid().ok_or_else(|| VmError::type_mismatch("pid", v))
    }

    /// Heap reference of argument `i`, which must be of `kind`.
    pub fn arg_ref(&self, i: usize, kind: ValueKind) -> Result<GcRef> {
        let v = self.arg(i);
        match v.gc_ref() {
            Some(r) if v.kind() == kind => Ok(r),
            _ => Err(VmError::TypeMismatch {
                expected: kind_name(kind),
                found: v.kind(),
            }),
        }
    }

    pub fn set_result(&mut self, v: Value) {
        self.result = v;
    }

    #[inline]
    pub fn actor(&self) -> &Actor {
        &*self.actor
    }

    #[inline]
    pub fn actor_mut(&mut self) -> &mut Actor {
        &mut *self.actor
    }

    #[inline]
    pub fn heap(&self) -> &Heap {
        self.actor.heap()
    }

    #[inline]
    pub(crate) fn heap_mut(&mut self) -> &mut Heap {
        &mut self.actor.heap
    }

    pub fn self_pid(&self) -> Pid {
        self.kernel.self_pid()
    }

    /// Split borrow for operations that read this heap while acting on
    /// other processes.
    pub fn kernel_and_heap(&mut self) -> (&mut (dyn Kernel + 'a), &Heap) {
        (&mut *self.kernel, &self.actor.heap)
    }

    /// Makes the call this native is about to hand off with
    /// [`NativeFlow::Call`] a protected one.
    pub fn protect(&mut self) {
        self.actor.push_catch_point(self.base - self.nargs);
    }

    pub(crate) fn into_result(self) -> Value {
        self.result
    }
}

fn kind_name(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::String => "string",
        ValueKind::Tuple => "tuple",
        ValueKind::Array => "array",
        ValueKind::Table => "table",
        _ => "collectable",
    }
}

pub struct NativeEntry {
    pub module: String,
    pub name: String,
    pub func: NativeFn,
}

/// Flat `(module, name)` table of natives.
#[derive(Default)]
pub struct NativeRegistry {
    entries: Vec<NativeEntry>,
    index: HashMap<(String, String), NativeId>,
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the builtin libraries.
    pub fn with_stdlib() -> Self {
        let mut registry = Self::new();
        crate::stdlib::register(&mut registry);
        registry
    }

    /// Registers `func`, replacing any earlier binding of the same name.
    pub fn register(&mut self, module: &str, name: &str, func: NativeFn) -> NativeId {
        let key = (module.to_owned(), name.to_owned());
        if let Some(&id) = self.index.get(&key) {
            self.entries[id.0 as usize].func = func;
            return id;
        }
        let id = NativeId(self.entries.len() as u32);
        self.entries.push(NativeEntry {
            module: key.0.clone(),
            name: key.1.clone(),
            func,
        });
        self.index.insert(key, id);
        id
    }

    pub fn register_lib(&mut self, module: &str, funcs: &[(&str, NativeFn)]) {
        for &(name, func) in funcs {
            self.register(module, name, func);
        }
    }

    pub fn lookup(&self, module: &str, name: &str) -> Option<NativeId> {
        self.index
            .get(&(module.to_owned(), name.to_owned()))
            .copied()
    }

    pub fn get(&self, id: NativeId) -> Option<&NativeEntry> {
        self.entries.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
