//! Instruction-level behaviour, driven one step at a time.

use avm_common_core::{Chunk, Constant, Instruction, Prototype};
use avm_runtime::objects::tuple;
use avm_runtime::{FuncRef, Heap, Pid, Value, ValueKind};
use avm_vm::exec::call::invoke;
use avm_vm::vm::{execute, step};
use avm_vm::{Actor, ActorConfig, ExecResult, Kernel, Loader, VmError};
use pretty_assertions::assert_eq;

/// A process with nobody else around.
struct Alone(Pid);

impl Kernel for Alone {
    fn self_pid(&self) -> Pid {
        self.0
    }

    fn send(&mut self, target: Pid, _: Value, _: &Heap) -> Result<(), VmError> {
        Err(VmError::InvalidPid(target))
    }

    fn spawn(&mut self, _: Value, _: &[Value], _: &Heap) -> Result<Pid, VmError> {
        Err(VmError::ProcessTableFull)
    }

    fn kill(&mut self, target: Pid) -> Result<(), VmError> {
        Err(VmError::InvalidPid(target))
    }
}

const ME: Pid = Pid::from_raw(1);

fn load(module: Prototype) -> Loader {
    let mut loader = Loader::default();
    loader.load_chunk(Chunk::new(module)).unwrap();
    loader
}

/// An actor with the module body of chunk 0 entered but not yet stepped.
fn enter(loader: &Loader) -> Actor {
    enter_with(loader, &ActorConfig::default())
}

fn enter_with(loader: &Loader, config: &ActorConfig) -> Actor {
    let mut actor = Actor::new(config);
    actor
        .push(Value::ByteCodeFunc(FuncRef { chunk: 0, proto: 0 }))
        .unwrap();
    invoke(&mut actor, 0, loader, &mut Alone(ME)).unwrap();
    actor
}

fn steps(actor: &mut Actor, loader: &Loader, n: usize) {
    for _ in 0..n {
        assert_eq!(step(actor, loader, &mut Alone(ME)), Ok(ExecResult::Continue));
    }
}

#[test]
fn test_pushes_then_pop_restore_sp() {
    let sequences: Vec<Vec<Instruction>> = vec![
        vec![Instruction::lsi(1).unwrap()],
        vec![Instruction::nil(), Instruction::ldb(true), Instruction::lsi(-8388608).unwrap()],
        vec![
            Instruction::ldk(0).unwrap(),
            Instruction::ldk(1).unwrap(),
            Instruction::lsi(8388607).unwrap(),
            Instruction::ldb(false),
            Instruction::nil(),
        ],
    ];
    for seq in sequences {
        let mut module = Prototype::new("m");
        module.add_constant(Constant::Integer(1 << 40));
        module.add_constant(Constant::String("pushed".into()));
        module.emit(Instruction::lsi(99).unwrap());
        for &ins in &seq {
            module.emit(ins);
        }
        module.emit(Instruction::pop(seq.len() as i32).unwrap());
        let loader = load(module);
        let mut actor = enter(&loader);

        steps(&mut actor, &loader, 1);
        let before = actor.sp();
        steps(&mut actor, &loader, seq.len());
        assert_eq!(actor.sp(), before + seq.len());
        steps(&mut actor, &loader, 1);
        assert_eq!(actor.sp(), before);
        assert_eq!(actor.top(), Some(Value::Integer(99)));
    }
}

#[test]
fn test_invoke_then_return_leaves_nil() {
    let mut callee = Prototype::new("callee");
    callee.emit(Instruction::ret());
    let mut module = Prototype::new("m");
    module.add_nested(callee);
    // push arg, push callee, ivk 1
    module.emit(Instruction::lsi(7).unwrap());
    module.emit(Instruction::cls(0).unwrap());
    module.emit(Instruction::ivk(1).unwrap());
    module.emit(Instruction::nop());
    let loader = load(module);
    let mut actor = enter(&loader);

    let caller = *actor.frames().last().unwrap();
    let sp = actor.sp();
    steps(&mut actor, &loader, 3);
    assert_eq!(actor.frames().len(), 2);
    assert_eq!(actor.bp(), sp + 1);
    assert_eq!(actor.load_local(-1), Value::Integer(7));

    steps(&mut actor, &loader, 1);
    assert_eq!(actor.frames().len(), 1);
    assert_eq!(actor.sp(), sp + 1);
    assert_eq!(actor.top(), Some(Value::Nil));
    let restored = *actor.frames().last().unwrap();
    assert_eq!(restored.bp, caller.bp);
    assert_eq!(restored.ip, 3);
}

#[test]
fn test_return_value_replaces_arguments() {
    let mut module = Prototype::new("m");
    let mut add = Prototype::new("second");
    add.emit(Instruction::llv(-2).unwrap());
    add.emit(Instruction::ret());
    module.add_nested(add);
    module.emit(Instruction::lsi(2).unwrap());
    module.emit(Instruction::lsi(1).unwrap());
    module.emit(Instruction::cls(0).unwrap());
    module.emit(Instruction::ivk(2).unwrap());
    let loader = load(module);
    let mut actor = enter(&loader);
    assert_eq!(execute(&mut actor, &loader, &mut Alone(ME)), ExecResult::Done);
    assert_eq!(actor.stack(), &[Value::Integer(2)]);
}

#[test]
fn test_zero_timeout_receive_jumps() {
    let mut module = Prototype::new("m");
    module.emit(Instruction::lsi(0).unwrap());
    module.emit(Instruction::rcv(1).unwrap());
    module.emit(Instruction::lsi(1).unwrap());
    module.emit(Instruction::lsi(2).unwrap());
    let loader = load(module);
    let mut actor = enter(&loader);
    steps(&mut actor, &loader, 3);
    assert_eq!(actor.top(), Some(Value::Integer(2)));
    assert_eq!(actor.sp(), 1);
}

#[test]
fn test_indefinite_receive_blocks_until_message() {
    let mut module = Prototype::new("m");
    module.emit(Instruction::nil());
    module.emit(Instruction::rcv(1).unwrap());
    module.emit(Instruction::ret());
    module.emit(Instruction::lsi(-1).unwrap());
    let loader = load(module);
    let mut actor = enter(&loader);

    assert_eq!(execute(&mut actor, &loader, &mut Alone(ME)), ExecResult::Block(None));
    assert_eq!(actor.sp(), 0);
    actor.deliver_local(ME, Value::Integer(42)).unwrap();
    assert_eq!(execute(&mut actor, &loader, &mut Alone(ME)), ExecResult::Done);
    assert_eq!(actor.stack(), &[Value::Integer(42)]);
    assert_eq!(actor.mailbox().cursor(), 1);
}

#[test]
fn test_rewind_and_remove_are_distinct() {
    // rcv; rwd; rcv; rmv; rcv; rcv; rcv
    let mut module = Prototype::new("m");
    for ins in [
        Instruction::lsi(0).unwrap(),
        Instruction::rcv(0).unwrap(),
        Instruction::rwd(),
        Instruction::lsi(0).unwrap(),
        Instruction::rcv(0).unwrap(),
        Instruction::rmv(),
        Instruction::lsi(0).unwrap(),
        Instruction::rcv(0).unwrap(),
        // drain the last message, then park so the stack survives
        Instruction::nil(),
        Instruction::rcv(0).unwrap(),
        Instruction::nil(),
        Instruction::rcv(0).unwrap(),
    ] {
        module.emit(ins);
    }
    let loader = load(module);
    let mut actor = enter(&loader);
    for i in 1..=3 {
        actor.deliver_local(ME, Value::Integer(i)).unwrap();
    }
    assert_eq!(execute(&mut actor, &loader, &mut Alone(ME)), ExecResult::Block(None));
    assert_eq!(
        actor.stack(),
        &[
            Value::Integer(1),
            Value::Integer(1),
            Value::Integer(2),
            Value::Integer(3)
        ]
    );
    assert_eq!(actor.mailbox().len(), 2);
    assert_eq!(actor.mailbox().cursor(), 2);
}

#[test]
fn test_remove_without_peek_fails() {
    let mut module = Prototype::new("m");
    module.emit(Instruction::rmv());
    let loader = load(module);
    let mut actor = enter(&loader);
    assert_eq!(step(&mut actor, &loader, &mut Alone(ME)), Err(VmError::NothingPeeked));
}

#[test]
fn test_self_send_copies_into_own_mailbox() {
    let mut module = Prototype::new("m");
    let self_idx = module.add_import("std", "self") as i32;
    module.add_constant(Constant::String("note".into()));
    module.emit(Instruction::imp(self_idx).unwrap());
    module.emit(Instruction::ivk(0).unwrap());
    module.emit(Instruction::ldk(0).unwrap());
    module.emit(Instruction::snd());
    module.emit(Instruction::lsi(0).unwrap());
    module.emit(Instruction::rcv(0).unwrap());
    let loader = load(module);
    let mut actor = enter(&loader);
    assert_eq!(execute(&mut actor, &loader, &mut Alone(ME)), ExecResult::Done);
    let msg = actor.top().unwrap();
    assert_eq!(actor.string_bytes(msg).unwrap(), b"note");
}

#[test]
fn test_bad_jump_and_opcode() {
    let mut module = Prototype::new("m");
    module.emit(Instruction::jmp(5).unwrap());
    let loader = load(module);
    let mut actor = enter(&loader);
    assert_eq!(
        step(&mut actor, &loader, &mut Alone(ME)),
        Err(VmError::InvalidJump { target: 6, len: 1 })
    );

    let mut module = Prototype::new("m");
    module.emit(Instruction::from_raw(0xff));
    let loader = load(module);
    let mut actor = enter(&loader);
    assert_eq!(step(&mut actor, &loader, &mut Alone(ME)), Err(VmError::InvalidOpcode(0xff)));
}

fn pair(actor: &Actor) -> (Value, Value) {
    let t = actor.top().unwrap();
    assert_eq!(t.kind(), ValueKind::Tuple);
    let r = t.gc_ref().unwrap();
    (
        tuple::get(actor.heap(), r, 0).unwrap(),
        tuple::get(actor.heap(), r, 1).unwrap(),
    )
}

#[test]
fn test_try_catches_raised_error() {
    let mut module = Prototype::new("m");
    let try_idx = module.add_import("std", "try") as i32;
    let error_idx = module.add_import("std", "error") as i32;
    module.add_constant(Constant::String("boom".into()));
    module.emit(Instruction::ldk(0).unwrap());
    module.emit(Instruction::imp(error_idx).unwrap());
    module.emit(Instruction::imp(try_idx).unwrap());
    module.emit(Instruction::ivk(2).unwrap());
    let loader = load(module);
    let mut actor = enter(&loader);
    assert_eq!(execute(&mut actor, &loader, &mut Alone(ME)), ExecResult::Done);
    assert_eq!(actor.sp(), 1);
    let (code, msg) = pair(&actor);
    assert_eq!(code, Value::Integer(-1));
    assert_eq!(actor.string_bytes(msg).unwrap(), b"boom");
    assert!(actor.catch_points().is_empty());
}

#[test]
fn test_try_wraps_success() {
    let mut module = Prototype::new("m");
    let try_idx = module.add_import("std", "try") as i32;
    let mut body = Prototype::new("five");
    body.emit(Instruction::lsi(5).unwrap());
    body.emit(Instruction::ret());
    module.add_nested(body);
    module.emit(Instruction::cls(0).unwrap());
    module.emit(Instruction::imp(try_idx).unwrap());
    module.emit(Instruction::ivk(1).unwrap());
    let loader = load(module);
    let mut actor = enter(&loader);
    assert_eq!(execute(&mut actor, &loader, &mut Alone(ME)), ExecResult::Done);
    assert_eq!(pair(&actor), (Value::Integer(0), Value::Integer(5)));
}

#[test]
fn test_uncaught_error_panics() {
    let mut module = Prototype::new("m");
    module.emit(Instruction::pop(1).unwrap());
    let loader = load(module);
    let mut actor = enter(&loader);
    assert_eq!(
        execute(&mut actor, &loader, &mut Alone(ME)),
        ExecResult::Panic(VmError::StackUnderflow)
    );
}

/// Emits `imp lib.name; ivk nargs`.
fn call(p: &mut Prototype, lib: &str, name: &str, nargs: i32) {
    let idx = p.add_import(lib, name) as i32;
    p.emit(Instruction::imp(idx).unwrap());
    p.emit(Instruction::ivk(nargs).unwrap());
}

fn ldk_str(p: &mut Prototype, s: &str) {
    let idx = p.add_constant(Constant::String(s.into())) as i32;
    p.emit(Instruction::ldk(idx).unwrap());
}

#[test]
fn test_collection_library() {
    let mut p = Prototype::new("m");
    // local 0: array grown past its first backing store
    call(&mut p, "array", "new", 0);
    for i in 0..6 {
        p.emit(Instruction::lsi(10 + i).unwrap());
        p.emit(Instruction::llv(0).unwrap());
        call(&mut p, "array", "push", 2);
        p.emit(Instruction::pop(1).unwrap());
    }
    p.emit(Instruction::llv(0).unwrap());
    call(&mut p, "array", "len", 1);
    p.emit(Instruction::lsi(5).unwrap());
    p.emit(Instruction::llv(0).unwrap());
    call(&mut p, "array", "get", 2);

    // local 3: table with string keys
    call(&mut p, "table", "new", 0);
    for i in 0..5 {
        p.emit(Instruction::lsi(i).unwrap());
        ldk_str(&mut p, &format!("k{i}"));
        p.emit(Instruction::llv(3).unwrap());
        call(&mut p, "table", "set", 3);
        p.emit(Instruction::pop(1).unwrap());
    }
    p.emit(Instruction::lsi(99).unwrap());
    ldk_str(&mut p, "k2");
    p.emit(Instruction::llv(3).unwrap());
    call(&mut p, "table", "set", 3);
    p.emit(Instruction::pop(1).unwrap());
    ldk_str(&mut p, "k2");
    p.emit(Instruction::llv(3).unwrap());
    call(&mut p, "table", "get", 2);
    p.emit(Instruction::llv(3).unwrap());
    call(&mut p, "table", "len", 1);
    ldk_str(&mut p, "missing");
    p.emit(Instruction::llv(3).unwrap());
    call(&mut p, "table", "get", 2);

    ldk_str(&mut p, "cd");
    ldk_str(&mut p, "ab");
    call(&mut p, "string", "concat", 2);
    call(&mut p, "string", "len", 1);

    // park so the stack survives
    p.emit(Instruction::nil());
    p.emit(Instruction::rcv(0).unwrap());

    let loader = load(p);
    let mut actor = enter(&loader);
    assert_eq!(execute(&mut actor, &loader, &mut Alone(ME)), ExecResult::Block(None));
    let stack = actor.stack();
    assert_eq!(stack[0].kind(), ValueKind::Array);
    assert_eq!(stack[3].kind(), ValueKind::Table);
    let rest: Vec<Value> = [1usize, 2, 4, 5, 6, 7].iter().map(|&i| stack[i]).collect();
    assert_eq!(
        rest,
        vec![
            Value::Integer(6),
            Value::Integer(15),
            Value::Integer(99),
            Value::Integer(5),
            Value::Nil,
            Value::Integer(4),
        ]
    );
}

#[test]
fn test_collection_errors_are_catchable() {
    // try(tuple.get, tuple.new(1), 3)
    let mut p = Prototype::new("m");
    p.emit(Instruction::lsi(3).unwrap());
    p.emit(Instruction::lsi(1).unwrap());
    call(&mut p, "tuple", "new", 1);
    let get = p.add_import("tuple", "get") as i32;
    p.emit(Instruction::imp(get).unwrap());
    call(&mut p, "std", "try", 3);
    let loader = load(p);
    let mut actor = enter(&loader);
    assert_eq!(execute(&mut actor, &loader, &mut Alone(ME)), ExecResult::Done);
    let (code, _) = pair(&actor);
    assert_eq!(code, Value::Integer(-3));
}

fn inner_pair(actor: &Actor, outer: Value) -> (Value, Value) {
    assert_eq!(outer.kind(), ValueKind::Tuple);
    let r = outer.gc_ref().unwrap();
    (
        tuple::get(actor.heap(), r, 0).unwrap(),
        tuple::get(actor.heap(), r, 1).unwrap(),
    )
}

#[test]
fn test_nested_try_wraps_twice() {
    // try(try, self) then try(try, five)
    let mut p = Prototype::new("m");
    let mut body = Prototype::new("five");
    body.emit(Instruction::lsi(5).unwrap());
    body.emit(Instruction::ret());
    p.add_nested(body);
    let self_idx = p.add_import("std", "self") as i32;
    let try_idx = p.add_import("std", "try") as i32;
    p.emit(Instruction::imp(self_idx).unwrap());
    p.emit(Instruction::imp(try_idx).unwrap());
    call(&mut p, "std", "try", 2);
    p.emit(Instruction::cls(0).unwrap());
    p.emit(Instruction::imp(try_idx).unwrap());
    call(&mut p, "std", "try", 2);
    p.emit(Instruction::nil());
    p.emit(Instruction::rcv(0).unwrap());
    let loader = load(p);
    let mut actor = enter(&loader);
    assert_eq!(execute(&mut actor, &loader, &mut Alone(ME)), ExecResult::Block(None));
    assert!(actor.catch_points().is_empty());
    assert_eq!(actor.sp(), 2);

    let stack = actor.stack().to_vec();
    for (slot, expected) in [(0, Value::Pid(ME)), (1, Value::Integer(5))] {
        let (code, inner) = inner_pair(&actor, stack[slot]);
        assert_eq!(code, Value::Integer(0));
        assert_eq!(inner_pair(&actor, inner), (Value::Integer(0), expected));
    }
}

#[test]
fn test_error_after_nested_try_panics() {
    let mut p = Prototype::new("m");
    let self_idx = p.add_import("std", "self") as i32;
    let try_idx = p.add_import("std", "try") as i32;
    p.emit(Instruction::imp(self_idx).unwrap());
    p.emit(Instruction::imp(try_idx).unwrap());
    call(&mut p, "std", "try", 2);
    p.emit(Instruction::pop(1).unwrap());
    ldk_str(&mut p, "late");
    call(&mut p, "std", "error", 1);
    let loader = load(p);
    let mut actor = enter(&loader);
    assert_eq!(
        execute(&mut actor, &loader, &mut Alone(ME)),
        ExecResult::Panic(VmError::Raised("late".into()))
    );
}

#[test]
fn test_out_of_memory_is_catchable() {
    // try(tuple.new, 100000) on a heap capped at 1 KiB
    let mut p = Prototype::new("m");
    p.emit(Instruction::lsi(100000).unwrap());
    let new = p.add_import("tuple", "new") as i32;
    p.emit(Instruction::imp(new).unwrap());
    call(&mut p, "std", "try", 2);
    let loader = load(p);
    let config = ActorConfig {
        initial_heap: 256,
        max_heap: 1024,
        ..ActorConfig::default()
    };
    let mut actor = enter_with(&loader, &config);
    assert_eq!(execute(&mut actor, &loader, &mut Alone(ME)), ExecResult::Done);
    let (code, msg) = pair(&actor);
    assert_eq!(code, Value::Integer(-2));
    assert_eq!(msg.kind(), ValueKind::String);
    assert!(actor.heap().capacity() <= 1024);
}
