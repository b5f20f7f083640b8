//! Several processes under one scheduler.

use std::cell::RefCell;
use std::rc::Rc;

use avm_common_core::{Chunk, Constant, Instruction, Prototype};
use avm_vm::{
    HostArg, Loader, ProcessState, RunState, Scheduler, SchedulerConfig, Value, ValueKind, VmError,
};
use pretty_assertions::assert_eq;

fn proto(symbol: &str, body: &[Instruction]) -> Prototype {
    let mut p = Prototype::new(symbol);
    for &ins in body {
        p.emit(ins);
    }
    p
}

fn scheduler(idx_bits: u8, funcs: Vec<Prototype>) -> Scheduler {
    let mut module = Prototype::new("main");
    for f in funcs {
        module.add_nested(f);
    }
    let mut loader = Loader::default();
    loader.load_chunk(Chunk::new(module)).unwrap();
    let config = SchedulerConfig {
        idx_bits,
        gen_bits: 4,
        ..SchedulerConfig::default()
    };
    Scheduler::new(config, loader).unwrap()
}

fn lsi(v: i32) -> Instruction {
    Instruction::lsi(v).unwrap()
}

fn llv(i: i32) -> Instruction {
    Instruction::llv(i).unwrap()
}

/// `nil; rcv 0`: take the next message, waiting as long as it takes.
fn recv() -> [Instruction; 2] {
    [Instruction::nil(), Instruction::rcv(0).unwrap()]
}

#[test]
fn test_mailbox_order_across_senders() {
    let mut target = Vec::new();
    target.extend(recv());
    target.push(Instruction::rwd());
    target.extend(recv());
    target.push(Instruction::rmv());
    for _ in 0..3 {
        target.extend(recv());
    }
    // park forever so the stack can be inspected
    target.extend(recv());

    let sender_a = [
        llv(-1), lsi(1), Instruction::snd(),
        llv(-1), lsi(2), Instruction::snd(),
        llv(-1), lsi(3), Instruction::snd(),
        Instruction::ret(),
    ];
    let sender_b = [llv(-1), lsi(4), Instruction::snd(), Instruction::ret()];

    let mut s = scheduler(
        4,
        vec![proto("t", &target), proto("a", &sender_a), proto("b", &sender_b)],
    );
    let t = s.spawn_export("main", "t", &[]).unwrap();
    s.spawn_export("main", "a", &[Value::Pid(t).into()]).unwrap();
    s.spawn_export("main", "b", &[Value::Pid(t).into()]).unwrap();

    assert_eq!(s.run(), RunState::Idle { next_deadline: None });
    assert_eq!(s.process_count(), 1);
    assert_eq!(s.state(t), Some(ProcessState::Waiting));
    let actor = s.processes().get(t).unwrap().actor();
    let ints: Vec<Value> = [1, 1, 2, 3, 4].into_iter().map(Value::Integer).collect();
    assert_eq!(actor.stack(), ints.as_slice());
    assert_eq!(actor.mailbox().len(), 3);
}

#[test]
fn test_stale_pid_after_slot_reuse() {
    let send_to_arg = [llv(-1), lsi(1), Instruction::snd(), Instruction::ret()];
    let mut s = scheduler(
        1,
        vec![proto("done", &[Instruction::ret()]), proto("poke", &send_to_arg)],
    );
    let codes = Rc::new(RefCell::new(Vec::new()));
    let log = codes.clone();
    s.on_panic(move |_, err| log.borrow_mut().push(err.code()));

    let a = s.spawn_export("main", "done", &[]).unwrap();
    let b = s.spawn_export("main", "done", &[]).unwrap();
    assert_eq!(
        s.spawn_export("main", "done", &[]),
        Err(VmError::ProcessTableFull)
    );
    assert_eq!(s.run(), RunState::Done);

    let c = s.spawn_export("main", "done", &[]).unwrap();
    let layout = s.processes().layout();
    assert_eq!(layout.index(c), layout.index(a));
    assert_eq!(layout.generation(c), layout.generation(a) + 1);
    assert!(!s.is_alive(a));
    assert!(s.is_alive(c));
    assert_eq!(s.send(a, Value::Integer(1)), Err(VmError::InvalidPid(a)));
    assert_eq!(s.send_str(a, "late"), Err(VmError::InvalidPid(a)));
    assert_eq!(s.kill(a), Err(VmError::InvalidPid(a)));

    let e = s.spawn_export("main", "poke", &[Value::Pid(a).into()]).unwrap();
    assert_eq!(layout.index(e), layout.index(b));
    assert_eq!(s.run(), RunState::Done);
    assert_eq!(*codes.borrow(), vec![-12]);
}

#[test]
fn test_spawn_passes_copied_arguments() {
    // child(parent, text): send text back to parent
    let child = proto("child", &[llv(-1), llv(-2), Instruction::snd(), Instruction::ret()]);

    let mut parent = Prototype::new("parent");
    let self_idx = parent.add_import("std", "self") as i32;
    let spawn_idx = parent.add_import("std", "spawn") as i32;
    let hi = parent.add_constant(Constant::String("hi".into())) as i32;
    parent.add_nested(child);
    for ins in [
        Instruction::ldk(hi).unwrap(),
        Instruction::imp(self_idx).unwrap(),
        Instruction::ivk(0).unwrap(),
        Instruction::cls(0).unwrap(),
        Instruction::imp(spawn_idx).unwrap(),
        Instruction::ivk(3).unwrap(),
    ] {
        parent.emit(ins);
    }
    for ins in recv().into_iter().chain(recv()) {
        parent.emit(ins);
    }

    let mut s = scheduler(4, vec![parent]);
    let p = s.spawn_export("main", "parent", &[]).unwrap();
    assert_eq!(s.run(), RunState::Idle { next_deadline: None });
    assert_eq!(s.process_count(), 1);

    let actor = s.processes().get(p).unwrap().actor();
    assert_eq!(actor.sp(), 2);
    assert_eq!(actor.stack()[0].kind(), ValueKind::Pid);
    assert_eq!(actor.string_bytes(actor.stack()[1]).unwrap(), b"hi");
}

#[test]
fn test_host_string_message() {
    let mut s = scheduler(4, vec![proto("echo", &recv())]);
    let p = s.spawn_export("main", "echo", &[HostArg::from("unused")]).unwrap();
    s.send_str(p, "ping").unwrap();
    assert_eq!(s.run(), RunState::Done);
    assert!(!s.is_alive(p));
}

#[test]
fn test_kill_from_bytecode() {
    let mut parent = Prototype::new("parent");
    let spawn_idx = parent.add_import("std", "spawn") as i32;
    let kill_idx = parent.add_import("std", "kill") as i32;
    parent.add_nested(proto("sleeper", &recv()));
    for ins in [
        Instruction::cls(0).unwrap(),
        Instruction::imp(spawn_idx).unwrap(),
        Instruction::ivk(1).unwrap(),
        Instruction::imp(kill_idx).unwrap(),
        Instruction::ivk(1).unwrap(),
        Instruction::ret(),
    ] {
        parent.emit(ins);
    }
    let mut s = scheduler(4, vec![parent]);
    s.spawn_export("main", "parent", &[]).unwrap();
    assert_eq!(s.run(), RunState::Done);
}

#[test]
fn test_yield_keeps_process_runnable() {
    let mut f = Prototype::new("f");
    let yield_idx = f.add_import("std", "yield") as i32;
    f.emit(Instruction::imp(yield_idx).unwrap());
    f.emit(Instruction::ivk(0).unwrap());
    f.emit(Instruction::ret());
    let mut s = scheduler(4, vec![f]);
    let p = s.spawn_export("main", "f", &[]).unwrap();
    assert_eq!(s.run_once(), RunState::Busy);
    assert_eq!(s.state(p), Some(ProcessState::Running));
    assert_eq!(s.run_once(), RunState::Done);
}
