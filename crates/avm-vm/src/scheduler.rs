//! Cooperative scheduler.
//!
//! One host thread resumes processes round-robin. A process keeps the
//! thread until it yields, blocks in a receive, exits or panics. A timed
//! receive gets an absolute deadline on the scheduler's own timeline, taken
//! when the process suspends. Between rotations that timeline is advanced
//! and waiters whose message arrived or whose deadline passed rejoin the
//! rotation.

use std::collections::VecDeque;

use avm_runtime::gc::alloc_size;
use avm_runtime::objects::string;
use avm_runtime::{Heap, Pid, Value, ValueKind};
use tracing::{debug, error, trace};

use crate::clock::{Clock, MonotonicClock};
use crate::config::SchedulerConfig;
use crate::error::{ConfigError, Result, VmError};
use crate::loader::Loader;
use crate::process::{ProcessState, ProcessTable};
use crate::vm::{self, ExecResult, Kernel};

/// Outcome of one rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Something is ready to run.
    Busy,
    /// Every live process is blocked. `next_deadline` is the shortest
    /// remaining receive timeout; `None` means nothing will ever wake
    /// without outside help.
    Idle { next_deadline: Option<u64> },
    /// No live processes.
    Done,
}

/// An argument supplied by the host. Strings are allocated in the new
/// process's heap; values must be inline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostArg<'a> {
    Value(Value),
    Str(&'a str),
}

impl From<Value> for HostArg<'_> {
    fn from(v: Value) -> Self {
        HostArg::Value(v)
    }
}

impl From<i64> for HostArg<'_> {
    fn from(i: i64) -> Self {
        HostArg::Value(Value::Integer(i))
    }
}

impl<'a> From<&'a str> for HostArg<'a> {
    fn from(s: &'a str) -> Self {
        HostArg::Str(s)
    }
}

pub type PanicHandler = Box<dyn FnMut(Pid, &VmError)>;

/// Kernel seen by the process being resumed. The process itself is checked
/// out of the table, so everything here reaches other processes only.
struct Dispatch<'a> {
    table: &'a mut ProcessTable,
    current: Pid,
}

impl Kernel for Dispatch<'_> {
    fn self_pid(&self) -> Pid {
        self.current
    }

    fn send(&mut self, target: Pid, msg: Value, from: &Heap) -> Result<()> {
        self.table.deliver(target, Some(from), msg)
    }

    fn spawn(&mut self, callee: Value, args: &[Value], from: &Heap) -> Result<Pid> {
        self.table.spawn(callee, args, Some(from))
    }

    fn kill(&mut self, target: Pid) -> Result<()> {
        self.table.kill(target)
    }
}

pub struct Scheduler {
    loader: Loader,
    table: ProcessTable,
    running: VecDeque<Pid>,
    waiting: Vec<Pid>,
    dead: Vec<Pid>,
    clock: Box<dyn Clock>,
    /// Microseconds of clock time observed so far.
    now: u64,
    on_panic: PanicHandler,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, loader: Loader) -> Result<Self, ConfigError> {
        let layout = config.validate()?;
        Ok(Self {
            loader,
            table: ProcessTable::new(layout, config.actor),
            running: VecDeque::new(),
            waiting: Vec::new(),
            dead: Vec::new(),
            clock: Box::new(MonotonicClock::new()),
            now: 0,
            on_panic: Box::new(|pid, err| {
                error!(%pid, code = err.code(), error = %err, "process panicked");
            }),
        })
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Replaces the handler invoked when a process dies of an uncaught
    /// error. Other processes keep running after it returns.
    pub fn on_panic(&mut self, handler: impl FnMut(Pid, &VmError) + 'static) {
        self.on_panic = Box::new(handler);
    }

    #[inline]
    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    #[inline]
    pub fn loader_mut(&mut self) -> &mut Loader {
        &mut self.loader
    }

    #[inline]
    pub fn processes(&self) -> &ProcessTable {
        &self.table
    }

    /// Live processes, including dead ones not yet reaped.
    #[inline]
    pub fn process_count(&self) -> usize {
        self.table.live_count()
    }

    // =========================================================================
    // Host API
    // =========================================================================

    pub fn spawn(&mut self, callee: Value, args: &[HostArg<'_>]) -> Result<Pid> {
        let mut need = 0;
        for arg in args {
            match *arg {
                HostArg::Str(s) => need += alloc_size(string::payload_size(s.len())),
                HostArg::Value(v) if v.is_collectable() => {
                    return Err(VmError::type_mismatch("inline value", v))
                }
                HostArg::Value(_) => {}
            }
        }
        if need == 0 {
            let values: Vec<Value> = args
                .iter()
                .map(|arg| match *arg {
                    HostArg::Value(v) => v,
                    HostArg::Str(_) => Value::Nil,
                })
                .collect();
            return self.table.spawn(callee, &values, None);
        }

        let mut staging = Heap::new(need, need);
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(match *arg {
                HostArg::Value(v) => v,
                HostArg::Str(s) => {
                    let r = staging.try_alloc(ValueKind::String, string::payload_size(s.len()))?;
                    string::init(&mut staging, r, s.as_bytes())?;
                    Value::String(r)
                }
            });
        }
        self.table.spawn(callee, &values, Some(&staging))
    }

    /// Spawns the prototype `module` exports as `name`.
    pub fn spawn_export(&mut self, module: &str, name: &str, args: &[HostArg<'_>]) -> Result<Pid> {
        let func = self
            .loader
            .find(module, name)
            .ok_or_else(|| VmError::UnknownExport {
                module: module.to_owned(),
                name: name.to_owned(),
            })?;
        self.spawn(Value::ByteCodeFunc(func), args)
    }

    /// Sends an inline value from the host.
    pub fn send(&mut self, target: Pid, msg: Value) -> Result<()> {
        self.table.deliver(target, None, msg)
    }

    pub fn send_str(&mut self, target: Pid, msg: &str) -> Result<()> {
        self.table.deliver_bytes(target, msg.as_bytes())
    }

    /// The target exits at its next suspension point.
    pub fn kill(&mut self, target: Pid) -> Result<()> {
        self.table.kill(target)
    }

    pub fn is_alive(&self, pid: Pid) -> bool {
        self.table.is_alive(pid)
    }

    pub fn state(&self, pid: Pid) -> Option<ProcessState> {
        self.table.get(pid).ok().map(|p| p.state())
    }

    // =========================================================================
    // Run loop
    // =========================================================================

    /// Runs until no process can make progress.
    pub fn run(&mut self) -> RunState {
        loop {
            match self.run_once() {
                RunState::Busy => {}
                RunState::Idle {
                    next_deadline: Some(usecs),
                } => self.clock.sleep(usecs),
                state => return state,
            }
        }
    }

    /// Admits new processes, resumes every ready process once, then
    /// services timers and reaps the dead.
    pub fn run_once(&mut self) -> RunState {
        while let Some(pid) = self.table.pending.pop_front() {
            if let Ok(process) = self.table.get_mut(pid) {
                process.state = ProcessState::Running;
                self.running.push_back(pid);
            }
        }

        for _ in 0..self.running.len() {
            let Some(pid) = self.running.pop_front() else {
                break;
            };
            match self.resume(pid) {
                Some(ProcessState::Running) => self.running.push_back(pid),
                Some(ProcessState::Waiting) => self.waiting.push(pid),
                Some(ProcessState::Dead) => self.dead.push(pid),
                Some(ProcessState::Pending) | None => {}
            }
        }

        self.advance_timers();
        for pid in self.dead.drain(..) {
            self.table.release(pid);
        }

        if self.table.live_count() == 0 {
            RunState::Done
        } else if !self.running.is_empty() || !self.table.pending.is_empty() {
            RunState::Busy
        } else {
            let next_deadline = self
                .waiting
                .iter()
                .filter_map(|&pid| self.table.get(pid).ok()?.deadline)
                .min()
                .map(|deadline| deadline.saturating_sub(self.now));
            RunState::Idle { next_deadline }
        }
    }

    fn resume(&mut self, pid: Pid) -> Option<ProcessState> {
        let mut process = self.table.checkout(pid)?;
        let result = if process.exit_requested {
            ExecResult::Exit
        } else {
            let mut kernel = Dispatch {
                table: &mut self.table,
                current: pid,
            };
            vm::execute(&mut process.actor, &self.loader, &mut kernel)
        };
        trace!(%pid, ?result, "quantum ended");

        process.state = match result {
            ExecResult::Continue | ExecResult::Yield => ProcessState::Running,
            ExecResult::Block(timeout) => {
                process.deadline = timeout.map(|usecs| self.tick().saturating_add(usecs));
                process.wake = false;
                ProcessState::Waiting
            }
            ExecResult::Exit | ExecResult::Done => {
                debug!(%pid, "process exited");
                ProcessState::Dead
            }
            ExecResult::Panic(err) => {
                (self.on_panic)(pid, &err);
                ProcessState::Dead
            }
        };
        let state = process.state;
        self.table.checkin(process);
        Some(state)
    }

    /// Moves the scheduler timeline up to the clock and returns it.
    fn tick(&mut self) -> u64 {
        self.now = self.now.saturating_add(self.clock.delta_usecs());
        self.now
    }

    fn advance_timers(&mut self) {
        let now = self.tick();
        let mut still = Vec::with_capacity(self.waiting.len());
        for pid in std::mem::take(&mut self.waiting) {
            let Ok(process) = self.table.get_mut(pid) else {
                continue;
            };
            let ready = process.wake
                || process.exit_requested
                || process.deadline.is_some_and(|deadline| now >= deadline);
            if ready {
                process.state = ProcessState::Running;
                process.wake = false;
                process.deadline = None;
                self.running.push_back(pid);
            } else {
                still.push(pid);
            }
        }
        self.waiting = still;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::native::{NativeCtx, NativeFlow};
    use avm_common_core::{Chunk, Instruction, Prototype};
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Loads a chunk whose module exports one prototype per entry of
    /// `bodies`, named `f0`, `f1`, ...
    fn scheduler(bodies: Vec<Vec<Instruction>>, imports: &[(&str, &str)]) -> Scheduler {
        scheduler_with(Loader::default(), bodies, imports)
    }

    fn scheduler_with(
        mut loader: Loader,
        bodies: Vec<Vec<Instruction>>,
        imports: &[(&str, &str)],
    ) -> Scheduler {
        let mut module = Prototype::new("main");
        for (i, body) in bodies.into_iter().enumerate() {
            let mut p = Prototype::new(&format!("f{i}"));
            for &(m, n) in imports {
                p.add_import(m, n);
            }
            for ins in body {
                p.emit(ins);
            }
            module.add_nested(p);
        }
        loader.load_chunk(Chunk::new(module)).unwrap();
        let config = SchedulerConfig {
            idx_bits: 4,
            gen_bits: 4,
            ..SchedulerConfig::default()
        };
        Scheduler::new(config, loader).unwrap()
    }

    #[test]
    fn test_runs_to_done() {
        let mut s = scheduler(vec![vec![Instruction::lsi(1).unwrap(), Instruction::ret()]], &[]);
        let pid = s.spawn_export("main", "f0", &[]).unwrap();
        assert!(s.is_alive(pid));
        assert_eq!(s.run(), RunState::Done);
        assert!(!s.is_alive(pid));
        assert_eq!(s.process_count(), 0);
    }

    #[test]
    fn test_unknown_export() {
        let mut s = scheduler(vec![], &[]);
        assert_eq!(
            s.spawn_export("main", "nope", &[]),
            Err(VmError::UnknownExport {
                module: "main".into(),
                name: "nope".into()
            })
        );
    }

    #[test]
    fn test_blocked_forever_is_idle() {
        // rcv nil; ret
        let mut s = scheduler(
            vec![vec![Instruction::nil(), Instruction::rcv(0).unwrap(), Instruction::ret()]],
            &[],
        );
        let pid = s.spawn_export("main", "f0", &[]).unwrap();
        assert_eq!(s.run(), RunState::Idle { next_deadline: None });
        assert_eq!(s.state(pid), Some(ProcessState::Waiting));

        s.send(pid, Value::Integer(9)).unwrap();
        assert_eq!(s.run(), RunState::Done);
    }

    #[test]
    fn test_timed_receive_falls_through() {
        // rcv 500us; on timeout jump to the ret
        let mut s = scheduler(
            vec![vec![
                Instruction::lsi(500).unwrap(),
                Instruction::rcv(1).unwrap(),
                Instruction::nop(),
                Instruction::ret(),
            ]],
            &[],
        );
        let clock = ManualClock::new();
        s = s.with_clock(clock.clone());
        let pid = s.spawn_export("main", "f0", &[]).unwrap();
        assert_eq!(
            s.run_once(),
            RunState::Idle {
                next_deadline: Some(500)
            }
        );
        clock.advance(200);
        assert_eq!(
            s.run_once(),
            RunState::Idle {
                next_deadline: Some(300)
            }
        );
        assert_eq!(s.run(), RunState::Done);
        assert_eq!(clock.now(), 500);
        assert!(!s.is_alive(pid));
    }

    #[test]
    fn test_timeout_counts_from_suspension() {
        let mut s = scheduler(
            vec![vec![
                Instruction::lsi(500).unwrap(),
                Instruction::rcv(1).unwrap(),
                Instruction::nop(),
                Instruction::ret(),
            ]],
            &[],
        );
        let clock = ManualClock::new();
        s = s.with_clock(clock.clone());
        let first = s.spawn_export("main", "f0", &[]).unwrap();
        // host time before the process ever ran
        clock.advance(1000);
        assert_eq!(
            s.run_once(),
            RunState::Idle {
                next_deadline: Some(500)
            }
        );
        assert_eq!(s.state(first), Some(ProcessState::Waiting));

        clock.advance(300);
        let second = s.spawn_export("main", "f0", &[]).unwrap();
        assert_eq!(
            s.run_once(),
            RunState::Idle {
                next_deadline: Some(200)
            }
        );
        clock.advance(200);
        assert_eq!(s.run_once(), RunState::Busy);
        assert_eq!(s.state(first), Some(ProcessState::Running));
        assert_eq!(s.state(second), Some(ProcessState::Waiting));
        assert_eq!(
            s.run_once(),
            RunState::Idle {
                next_deadline: Some(300)
            }
        );
        assert!(!s.is_alive(first));
        assert_eq!(s.run(), RunState::Done);
        assert_eq!(clock.now(), 1800);
    }

    #[test]
    fn test_kill_waiting_process() {
        let mut s = scheduler(
            vec![vec![Instruction::nil(), Instruction::rcv(0).unwrap(), Instruction::ret()]],
            &[],
        );
        let pid = s.spawn_export("main", "f0", &[]).unwrap();
        s.run_once();
        s.kill(pid).unwrap();
        assert_eq!(s.run(), RunState::Done);
        assert_eq!(s.kill(pid), Err(VmError::InvalidPid(pid)));
    }

    fn boom(_: &mut NativeCtx<'_>) -> Result<NativeFlow> {
        Err(VmError::Raised("boom".into()))
    }

    #[test]
    fn test_panic_is_contained() {
        let mut loader = Loader::default();
        loader.natives_mut().register("test", "boom", boom);
        let mut s = scheduler_with(
            loader,
            vec![
                vec![Instruction::imp(0).unwrap(), Instruction::ivk(0).unwrap(), Instruction::ret()],
                vec![Instruction::lsi(1).unwrap(), Instruction::ret()],
            ],
            &[("test", "boom")],
        );
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        s.on_panic(move |pid, err| log.borrow_mut().push((pid, err.code())));

        let bad = s.spawn_export("main", "f0", &[]).unwrap();
        let good = s.spawn_export("main", "f1", &[]).unwrap();
        assert_eq!(s.run(), RunState::Done);
        assert_eq!(*seen.borrow(), vec![(bad, -1)]);
        assert!(!s.is_alive(good));
    }

    #[test]
    fn test_host_args() {
        let mut s = scheduler(vec![vec![Instruction::ret()]], &[]);
        let pid = s
            .spawn_export("main", "f0", &[HostArg::from(3), HostArg::from("hello")])
            .unwrap();
        let actor = s.processes().get(pid).unwrap().actor();
        // args are pushed last to first, callee on top
        assert_eq!(actor.stack()[0].kind(), ValueKind::String);
        assert_eq!(actor.string_bytes(actor.stack()[0]).unwrap(), b"hello");
        assert_eq!(actor.stack()[1], Value::Integer(3));
        assert_eq!(actor.stack()[2].kind(), ValueKind::ByteCodeFunc);
    }

    #[test]
    fn test_rejects_bad_config() {
        let config = SchedulerConfig {
            idx_bits: 0,
            ..SchedulerConfig::default()
        };
        assert!(Scheduler::new(config, Loader::default()).is_err());
    }
}
