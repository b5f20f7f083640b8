//! Process table.
//!
//! Slots are addressed by the index half of a pid and guarded by the
//! generation half. Fresh indices are handed out first; once every index
//! has been used, released ones are reused oldest first.

use std::collections::VecDeque;

use avm_runtime::{Heap, Pid, PidLayout, Value};
use tracing::trace;

use crate::actor::Actor;
use crate::config::ActorConfig;
use crate::error::{Result, VmError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Spawned, never resumed.
    Pending,
    /// In the ready rotation.
    Running,
    /// Blocked in a receive.
    Waiting,
    /// Finished; waiting to be reaped.
    Dead,
}

#[derive(Debug)]
pub struct Process {
    pub(crate) pid: Pid,
    pub(crate) actor: Actor,
    pub(crate) state: ProcessState,
    /// Scheduler time, in microseconds, at which a timed receive gives up;
    /// `None` waits forever.
    pub(crate) deadline: Option<u64>,
    /// Set when a message arrives while waiting.
    pub(crate) wake: bool,
    pub(crate) exit_requested: bool,
}

impl Process {
    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    #[inline]
    pub fn state(&self) -> ProcessState {
        self.state
    }

    #[inline]
    pub fn actor(&self) -> &Actor {
        &self.actor
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    occupied: bool,
    /// `None` while checked out for execution.
    process: Option<Box<Process>>,
}

#[derive(Debug)]
pub struct ProcessTable {
    layout: PidLayout,
    config: ActorConfig,
    slots: Vec<Slot>,
    next_idx: usize,
    free: VecDeque<u32>,
    pub(crate) pending: VecDeque<Pid>,
    live: usize,
}

impl ProcessTable {
    pub fn new(layout: PidLayout, config: ActorConfig) -> Self {
        Self {
            layout,
            config,
            slots: Vec::new(),
            next_idx: 0,
            free: VecDeque::new(),
            pending: VecDeque::new(),
            live: 0,
        }
    }

    #[inline]
    pub fn layout(&self) -> PidLayout {
        self.layout
    }

    /// Processes spawned and not yet reaped.
    #[inline]
    pub fn live_count(&self) -> usize {
        self.live
    }

    fn alloc_index(&mut self) -> Result<u32> {
        if self.next_idx < self.layout.max_processes() {
            let idx = self.next_idx;
            self.next_idx += 1;
            self.slots.push(Slot::default());
            return Ok(idx as u32);
        }
        self.free.pop_front().ok_or(VmError::ProcessTableFull)
    }

    /// Creates a pending process that will run `callee(args...)`.
    pub fn spawn(&mut self, callee: Value, args: &[Value], src: Option<&Heap>) -> Result<Pid> {
        let mut actor = Actor::new(&self.config);
        actor.prepare_entry(callee, args, src)?;
        let idx = self.alloc_index()?;
        let slot = &mut self.slots[idx as usize];
        let pid = self.layout.make(idx, slot.generation);
        slot.occupied = true;
        slot.process = Some(Box::new(Process {
            pid,
            actor,
            state: ProcessState::Pending,
            deadline: None,
            wake: false,
            exit_requested: false,
        }));
        self.live += 1;
        self.pending.push_back(pid);
        trace!(%pid, "spawned");
        Ok(pid)
    }

    fn slot(&self, pid: Pid) -> Option<&Slot> {
        let slot = self.slots.get(self.layout.index(pid) as usize)?;
        (slot.occupied && slot.generation == self.layout.generation(pid)).then_some(slot)
    }

    fn slot_mut(&mut self, pid: Pid) -> Option<&mut Slot> {
        let generation = self.layout.generation(pid);
        let slot = self.slots.get_mut(self.layout.index(pid) as usize)?;
        (slot.occupied && slot.generation == generation).then_some(slot)
    }

    /// A live process that is not currently executing.
    pub fn get(&self, pid: Pid) -> Result<&Process> {
        self.slot(pid)
            .and_then(|s| s.process.as_deref())
            .filter(|p| p.state != ProcessState::Dead)
            .ok_or(VmError::InvalidPid(pid))
    }

    pub fn get_mut(&mut self, pid: Pid) -> Result<&mut Process> {
        self.slot_mut(pid)
            .and_then(|s| s.process.as_deref_mut())
            .filter(|p| p.state != ProcessState::Dead)
            .ok_or(VmError::InvalidPid(pid))
    }

    pub fn is_alive(&self, pid: Pid) -> bool {
        self.slot(pid).is_some_and(|s| {
            s.process
                .as_ref()
                .map_or(true, |p| p.state != ProcessState::Dead)
        })
    }

    pub(crate) fn checkout(&mut self, pid: Pid) -> Option<Box<Process>> {
        self.slot_mut(pid)?.process.take()
    }

    pub(crate) fn checkin(&mut self, process: Box<Process>) {
        if let Some(slot) = self.slot_mut(process.pid) {
            slot.process = Some(process);
        }
    }

    /// Frees the slot of a dead process. Its pid stops matching at once.
    pub(crate) fn release(&mut self, pid: Pid) {
        let next = self.layout.next_generation(self.layout.generation(pid));
        let Some(slot) = self.slot_mut(pid) else {
            return;
        };
        slot.occupied = false;
        slot.process = None;
        slot.generation = next;
        self.free.push_back(self.layout.index(pid));
        self.live -= 1;
        trace!(%pid, "reaped");
    }

    /// Delivers `msg` to `target`. Without a source heap only inline values
    /// can be sent.
    pub fn deliver(&mut self, target: Pid, src: Option<&Heap>, msg: Value) -> Result<()> {
        let process = self.get_mut(target)?;
        match src {
            Some(src) => process.actor.deliver(target, src, msg)?,
            None if msg.is_collectable() => {
                return Err(VmError::type_mismatch("inline value", msg))
            }
            None => process.actor.deliver_local(target, msg)?,
        }
        if process.state == ProcessState::Waiting {
            process.wake = true;
        }
        Ok(())
    }

    pub fn deliver_bytes(&mut self, target: Pid, bytes: &[u8]) -> Result<()> {
        let process = self.get_mut(target)?;
        process.actor.deliver_bytes(target, bytes)?;
        if process.state == ProcessState::Waiting {
            process.wake = true;
        }
        Ok(())
    }

    pub fn kill(&mut self, target: Pid) -> Result<()> {
        self.get_mut(target)?.exit_requested = true;
        Ok(())
    }
}
