//! Task control blocks and the task table.
//!
//! The table is an arena indexed by [`TaskId`]. The ready queue threads
//! through it with per-TCB `next` links (see [`queue`]), and the scheduler
//! and lifecycle operations are methods on the table and the kernel.

use rtx_common::{Priority, TaskId, TaskState};

use crate::config::MAX_TASKS;

mod lifecycle;
pub mod queue;
pub mod scheduler;

pub use queue::QueueIter;
pub use scheduler::Switch;

/// Entry procedure of a task.
pub type TaskEntry = extern "C" fn();

/// Parameters of a task to be created.
#[derive(Debug, Clone, Copy)]
pub struct TaskInit {
    /// Where the task starts executing.
    pub entry: TaskEntry,
    /// Initial priority.
    pub priority: Priority,
    /// Whether the task runs in the kernel's mode.
    pub privileged: bool,
    /// Requested user stack size in bytes.
    pub stack_size: usize,
}

/// Task control block.
#[derive(Debug, Clone, Copy)]
pub struct Tcb {
    /// Slot id.
    pub tid: TaskId,
    /// Current priority.
    pub priority: Priority,
    /// Whether the task runs in the kernel's mode.
    pub privileged: bool,
    /// Lifecycle state.
    pub state: TaskState,
    /// Saved kernel stack pointer, valid while the task is not running.
    pub(crate) ksp: usize,
    /// Low end of the user stack.
    pub u_stack_lo: usize,
    /// High end of the user stack.
    pub u_stack_hi: usize,
    /// User stack size in bytes.
    pub u_stack_size: usize,
    /// Entry procedure, `None` for an unused slot.
    pub entry: Option<TaskEntry>,
    /// Ready-queue link.
    pub(crate) next: Option<TaskId>,
}

impl Tcb {
    /// An unused slot.
    pub const fn dormant(tid: TaskId) -> Self {
        Self {
            tid,
            priority: Priority::LOWEST,
            privileged: false,
            state: TaskState::Dormant,
            ksp: 0,
            u_stack_lo: 0,
            u_stack_hi: 0,
            u_stack_size: 0,
            entry: None,
            next: None,
        }
    }

    /// Address of the entry procedure, 0 for an unused slot.
    pub fn entry_address(&self) -> usize {
        self.entry.map_or(0, |entry| entry as usize)
    }
}

/// Fixed-capacity TCB arena plus the ready-queue root.
pub struct TaskTable {
    tcbs: [Tcb; MAX_TASKS],
    head: Option<TaskId>,
    active: usize,
    current: Option<TaskId>,
}

impl Default for TaskTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskTable {
    /// Creates a table with every slot DORMANT and no ready queue.
    pub const fn new() -> Self {
        let mut tcbs = [Tcb::dormant(TaskId::NULL); MAX_TASKS];
        let mut i = 0;
        while i < MAX_TASKS {
            tcbs[i].tid = TaskId(i as u8);
            i += 1;
        }
        Self {
            tcbs,
            head: None,
            active: 0,
            current: None,
        }
    }

    /// Returns every slot to DORMANT and drops the ready queue.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// The TCB of `tid`, if it names a slot.
    pub fn tcb(&self, tid: TaskId) -> Option<&Tcb> {
        self.tcbs.get(tid.index())
    }

    /// Mutable access to the TCB of `tid`, if it names a slot.
    pub fn tcb_mut(&mut self, tid: TaskId) -> Option<&mut Tcb> {
        self.tcbs.get_mut(tid.index())
    }

    /// The running task.
    pub fn current(&self) -> Option<TaskId> {
        self.current
    }

    /// Number of non-DORMANT tasks, the idle task included.
    pub fn active(&self) -> usize {
        self.active
    }

    /// Head of the ready queue.
    pub fn head(&self) -> Option<TaskId> {
        self.head
    }

    /// Lowest-numbered DORMANT slot other than the idle slot.
    pub fn next_dormant(&self) -> Option<TaskId> {
        self.tcbs
            .iter()
            .skip(1)
            .find(|tcb| tcb.state == TaskState::Dormant)
            .map(|tcb| tcb.tid)
    }

    // Callers have already range-checked `tid`.
    fn slot(&self, tid: TaskId) -> &Tcb {
        &self.tcbs[tid.index()]
    }

    fn slot_mut(&mut self, tid: TaskId) -> &mut Tcb {
        &mut self.tcbs[tid.index()]
    }

    /// Installs `idle` as the running task and the tail of the ready queue.
    pub(crate) fn install_idle(&mut self, idle: Tcb) {
        let tid = idle.tid;
        *self.slot_mut(tid) = Tcb {
            state: TaskState::Running,
            next: None,
            ..idle
        };
        self.head = Some(tid);
        self.current = Some(tid);
        self.active = 1;
    }

    pub(crate) fn set_current(&mut self, tid: TaskId) {
        self.current = Some(tid);
    }

    pub(crate) fn activated(&mut self) {
        self.active += 1;
    }

    pub(crate) fn deactivated(&mut self) {
        self.active = self.active.saturating_sub(1);
    }
}
