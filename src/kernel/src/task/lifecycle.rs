//! Task lifecycle kernel calls.

use rtx_common::{Priority, TaskError, TaskId, TaskInfo, TaskState};
use rtx_hal::{ContextSwitch, EntryFrame};

use super::{TaskEntry, TaskInit, Tcb};
use crate::config::{K_STACK_SIZE, MAX_TASKS, U_STACK_SIZE};
use crate::kernel::Kernel;
use crate::mem::{release_user_stack, reserve_user_stack};

impl<A: ContextSwitch> Kernel<A> {
    /// Installs the idle task and creates the boot tasks.
    ///
    /// Tasks left over from an earlier call are discarded and their heap
    /// stacks freed. The caller keeps running as the idle task. Boot tasks that fail
    /// validation or provisioning are skipped with a warning. No switch
    /// happens here; see [`Kernel::start`].
    pub fn init_tasks(&mut self, idle_entry: TaskEntry, boot: &[TaskInit]) -> Result<(), TaskError> {
        if boot.len() > MAX_TASKS - 1 {
            return Err(TaskError::TableFull);
        }

        for index in 1..MAX_TASKS {
            let tid = TaskId(index as u8);
            if let Some(tcb) = self.tasks.tcb_mut(tid) {
                if tcb.state != TaskState::Dormant {
                    if let Err(err) = release_user_stack(&mut self.heap, tcb) {
                        log::warn!("{}: user stack not released: {}", tid, err);
                    }
                }
            }
        }
        self.tasks.reset();
        self.pending = None;

        let mut idle = Tcb::dormant(TaskId::NULL);
        idle.priority = Priority::NULL;
        idle.privileged = true;
        idle.entry = Some(idle_entry);
        self.stacks.assign_reserved_user_stack(&mut idle);
        self.tasks.install_idle(idle);

        for (index, init) in boot.iter().enumerate() {
            match self.spawn(init) {
                Ok(tid) => log::debug!("boot task {} -> {}", index, tid),
                Err(err) => log::warn!("boot task {} skipped: {}", index, err),
            }
        }

        log::info!("tasks: {} active", self.tasks.active());
        Ok(())
    }

    /// Creates a task and preempts the caller if the new task outranks it.
    pub fn create(&mut self, init: &TaskInit) -> Result<TaskId, TaskError> {
        let tid = self.spawn(init)?;
        let current = self.tasks.current().ok_or(TaskError::NoCurrentTask)?;
        let outranks = self
            .tasks
            .tcb(current)
            .is_some_and(|tcb| init.priority.is_higher_than(tcb.priority));
        if outranks {
            self.pending = self.tasks.reschedule()?;
        }
        Ok(tid)
    }

    /// Ends the running task and switches away from it.
    ///
    /// On hardware the pending switch never returns to the exited task.
    pub fn exit(&mut self) -> Result<(), TaskError> {
        let tid = self.tasks.current().ok_or(TaskError::NoCurrentTask)?;
        if tid.is_null() {
            return Err(TaskError::InvalidTaskId);
        }

        let tcb = self.tasks.tcb_mut(tid).ok_or(TaskError::InvalidTaskId)?;
        tcb.state = TaskState::Dormant;
        if let Err(err) = release_user_stack(&mut self.heap, tcb) {
            log::warn!("{}: user stack not released: {}", tid, err);
        }
        self.tasks.deactivated();
        log::debug!("{} exited", tid);

        self.pending = self.tasks.reschedule()?;
        Ok(())
    }

    /// Changes the priority of `tid`.
    ///
    /// An unprivileged caller may only target unprivileged tasks. Afterwards
    /// the caller is preempted if the queue head now strictly outranks it.
    pub fn set_priority(&mut self, tid: TaskId, priority: Priority) -> Result<(), TaskError> {
        if priority.is_reserved() {
            return Err(TaskError::InvalidPriority);
        }
        if tid.is_null() || tid.index() >= MAX_TASKS {
            return Err(TaskError::InvalidTaskId);
        }
        let caller = self.tasks.current().ok_or(TaskError::NoCurrentTask)?;
        let caller_privileged = self.tasks.tcb(caller).is_some_and(|tcb| tcb.privileged);
        let target = *self.tasks.tcb(tid).ok_or(TaskError::InvalidTaskId)?;

        if !caller_privileged && target.privileged {
            log::warn!("{} may not reprioritize privileged {}", caller, tid);
            return Err(TaskError::PermissionDenied);
        }
        if target.state == TaskState::Dormant {
            return Err(TaskError::Dormant);
        }

        match target.state {
            TaskState::Ready => self.tasks.reprioritize(tid, priority)?,
            _ => {
                if let Some(tcb) = self.tasks.tcb_mut(tid) {
                    tcb.priority = priority;
                }
            }
        }

        if self.tasks.head_outranks_current() {
            self.pending = self.tasks.reschedule()?;
        }
        Ok(())
    }

    /// Snapshot of the descriptor of `tid`.
    pub fn get_info(&self, tid: TaskId) -> Result<TaskInfo, TaskError> {
        if tid.is_null() {
            return Err(TaskError::InvalidTaskId);
        }
        let tcb = self.tasks.tcb(tid).ok_or(TaskError::InvalidTaskId)?;
        Ok(TaskInfo {
            tid: tcb.tid,
            priority: tcb.priority,
            state: tcb.state,
            privileged: tcb.privileged,
            entry: tcb.entry_address(),
            k_stack_hi: self.stacks.kernel_stack_top(tid),
            k_stack_size: K_STACK_SIZE,
            u_stack_hi: tcb.u_stack_hi,
            u_stack_size: tcb.u_stack_size,
        })
    }

    /// Id of the running task, the idle task before any switch.
    pub fn get_current_id(&self) -> TaskId {
        self.tasks.current().unwrap_or(TaskId::NULL)
    }

    /// Gives up the CPU if a strictly higher priority task is ready.
    pub fn yield_now(&mut self) -> Result<(), TaskError> {
        self.tasks.current().ok_or(TaskError::NoCurrentTask)?;
        if self.tasks.head_outranks_current() {
            self.pending = self.tasks.reschedule()?;
        }
        Ok(())
    }

    /// First hand-off from the idle context to the best boot task.
    pub fn start(&mut self) -> Result<(), TaskError> {
        let current = self.tasks.current().ok_or(TaskError::NoCurrentTask)?;
        if !current.is_null() {
            return Err(TaskError::InvalidTaskId);
        }
        log::info!("starting scheduler");
        self.yield_now()
    }

    /// Validates `init` and makes a new READY task without rescheduling.
    fn spawn(&mut self, init: &TaskInit) -> Result<TaskId, TaskError> {
        if init.priority.is_reserved() {
            return Err(TaskError::InvalidPriority);
        }
        if init.stack_size < U_STACK_SIZE || init.stack_size % 8 != 0 {
            return Err(TaskError::InvalidStackSize);
        }
        if self.tasks.head().is_none() {
            return Err(TaskError::QueueUninitialized);
        }
        if self.tasks.active() >= MAX_TASKS {
            return Err(TaskError::TableFull);
        }
        let tid = self.tasks.next_dormant().ok_or(TaskError::TableFull)?;

        let mut tcb = Tcb::dormant(tid);
        tcb.priority = init.priority;
        tcb.privileged = init.privileged;
        tcb.entry = Some(init.entry);
        let user_stack_top = if init.privileged {
            self.stacks.assign_reserved_user_stack(&mut tcb)
        } else {
            reserve_user_stack(&mut self.heap, &mut tcb, init.stack_size)?
        };

        let frame = EntryFrame {
            entry: tcb.entry_address(),
            user_stack_top,
            privileged: init.privileged,
        };
        tcb.ksp = self
            .arch
            .build_initial_context(self.stacks.reserve_kernel_stack(tid), &frame);
        tcb.state = TaskState::Ready;

        if let Some(slot) = self.tasks.tcb_mut(tid) {
            *slot = tcb;
        }
        self.tasks.activated();
        if let Err(err) = self.tasks.insert(tid) {
            self.tasks.deactivated();
            if let Some(slot) = self.tasks.tcb_mut(tid) {
                slot.state = TaskState::Dormant;
                if let Err(release) = release_user_stack(&mut self.heap, slot) {
                    log::warn!("{}: user stack not released: {}", tid, release);
                }
            }
            return Err(err);
        }

        log::debug!(
            "created {} prio {:#x} {}",
            tid,
            init.priority.0,
            if init.privileged { "privileged" } else { "user" }
        );
        Ok(tid)
    }
}
