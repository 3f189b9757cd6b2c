//! Serialized access to the kernel state.
//!
//! Every kernel call runs under one spin lock. A context switch requested by
//! the call is carried out after the lock is released, so the next task can
//! make kernel calls of its own.
//!
//! # Example
//!
//! ```ignore
//! use rtx_kernel::sync::KERNEL;
//!
//! let tid = KERNEL.task_create(&init)?;
//! KERNEL.task_yield()?;
//! ```

use core::ptr::NonNull;

use rtx_common::{MemError, Priority, TaskError, TaskId, TaskInfo};
use rtx_hal::ContextSwitch;
use spin::{Mutex, MutexGuard};

use crate::kernel::Kernel;
use crate::mem::MemoryRegion;
use crate::task::{TaskEntry, TaskInit};

#[cfg(target_arch = "arm")]
use crate::arch::Armv7a;

#[cfg(target_arch = "arm")]
lazy_static::lazy_static! {
    /// The kernel of this image.
    pub static ref KERNEL: KernelCell<Armv7a> = KernelCell::new(Armv7a::for_target());
}

/// Owner of the kernel state.
pub struct KernelCell<A> {
    inner: Mutex<Kernel<A>>,
}

impl<A: ContextSwitch + Copy> KernelCell<A> {
    /// Wraps a fresh kernel.
    pub const fn new(arch: A) -> Self {
        Self {
            inner: Mutex::new(Kernel::new(arch)),
        }
    }

    /// Runs `op` on the kernel state and then performs the switch it requested.
    ///
    /// Returns once the calling task is scheduled again.
    pub fn call<R>(&self, op: impl FnOnce(&mut Kernel<A>) -> R) -> R {
        let (result, handoff) = {
            let mut kernel = self.inner.lock();
            let result = op(&mut kernel);
            let handoff = kernel.take_switch().and_then(|switch| {
                let save = kernel.saved_sp_slot(switch.from)?;
                let restore = kernel.saved_sp(switch.to)?;
                Some((kernel.arch, save, restore))
            });
            (result, handoff)
        };

        if let Some((arch, save, restore)) = handoff {
            // SAFETY:
            // - `save` points into the TCB table of the kernel behind this
            //   cell, which outlives every task.
            // - `restore` was produced by `build_initial_context` or saved by
            //   an earlier switch of the same task.
            unsafe { arch.switch(save, restore) };
        }
        result
    }

    /// Locks the kernel for inspection without making a kernel call.
    pub fn lock(&self) -> MutexGuard<'_, Kernel<A>> {
        self.inner.lock()
    }

    /// Hands `region` to the heap allocator.
    ///
    /// # Safety
    ///
    /// See [`crate::mem::Heap::init`].
    pub unsafe fn mem_init(&self, region: MemoryRegion) -> Result<(), MemError> {
        // SAFETY: forwarded to the caller.
        self.call(|kernel| unsafe { kernel.mem_init(region) })
    }

    /// Allocates memory owned by the running task.
    pub fn mem_alloc(&self, size: usize) -> Result<NonNull<u8>, MemError> {
        self.call(|kernel| kernel.mem_alloc(size))
    }

    /// Allocates memory any task may free.
    pub fn mem_alloc_os(&self, size: usize) -> Result<NonNull<u8>, MemError> {
        self.call(|kernel| kernel.mem_alloc_os(size))
    }

    /// Frees memory on behalf of the running task.
    pub fn mem_dealloc(&self, ptr: *mut u8) -> Result<(), MemError> {
        self.call(|kernel| kernel.mem_dealloc(ptr))
    }

    /// Counts free blocks smaller than `threshold`.
    pub fn mem_count_extfrag(&self, threshold: usize) -> usize {
        self.call(|kernel| kernel.mem_count_extfrag(threshold))
    }

    /// Installs the idle task and the boot tasks.
    pub fn task_init(&self, idle_entry: TaskEntry, boot: &[TaskInit]) -> Result<(), TaskError> {
        self.call(|kernel| kernel.init_tasks(idle_entry, boot))
    }

    /// Creates a task.
    pub fn task_create(&self, init: &TaskInit) -> Result<TaskId, TaskError> {
        self.call(|kernel| kernel.create(init))
    }

    /// Ends the running task.
    pub fn task_exit(&self) -> Result<(), TaskError> {
        self.call(|kernel| kernel.exit())
    }

    /// Changes the priority of a task.
    pub fn task_set_priority(&self, tid: TaskId, priority: Priority) -> Result<(), TaskError> {
        self.call(|kernel| kernel.set_priority(tid, priority))
    }

    /// Snapshot of a task descriptor.
    pub fn task_get_info(&self, tid: TaskId) -> Result<TaskInfo, TaskError> {
        self.call(|kernel| kernel.get_info(tid))
    }

    /// Id of the running task.
    pub fn task_get_current_id(&self) -> TaskId {
        self.call(|kernel| kernel.get_current_id())
    }

    /// Yields to a strictly higher priority ready task.
    pub fn task_yield(&self) -> Result<(), TaskError> {
        self.call(|kernel| kernel.yield_now())
    }

    /// First switch away from the boot context.
    pub fn start(&self) -> Result<(), TaskError> {
        self.call(|kernel| kernel.start())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{self, HeapArena, RecordingSwitch};
    use rtx_common::TaskState;

    #[test]
    fn test_call_switches_after_unlock() {
        let cell = Box::new(KernelCell::new(RecordingSwitch));
        let mut arena = HeapArena::new(8192);
        unsafe { cell.mem_init(arena.region()) }.expect("heap init should succeed");
        cell.task_init(testutil::idle, &[]).expect("task init");
        testutil::take_switches();

        let tid = cell
            .task_create(&testutil::user_task(Priority::HIGH))
            .expect("create");
        assert_eq!(cell.task_get_current_id(), tid);

        let switches = testutil::take_switches();
        assert_eq!(switches.len(), 1);
        let kernel = cell.lock();
        let idle = kernel.tasks().tcb(TaskId::NULL).expect("idle");
        assert_eq!(idle.state, TaskState::Ready);
        assert_eq!(switches[0].save, core::ptr::addr_of!(idle.ksp) as usize);
        assert_eq!(switches[0].restore, kernel.tasks().tcb(tid).expect("tcb").ksp);
    }

    #[test]
    fn test_no_switch_without_preemption() {
        let cell = Box::new(KernelCell::new(RecordingSwitch));
        let mut arena = HeapArena::new(8192);
        unsafe { cell.mem_init(arena.region()) }.expect("heap init should succeed");
        cell.task_init(testutil::idle, &[]).expect("task init");
        cell.task_yield().expect("yield");
        testutil::take_switches();

        let p = cell.mem_alloc(64).expect("alloc");
        cell.mem_dealloc(p.as_ptr()).expect("dealloc");
        assert_eq!(cell.mem_count_extfrag(usize::MAX), 1);
        assert!(testutil::take_switches().is_empty());
    }
}
