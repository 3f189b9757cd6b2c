//! The kernel state: heap, stacks, task table and the architecture backend.

use core::ptr::NonNull;

use rtx_common::{MemError, TaskId};

use crate::mem::{Heap, MemoryRegion, Owner, StackTable};
use crate::task::{Switch, TaskTable};

/// All mutable kernel state in one place.
///
/// Saved stack pointers point into `stacks`, so a `Kernel` must not move once
/// tasks have been created. Keep it in a `static` or behind a `Box`.
pub struct Kernel<A> {
    pub(crate) arch: A,
    pub(crate) heap: Heap,
    pub(crate) stacks: StackTable,
    pub(crate) tasks: TaskTable,
    pub(crate) pending: Option<Switch>,
}

impl<A> Kernel<A> {
    /// Creates a kernel with an uninitialized heap and no tasks.
    pub const fn new(arch: A) -> Self {
        Self {
            arch,
            heap: Heap::new(),
            stacks: StackTable::new(),
            tasks: TaskTable::new(),
            pending: None,
        }
    }

    /// Hands `region` to the heap allocator.
    ///
    /// # Safety
    ///
    /// See [`Heap::init`]. Re-initializing while tasks hold heap stacks
    /// invalidates those stacks.
    pub unsafe fn mem_init(&mut self, region: MemoryRegion) -> Result<(), MemError> {
        // SAFETY: forwarded to the caller.
        unsafe { self.heap.init(region) }
    }

    /// Allocates memory owned by the running task (the OS before tasks exist).
    pub fn mem_alloc(&mut self, size: usize) -> Result<NonNull<u8>, MemError> {
        let owner = self.tasks.current().map_or(Owner::Os, Owner::Task);
        self.heap.allocate(size, owner)
    }

    /// Allocates memory any task may free.
    pub fn mem_alloc_os(&mut self, size: usize) -> Result<NonNull<u8>, MemError> {
        self.heap.allocate(size, Owner::Os)
    }

    /// Frees memory on behalf of the running task.
    pub fn mem_dealloc(&mut self, ptr: *mut u8) -> Result<(), MemError> {
        let caller = self.tasks.current().unwrap_or(TaskId::NULL);
        self.heap.deallocate(ptr, caller)
    }

    /// Counts free blocks smaller than `threshold` bytes, header included.
    pub fn mem_count_extfrag(&self, threshold: usize) -> usize {
        self.heap.count_external_fragments(threshold)
    }

    /// Read access to the heap.
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Read access to the task table.
    pub fn tasks(&self) -> &TaskTable {
        &self.tasks
    }

    /// The architecture backend.
    pub fn arch(&self) -> &A {
        &self.arch
    }

    /// Takes the switch requested by the last kernel call, if any.
    pub fn take_switch(&mut self) -> Option<Switch> {
        self.pending.take()
    }

    /// Where the outgoing task's stack pointer is saved.
    pub(crate) fn saved_sp_slot(&mut self, tid: TaskId) -> Option<*mut usize> {
        self.tasks
            .tcb_mut(tid)
            .map(|tcb| core::ptr::addr_of_mut!(tcb.ksp))
    }

    /// The stack pointer the incoming task resumes from.
    pub(crate) fn saved_sp(&self, tid: TaskId) -> Option<usize> {
        self.tasks.tcb(tid).map(|tcb| tcb.ksp)
    }
}
