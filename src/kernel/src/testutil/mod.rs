//! Test infrastructure for the RTX kernel.
//!
//! Host unit tests drive the kernel with a heap arena carved from a `Vec`
//! and a context switch backend that records switches instead of performing
//! them. After a recorded switch the test thread simply carries on as the
//! task that was switched to.

use core::cell::RefCell;
use std::vec::Vec;

use rtx_common::Priority;
use rtx_hal::{ContextSwitch, EntryFrame};

use crate::arch::Armv7a;
use crate::config::U_STACK_SIZE;
use crate::kernel::Kernel;
use crate::mem::MemoryRegion;
use crate::task::TaskInit;

/// Fake address of the SVC restore trampoline in test frames.
pub const TEST_SVC_RESTORE: usize = 0x5EC0_0000;

/// An 8-aligned block of host memory to hand to the heap.
pub struct HeapArena {
    words: Vec<u64>,
}

impl HeapArena {
    /// Allocates `bytes` bytes, rounded up to a multiple of 8.
    pub fn new(bytes: usize) -> Self {
        Self {
            words: vec![0; bytes.div_ceil(8)],
        }
    }

    /// The arena as a heap region.
    pub fn region(&mut self) -> MemoryRegion {
        let range = self.words.as_mut_ptr_range();
        MemoryRegion::new(range.start as usize, range.end as usize)
    }
}

/// A switch seen by [`RecordingSwitch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedSwitch {
    /// Where the outgoing stack pointer would have been saved.
    pub save: usize,
    /// Stack pointer that would have been restored.
    pub restore: usize,
}

thread_local! {
    static SWITCHES: RefCell<Vec<RecordedSwitch>> = const { RefCell::new(Vec::new()) };
}

/// Drains the switches recorded on this thread.
pub fn take_switches() -> Vec<RecordedSwitch> {
    SWITCHES.with(|switches| switches.take())
}

/// Context switch backend that builds real ARMv7-A frames but only records switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordingSwitch;

impl ContextSwitch for RecordingSwitch {
    fn build_initial_context(&self, kernel_stack: &mut [usize], frame: &EntryFrame) -> usize {
        Armv7a::new(TEST_SVC_RESTORE).build_frame(kernel_stack, frame)
    }

    unsafe fn switch(&self, save: *mut usize, restore: usize) {
        SWITCHES.with(|switches| {
            switches.borrow_mut().push(RecordedSwitch {
                save: save as usize,
                restore,
            })
        });
    }
}

/// A boxed kernel with its heap arena.
///
/// The kernel is declared first so it drops before the memory it manages.
pub struct TestKernel {
    /// Kernel under test.
    pub kernel: Box<Kernel<RecordingSwitch>>,
    _arena: HeapArena,
}

impl TestKernel {
    /// Kernel over a `heap_bytes` arena with the idle task installed.
    pub fn new(heap_bytes: usize) -> Self {
        let mut arena = HeapArena::new(heap_bytes);
        let mut kernel = Box::new(Kernel::new(RecordingSwitch));
        // SAFETY: the arena is owned by the returned value and outlives the kernel.
        unsafe { kernel.mem_init(arena.region()) }.expect("heap init should succeed");
        kernel.init_tasks(idle, &[]).expect("task init should succeed");
        take_switches();
        Self {
            kernel,
            _arena: arena,
        }
    }
}

impl core::ops::Deref for TestKernel {
    type Target = Kernel<RecordingSwitch>;

    fn deref(&self) -> &Self::Target {
        &self.kernel
    }
}

impl core::ops::DerefMut for TestKernel {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.kernel
    }
}

/// Idle task body.
pub extern "C" fn idle() {}

/// Body of every test task.
pub extern "C" fn task_body() {}

/// Unprivileged task with the minimum stack.
pub fn user_task(priority: Priority) -> TaskInit {
    TaskInit {
        entry: task_body,
        priority,
        privileged: false,
        stack_size: U_STACK_SIZE,
    }
}

/// Privileged task with the minimum stack.
pub fn privileged_task(priority: Priority) -> TaskInit {
    TaskInit {
        privileged: true,
        ..user_task(priority)
    }
}
