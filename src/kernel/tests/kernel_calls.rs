//! Kernel calls through the public `KernelCell` surface.

use std::cell::Cell;

use rtx_hal::{ContextSwitch, EntryFrame};
use rtx_kernel::arch::Armv7a;
use rtx_kernel::config::U_STACK_SIZE;
use rtx_kernel::{KernelCell, MemError, MemoryRegion, Priority, TaskError, TaskId, TaskInit, TaskState};

thread_local! {
    static SWITCHES: Cell<usize> = const { Cell::new(0) };
}

/// Builds real frames and counts switches without performing them.
#[derive(Clone, Copy)]
struct CountingSwitch;

impl ContextSwitch for CountingSwitch {
    fn build_initial_context(&self, kernel_stack: &mut [usize], frame: &EntryFrame) -> usize {
        Armv7a::new(0).build_frame(kernel_stack, frame)
    }

    unsafe fn switch(&self, _save: *mut usize, _restore: usize) {
        SWITCHES.with(|n| n.set(n.get() + 1));
    }
}

extern "C" fn idle() {}
extern "C" fn worker() {}

fn task(priority: Priority) -> TaskInit {
    TaskInit {
        entry: worker,
        priority,
        privileged: false,
        stack_size: U_STACK_SIZE,
    }
}

fn switches() -> usize {
    SWITCHES.with(|n| n.replace(0))
}

#[test]
fn kernel_calls_round_trip() {
    let mut arena = vec![0u64; 4096];
    let range = arena.as_mut_ptr_range();
    let cell = Box::new(KernelCell::new(CountingSwitch));

    assert_eq!(cell.mem_alloc(16), Err(MemError::NotInitialized));
    unsafe { cell.mem_init(MemoryRegion::new(range.start as usize, range.end as usize)) }
        .expect("heap init should succeed");
    cell.task_init(idle, &[task(Priority::LOW)]).expect("task init");
    assert_eq!(cell.task_get_current_id(), TaskId::NULL);

    cell.start().expect("start");
    assert_eq!(switches(), 1);
    let first = cell.task_get_current_id();
    assert_eq!(first, TaskId(1));

    let second = cell.task_create(&task(Priority::HIGH)).expect("create");
    assert_eq!(switches(), 1);
    assert_eq!(cell.task_get_current_id(), second);
    assert_eq!(
        cell.task_get_info(first).expect("info").state,
        TaskState::Ready
    );

    assert_eq!(
        cell.task_set_priority(TaskId::NULL, Priority::LOW),
        Err(TaskError::InvalidTaskId)
    );
    cell.task_yield().expect("yield");
    assert_eq!(switches(), 0);

    cell.task_exit().expect("exit");
    assert_eq!(switches(), 1);
    assert_eq!(cell.task_get_current_id(), first);
    assert_eq!(
        cell.task_get_info(second).expect("info").state,
        TaskState::Dormant
    );

    let p = cell.mem_alloc(100).expect("alloc");
    assert_eq!(p.as_ptr() as usize % 8, 0);
    cell.mem_dealloc(p.as_ptr()).expect("dealloc");
    assert_eq!(cell.mem_dealloc(p.as_ptr()), Err(MemError::DoubleFree));
    assert_eq!(cell.mem_count_extfrag(usize::MAX), 1);

    let kernel = cell.lock();
    let stats = kernel.heap().stats();
    assert_eq!(stats.free_bytes + stats.allocated_bytes, stats.capacity);
    drop(kernel);
    drop(cell);
}
