//! Kernel and user stack provisioning.
//!
//! Every task slot owns a kernel stack in the static image. Unprivileged tasks
//! get their user stack from the heap; privileged tasks use a reserved region
//! of `U_STACK_SIZE` bytes next to their kernel stack.

use core::mem::size_of;

use rtx_common::{MemError, TaskId};

use super::heap::{Heap, Owner};
use crate::config::{K_STACK_SIZE, MAX_TASKS, U_STACK_SIZE};
use crate::task::Tcb;

const K_STACK_WORDS: usize = K_STACK_SIZE / size_of::<usize>();
const U_STACK_WORDS: usize = U_STACK_SIZE / size_of::<usize>();

#[repr(C, align(8))]
struct KernelStack([usize; K_STACK_WORDS]);

#[repr(C, align(8))]
struct ReservedStack([usize; U_STACK_WORDS]);

/// Statically sized stacks for every task slot.
pub struct StackTable {
    kernel: [KernelStack; MAX_TASKS],
    reserved: [ReservedStack; MAX_TASKS],
}

impl Default for StackTable {
    fn default() -> Self {
        Self::new()
    }
}

impl StackTable {
    /// Creates a zero-filled table.
    pub const fn new() -> Self {
        Self {
            kernel: [const { KernelStack([0; K_STACK_WORDS]) }; MAX_TASKS],
            reserved: [const { ReservedStack([0; U_STACK_WORDS]) }; MAX_TASKS],
        }
    }

    /// The kernel stack slot of `tid`, lowest word first.
    pub fn reserve_kernel_stack(&mut self, tid: TaskId) -> &mut [usize] {
        &mut self.kernel[tid.index()].0
    }

    /// High end of the kernel stack of `tid`.
    pub fn kernel_stack_top(&self, tid: TaskId) -> usize {
        self.kernel[tid.index()].0.as_ptr_range().end as usize
    }

    /// Points `tcb` at its reserved user stack region.
    pub fn assign_reserved_user_stack(&mut self, tcb: &mut Tcb) -> usize {
        let range = self.reserved[tcb.tid.index()].0.as_mut_ptr_range();
        tcb.u_stack_lo = range.start as usize;
        tcb.u_stack_hi = range.end as usize;
        tcb.u_stack_size = U_STACK_SIZE;
        tcb.u_stack_hi
    }
}

/// Allocates an OS-owned user stack of `size` bytes for `tcb` from `heap`.
///
/// The recorded high end is the 8-aligned end of the whole block, so the
/// stack may be a few bytes larger than requested. Returns the high end.
pub fn reserve_user_stack(heap: &mut Heap, tcb: &mut Tcb, size: usize) -> Result<usize, MemError> {
    let lo = heap.allocate(size, Owner::Os)?;
    let hi = heap.block_end(lo.as_ptr()).ok_or(MemError::InvalidPointer)?;

    tcb.u_stack_lo = lo.as_ptr() as usize;
    tcb.u_stack_hi = hi;
    tcb.u_stack_size = hi - tcb.u_stack_lo;

    log::debug!(
        "{}: user stack {:#x}..{:#x}",
        tcb.tid,
        tcb.u_stack_lo,
        tcb.u_stack_hi
    );
    Ok(hi)
}

/// Returns the heap-backed user stack of `tcb`, if any, and clears its bounds.
pub fn release_user_stack(heap: &mut Heap, tcb: &mut Tcb) -> Result<(), MemError> {
    if !tcb.privileged && tcb.u_stack_lo != 0 {
        heap.deallocate(tcb.u_stack_lo as *mut u8, tcb.tid)?;
    }
    tcb.u_stack_lo = 0;
    tcb.u_stack_hi = 0;
    tcb.u_stack_size = 0;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HEAP_ALIGN;
    use crate::testutil::HeapArena;

    #[test]
    fn test_kernel_stack_top_is_aligned() {
        let stacks = Box::new(StackTable::new());
        for tid in 0..MAX_TASKS as u8 {
            assert_eq!(stacks.kernel_stack_top(TaskId(tid)) % HEAP_ALIGN, 0);
        }
        assert_eq!(
            stacks.kernel_stack_top(TaskId(1)) - stacks.kernel_stack_top(TaskId(0)),
            K_STACK_SIZE
        );
    }

    #[test]
    fn test_heap_user_stack_bounds() {
        let mut arena = HeapArena::new(4096);
        let mut heap = Heap::new();
        unsafe { heap.init(arena.region()) }.expect("heap init should succeed");
        let mut tcb = Tcb::dormant(TaskId(1));

        let hi = reserve_user_stack(&mut heap, &mut tcb, 0x204).expect("stack");
        assert_eq!(hi, tcb.u_stack_hi);
        assert_eq!(hi % HEAP_ALIGN, 0);
        assert!(tcb.u_stack_size >= 0x204);
        assert_eq!(tcb.u_stack_lo % HEAP_ALIGN, 0);

        release_user_stack(&mut heap, &mut tcb).expect("release");
        assert_eq!(tcb.u_stack_size, 0);
        assert_eq!(heap.free_blocks().count(), 1);
    }

    #[test]
    fn test_reserved_user_stack_is_not_freed() {
        let mut stacks = Box::new(StackTable::new());
        let mut heap = Heap::new();
        let mut tcb = Tcb::dormant(TaskId(2));
        tcb.privileged = true;

        let hi = stacks.assign_reserved_user_stack(&mut tcb);
        assert_eq!(hi - tcb.u_stack_lo, U_STACK_SIZE);
        release_user_stack(&mut heap, &mut tcb).expect("nothing to free");
    }
}
