//! Compile-time kernel configuration.
//!
//! These mirror the sizes baked into the static image by the linker script:
//! the TCB table, one kernel stack per task and one reserved user stack per
//! task all live below the heap.

/// Number of task slots, including the null task in slot 0.
pub const MAX_TASKS: usize = 16;

/// Size of each task's kernel stack in bytes.
pub const K_STACK_SIZE: usize = 0x200;

/// Size of each reserved user stack, and the minimum user stack a task may request.
pub const U_STACK_SIZE: usize = 0x200;

/// Alignment of every heap payload and every stack top.
pub const HEAP_ALIGN: usize = 8;
