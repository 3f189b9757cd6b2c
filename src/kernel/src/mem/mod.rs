//! Memory management: the kernel heap and per-task stack provisioning.

pub mod heap;
pub mod stack;

pub use heap::{Block, BlockState, Blocks, FreeBlocks, Heap, HeapStats, Owner, HEADER_SIZE};
pub use stack::{release_user_stack, reserve_user_stack, StackTable};

/// A physical RAM range `[start, end)` handed to the heap at boot.
///
/// `start` is the first byte after the static image and `end` the RAM upper
/// bound supplied by the linker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    /// First usable address.
    pub start: usize,
    /// Exclusive upper bound.
    pub end: usize,
}

impl MemoryRegion {
    /// Creates a region from its bounds.
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}
