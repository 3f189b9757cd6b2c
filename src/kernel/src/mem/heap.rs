//! Kernel heap allocator.
//!
//! Design summary:
//! - One contiguous RAM region, carved into blocks that tile it exactly.
//! - One header per block, placed right before its payload.
//! - FREE blocks form a singly linked list ordered by address; ALLOCATED
//!   blocks stay in place but are unlinked.
//! - First-fit allocation with splitting, iterative forward coalescing on free.
//!
//! Notes:
//! - Links are heap-relative offsets, so a header is the same 12 bytes on
//!   every target.
//! - Every header sits on an 8-byte boundary. The gap between a header and
//!   its payload (head padding) and the gap between a payload and the next
//!   header (tail padding) are both counted in the header's `size`.

use core::mem::size_of;
use core::ptr::{self, NonNull};

use rtx_common::{MemError, TaskId};

use super::MemoryRegion;
use crate::config::HEAP_ALIGN;

/// Size of one block header in bytes.
pub const HEADER_SIZE: usize = size_of::<BlockHeader>();

/// End-of-list marker for `BlockHeader::next`.
const NIL: u32 = u32::MAX;

/// Owner tag of memory that belongs to the OS rather than to a task.
const OS_OWNER: u8 = 0xFF;

const TAG_FREE: u8 = 0;
const TAG_ALLOCATED: u8 = 1;

/// Per-block metadata stored directly in heap memory.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct BlockHeader {
    /// Offset of the next FREE header, or `NIL`.
    next: u32,
    /// Bytes from the end of this header to the next physical header.
    size: u32,
    /// `TAG_FREE` or `TAG_ALLOCATED`.
    state: u8,
    /// Owning task id, or `OS_OWNER`.
    owner: u8,
}

/// Allocation state of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    /// Linked into the free list.
    Free,
    /// Handed out to a caller.
    Allocated,
}

/// Who an allocation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    /// Kernel-owned; any task may free it.
    Os,
    /// Owned by a task; only that task may free it.
    Task(TaskId),
}

impl Owner {
    fn tag(self) -> u8 {
        match self {
            Owner::Os => OS_OWNER,
            Owner::Task(tid) => tid.0,
        }
    }

    fn from_tag(tag: u8) -> Self {
        if tag == OS_OWNER {
            Owner::Os
        } else {
            Owner::Task(TaskId(tag))
        }
    }
}

/// A physical block as seen by [`Heap::blocks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    /// Address of the block header.
    pub header: usize,
    /// Bytes after the header up to the next header.
    pub size: usize,
    /// Allocation state.
    pub state: BlockState,
    /// Owner tag.
    pub owner: Owner,
}

impl Block {
    /// Header plus payload, i.e. the span this block covers.
    pub fn span(&self) -> usize {
        HEADER_SIZE + self.size
    }
}

/// Byte accounting over the whole heap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Bytes managed by the heap, headers included.
    pub capacity: usize,
    /// Bytes covered by FREE blocks, headers included.
    pub free_bytes: usize,
    /// Bytes covered by ALLOCATED blocks, headers included.
    pub allocated_bytes: usize,
    /// Number of FREE blocks.
    pub free_blocks: usize,
    /// Number of ALLOCATED blocks.
    pub allocated_blocks: usize,
}

/// Bytes needed to bring `addr` up to the next `HEAP_ALIGN` boundary.
#[inline]
fn padding(addr: usize) -> usize {
    (HEAP_ALIGN - addr % HEAP_ALIGN) % HEAP_ALIGN
}

/// Bytes needed to bring `addr` down to the previous `HEAP_ALIGN` boundary.
#[inline]
fn reverse_padding(addr: usize) -> usize {
    addr % HEAP_ALIGN
}

#[inline]
fn link(offset: u32) -> Option<u32> {
    (offset != NIL).then_some(offset)
}

#[inline]
fn unlink_value(offset: Option<u32>) -> u32 {
    offset.unwrap_or(NIL)
}

/// First-fit heap over a single RAM region.
#[derive(Debug)]
pub struct Heap {
    /// 8-aligned address of the first header.
    base: usize,
    /// Exclusive upper bound of the region.
    end: usize,
    /// Offset of the lowest FREE header.
    head: Option<u32>,
    initialized: bool,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    /// Creates an uninitialized heap. Every allocation fails until [`Heap::init`].
    pub const fn new() -> Self {
        Self {
            base: 0,
            end: 0,
            head: None,
            initialized: false,
        }
    }

    /// Lays one FREE block over `region`.
    ///
    /// The start is aligned up to 8 bytes and the end down to 8 bytes, so every
    /// block ends on an 8-byte boundary. Calling `init` again discards
    /// every existing block.
    ///
    /// # Safety
    ///
    /// `region` must be valid, writable memory that nothing else uses for as
    /// long as this heap hands out blocks from it.
    pub unsafe fn init(&mut self, region: MemoryRegion) -> Result<(), MemError> {
        let base = region
            .start
            .checked_add(padding(region.start))
            .ok_or(MemError::InvalidRegion)?;
        let end = region.end - reverse_padding(region.end);
        let first_payload = base.checked_add(HEADER_SIZE).ok_or(MemError::InvalidRegion)?;
        if first_payload >= end {
            return Err(MemError::InvalidRegion);
        }
        let capacity = end - base;
        if capacity >= NIL as usize {
            return Err(MemError::InvalidRegion);
        }

        self.base = base;
        self.end = end;
        self.write(
            0,
            BlockHeader {
                next: NIL,
                size: (capacity - HEADER_SIZE) as u32,
                state: TAG_FREE,
                owner: OS_OWNER,
            },
        );
        self.head = Some(0);
        self.initialized = true;

        log::info!(
            "heap: {:#x}..{:#x} ({} bytes, header {} bytes)",
            base,
            end,
            capacity,
            HEADER_SIZE
        );
        Ok(())
    }

    /// Returns whether [`Heap::init`] succeeded.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Bytes managed by the heap, headers included.
    pub fn capacity(&self) -> usize {
        if self.initialized {
            self.end - self.base
        } else {
            0
        }
    }

    /// Allocates `size` bytes tagged with `owner`.
    ///
    /// Scans the free list in address order and takes the first block that
    /// can hold the request plus alignment padding. The block is split when a
    /// header and at least one byte fit in the remainder.
    pub fn allocate(&mut self, size: usize, owner: Owner) -> Result<NonNull<u8>, MemError> {
        if size == 0 {
            return Err(MemError::ZeroSize);
        }
        if !self.initialized {
            return Err(MemError::NotInitialized);
        }

        let mut prev = None;
        let mut cursor = self.head;
        while let Some(offset) = cursor {
            let mut block = self.read(offset);
            let header = self.address(offset);
            let head_pad = padding(header + HEADER_SIZE);
            let payload = header + HEADER_SIZE + head_pad;
            let needed = payload
                .checked_add(size)
                .map(|payload_end| size + head_pad + padding(payload_end));

            match needed {
                Some(needed) if block.size as usize >= needed => {
                    let remainder = if block.size as usize > needed + HEADER_SIZE {
                        let split = offset + (HEADER_SIZE + needed) as u32;
                        self.write(
                            split,
                            BlockHeader {
                                next: block.next,
                                size: block.size - (HEADER_SIZE + needed) as u32,
                                state: TAG_FREE,
                                owner: OS_OWNER,
                            },
                        );
                        block.size = needed as u32;
                        Some(split)
                    } else {
                        link(block.next)
                    };

                    self.set_next(prev, remainder);
                    block.next = NIL;
                    block.state = TAG_ALLOCATED;
                    block.owner = owner.tag();
                    self.write(offset, block);

                    log::debug!(
                        "heap: alloc {} bytes at {:#x} (block {} bytes, {:?})",
                        size,
                        payload,
                        block.size,
                        owner
                    );
                    return NonNull::new(payload as *mut u8).ok_or(MemError::OutOfMemory);
                }
                _ => {
                    prev = Some(offset);
                    cursor = link(block.next);
                }
            }
        }

        log::debug!("heap: no block fits {} bytes", size);
        Err(MemError::OutOfMemory)
    }

    /// Returns the block behind `ptr` to the free list on behalf of `caller`.
    ///
    /// Fails without touching the heap if `ptr` is null, is not a payload
    /// address handed out by this heap, is already free, or belongs to a task
    /// other than `caller` (OS-owned blocks may be freed by anyone).
    pub fn deallocate(&mut self, ptr: *mut u8, caller: TaskId) -> Result<(), MemError> {
        if ptr.is_null() {
            return Err(MemError::NullPointer);
        }
        let offset = self
            .header_of(ptr as usize)
            .ok_or(MemError::InvalidPointer)?;
        let mut block = self.read(offset);

        if block.state == TAG_FREE {
            return Err(MemError::DoubleFree);
        }
        if block.owner != OS_OWNER && block.owner != caller.0 {
            log::warn!(
                "heap: {} may not free {:#x} owned by {:?}",
                caller,
                ptr as usize,
                Owner::from_tag(block.owner)
            );
            return Err(MemError::NotOwner);
        }

        let mut prev = None;
        let mut cursor = self.head;
        while let Some(free) = cursor {
            if free > offset {
                break;
            }
            prev = Some(free);
            cursor = link(self.read(free).next);
        }

        block.next = unlink_value(cursor);
        block.state = TAG_FREE;
        block.owner = OS_OWNER;
        self.write(offset, block);
        self.set_next(prev, Some(offset));

        log::debug!("heap: free {:#x} ({} bytes)", ptr as usize, block.size);
        self.coalesce();
        Ok(())
    }

    /// Counts FREE blocks whose header plus payload is smaller than `threshold`.
    pub fn count_external_fragments(&self, threshold: usize) -> usize {
        self.free_blocks()
            .filter(|block| block.span() < threshold)
            .count()
    }

    /// Address of the header that follows the block owning `ptr`.
    ///
    /// This is the 8-aligned high end of the allocation, padding included.
    pub fn block_end(&self, ptr: *const u8) -> Option<usize> {
        let offset = self.header_of(ptr as usize)?;
        let block = self.read(offset);
        Some(self.address(offset) + HEADER_SIZE + block.size as usize)
    }

    /// Iterates over every physical block in address order.
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks {
            heap: self,
            offset: if self.initialized { Some(0) } else { None },
        }
    }

    /// Iterates over the free list in list order.
    pub fn free_blocks(&self) -> FreeBlocks<'_> {
        FreeBlocks {
            heap: self,
            cursor: if self.initialized { self.head } else { None },
        }
    }

    /// Sums block spans per state.
    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats {
            capacity: self.capacity(),
            ..HeapStats::default()
        };
        for block in self.blocks() {
            match block.state {
                BlockState::Free => {
                    stats.free_bytes += block.span();
                    stats.free_blocks += 1;
                }
                BlockState::Allocated => {
                    stats.allocated_bytes += block.span();
                    stats.allocated_blocks += 1;
                }
            }
        }
        stats
    }

    /// Writes every block to the trace log.
    pub fn dump(&self) {
        for block in self.blocks() {
            log::trace!(
                "heap: {:#x} size {} {:?} {:?}",
                block.header,
                block.size,
                block.state,
                block.owner
            );
        }
    }

    /// Merges physically adjacent neighbours on the free list.
    ///
    /// Only FREE blocks are linked, so two consecutive list entries that touch
    /// have nothing allocated between them.
    fn coalesce(&mut self) {
        let mut cursor = self.head;
        while let Some(offset) = cursor {
            let mut block = self.read(offset);
            let Some(next) = link(block.next) else {
                break;
            };
            if offset as usize + HEADER_SIZE + block.size as usize == next as usize {
                let absorbed = self.read(next);
                block.size += HEADER_SIZE as u32 + absorbed.size;
                block.next = absorbed.next;
                self.write(offset, block);
            } else {
                cursor = Some(next);
            }
        }
    }

    /// Finds the header of the block whose payload starts at `payload`.
    ///
    /// Walks back over the header and its head padding, then confirms the
    /// result against the physical block chain so a stray pointer never
    /// reinterprets payload bytes as a header.
    fn header_of(&self, payload: usize) -> Option<u32> {
        if !self.initialized
            || payload % HEAP_ALIGN != 0
            || payload < self.base + HEADER_SIZE
            || payload >= self.end
        {
            return None;
        }
        let unpadded = payload - HEADER_SIZE;
        let header = unpadded - reverse_padding(unpadded);
        let offset = (header - self.base) as u32;
        self.blocks()
            .take_while(|block| block.header <= header)
            .any(|block| block.header == header)
            .then_some(offset)
    }

    /// Points `prev` (or the list head) at `next`.
    fn set_next(&mut self, prev: Option<u32>, next: Option<u32>) {
        match prev {
            Some(prev) => {
                let mut block = self.read(prev);
                block.next = unlink_value(next);
                self.write(prev, block);
            }
            None => self.head = next,
        }
    }

    #[inline]
    fn address(&self, offset: u32) -> usize {
        self.base + offset as usize
    }

    #[inline]
    fn read(&self, offset: u32) -> BlockHeader {
        // SAFETY:
        // - Offsets only come from headers this heap wrote inside the region
        //   passed to `init`, whose validity the caller of `init` guarantees.
        // - Headers sit on 8-byte boundaries, satisfying `BlockHeader` alignment.
        unsafe { ptr::read(self.address(offset) as *const BlockHeader) }
    }

    #[inline]
    fn write(&mut self, offset: u32, header: BlockHeader) {
        // SAFETY: same region and alignment argument as `read`.
        unsafe { ptr::write(self.address(offset) as *mut BlockHeader, header) }
    }
}

/// Iterator over physical blocks, see [`Heap::blocks`].
pub struct Blocks<'a> {
    heap: &'a Heap,
    offset: Option<u32>,
}

impl Iterator for Blocks<'_> {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        let offset = self.offset?;
        let header = self.heap.read(offset);
        let next = offset as usize + HEADER_SIZE + header.size as usize;
        self.offset = (next + HEADER_SIZE <= self.heap.capacity()).then_some(next as u32);
        Some(Block {
            header: self.heap.address(offset),
            size: header.size as usize,
            state: if header.state == TAG_ALLOCATED {
                BlockState::Allocated
            } else {
                BlockState::Free
            },
            owner: Owner::from_tag(header.owner),
        })
    }
}

/// Iterator over the free list, see [`Heap::free_blocks`].
pub struct FreeBlocks<'a> {
    heap: &'a Heap,
    cursor: Option<u32>,
}

impl Iterator for FreeBlocks<'_> {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        let offset = self.cursor?;
        let header = self.heap.read(offset);
        self.cursor = link(header.next);
        Some(Block {
            header: self.heap.address(offset),
            size: header.size as usize,
            state: BlockState::Free,
            owner: Owner::from_tag(header.owner),
        })
    }
}
