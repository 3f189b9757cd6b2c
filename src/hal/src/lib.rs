//! RTX Hardware Abstraction Layer (HAL) traits.
//!
//! This crate defines traits that abstract away platform-specific hardware details.
//! The kernel core only ever talks to the CPU and the console through them.

#![no_std]

/// Trait for a serial port or similar character-based communication channel.
pub trait Serial {
    /// Writes a single byte to the serial port.
    fn write_byte(&mut self, byte: u8);
    /// Reads a single byte from the serial port, if available.
    ///
    /// Console input hook for board code; the kernel core only writes.
    fn read_byte(&mut self) -> Option<u8>;
}

/// Initial register state requested for a task that has never run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryFrame {
    /// Address of the task's entry procedure.
    pub entry: usize,
    /// Initial user-mode stack pointer (high end of the user stack).
    pub user_stack_top: usize,
    /// Privileged tasks run in the kernel's own mode and get no user frame.
    pub privileged: bool,
}

/// Capability to build and hand off execution contexts.
///
/// Implemented once per target architecture. The scheduler only ever
/// stores the opaque saved stack pointer returned here.
pub trait ContextSwitch {
    /// Fabricates the first resumable frame of a task on its kernel stack.
    ///
    /// `kernel_stack` is the whole kernel stack slot of the task; the frame is
    /// written downward from its high end. Returns the saved stack pointer
    /// (an address inside `kernel_stack`) that [`ContextSwitch::switch`]
    /// resumes from.
    fn build_initial_context(&self, kernel_stack: &mut [usize], frame: &EntryFrame) -> usize;

    /// Saves the caller's resumable state, stores its stack pointer through
    /// `save`, and resumes the context whose saved stack pointer is `restore`.
    ///
    /// Execution continues in the caller at the instruction after this call
    /// once some later switch restores it.
    ///
    /// # Safety
    ///
    /// `save` must be valid for writes and `restore` must be a stack pointer
    /// produced by [`ContextSwitch::build_initial_context`] or stored by a
    /// previous `switch`, whose stack is still live.
    unsafe fn switch(&self, save: *mut usize, restore: usize);
}
