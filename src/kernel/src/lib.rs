//! RTX Kernel
//!
//! The core of a small real-time kernel for ARMv7-A: a first-fit heap over a
//! single RAM region and a priority-based cooperative scheduler.
//!
//! # Architecture
//!
//! The kernel is structured into the following modules:
//! - `mem`: heap allocator and stack provisioning
//! - `task`: task control blocks, ready queue, scheduler and lifecycle calls
//! - `arch`: context frames and the context switch (ARMv7-A)
//! - `sync`: the kernel cell serializing kernel calls
//! - `logger`: `log` backend over a serial port
//!
//! # Safety
//!
//! This is a `#![no_std]` kernel. All unsafe code is documented with safety
//! invariants explaining why the usage is correct.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

pub mod arch;
pub mod config;
pub mod kernel;
pub mod logger;
pub mod mem;
pub mod sync;
pub mod task;

#[cfg(test)]
mod testutil;


pub use kernel::Kernel;
pub use mem::MemoryRegion;
pub use sync::KernelCell;
pub use task::{TaskEntry, TaskInit};

pub use rtx_common::{MemError, Priority, TaskError, TaskId, TaskInfo, TaskState};
