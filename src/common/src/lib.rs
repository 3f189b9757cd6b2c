//! Types shared between the RTX kernel and code that calls into it.

#![no_std]

pub mod error;
pub mod task;

pub use error::{ErrorKind, MemError, TaskError};
pub use task::{Priority, TaskId, TaskInfo, TaskState};
