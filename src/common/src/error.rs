//! System-wide error types for RTX.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Broad failure category of a kernel call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ErrorKind {
    /// Null pointers, zero or malformed sizes, out-of-range ids, reserved priorities.
    InvalidArgument,
    /// No free block large enough, task table full.
    ResourceExhausted,
    /// Freeing memory owned by another task, acting on a privileged task.
    OwnershipViolation,
    /// Acting on a dormant task, calling before initialization.
    PreconditionViolation,
}

/// Heap allocator error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MemError {
    /// Heap region is empty or lies above the RAM upper bound
    InvalidRegion,
    /// Allocation before the heap was initialized
    NotInitialized,
    /// Zero-byte allocation request
    ZeroSize,
    /// No free block can hold the request
    OutOfMemory,
    /// Null pointer passed to deallocate
    NullPointer,
    /// Pointer is outside the heap or not a payload address
    InvalidPointer,
    /// Block is already free
    DoubleFree,
    /// Block belongs to another task
    NotOwner,
}

impl MemError {
    /// Returns the failure category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MemError::InvalidRegion
            | MemError::ZeroSize
            | MemError::NullPointer
            | MemError::InvalidPointer => ErrorKind::InvalidArgument,
            MemError::OutOfMemory => ErrorKind::ResourceExhausted,
            MemError::NotOwner => ErrorKind::OwnershipViolation,
            MemError::NotInitialized | MemError::DoubleFree => ErrorKind::PreconditionViolation,
        }
    }
}

impl fmt::Display for MemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemError::InvalidRegion => write!(f, "invalid heap region"),
            MemError::NotInitialized => write!(f, "heap not initialized"),
            MemError::ZeroSize => write!(f, "zero-size allocation"),
            MemError::OutOfMemory => write!(f, "out of memory"),
            MemError::NullPointer => write!(f, "null pointer"),
            MemError::InvalidPointer => write!(f, "pointer not owned by the heap"),
            MemError::DoubleFree => write!(f, "block already free"),
            MemError::NotOwner => write!(f, "block owned by another task"),
        }
    }
}

/// Task management error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TaskError {
    /// Priority is reserved or out of range
    InvalidPriority,
    /// Stack size below the minimum or not a multiple of 8
    InvalidStackSize,
    /// Task id is the idle task or out of range
    InvalidTaskId,
    /// Maximum number of tasks reached
    TableFull,
    /// User stack allocation failed
    OutOfMemory,
    /// Caller may not act on the target task
    PermissionDenied,
    /// Target task is dormant
    Dormant,
    /// Ready queue has not been initialized
    QueueUninitialized,
    /// Task is not in the ready queue
    NotQueued,
    /// No task is running yet
    NoCurrentTask,
}

impl TaskError {
    /// Returns the failure category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TaskError::InvalidPriority | TaskError::InvalidStackSize | TaskError::InvalidTaskId => {
                ErrorKind::InvalidArgument
            }
            TaskError::TableFull | TaskError::OutOfMemory => ErrorKind::ResourceExhausted,
            TaskError::PermissionDenied => ErrorKind::OwnershipViolation,
            TaskError::Dormant
            | TaskError::QueueUninitialized
            | TaskError::NotQueued
            | TaskError::NoCurrentTask => ErrorKind::PreconditionViolation,
        }
    }
}

impl From<MemError> for TaskError {
    fn from(_: MemError) -> Self {
        TaskError::OutOfMemory
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::InvalidPriority => write!(f, "invalid priority"),
            TaskError::InvalidStackSize => write!(f, "invalid stack size"),
            TaskError::InvalidTaskId => write!(f, "invalid task id"),
            TaskError::TableFull => write!(f, "task table full"),
            TaskError::OutOfMemory => write!(f, "out of memory for task stack"),
            TaskError::PermissionDenied => write!(f, "permission denied"),
            TaskError::Dormant => write!(f, "task is dormant"),
            TaskError::QueueUninitialized => write!(f, "ready queue not initialized"),
            TaskError::NotQueued => write!(f, "task not in ready queue"),
            TaskError::NoCurrentTask => write!(f, "no current task"),
        }
    }
}
