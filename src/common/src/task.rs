//! Task identifiers, priorities and descriptor snapshots.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A small integer naming a task slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TaskId(pub u8);

impl TaskId {
    /// The null (idle) task, always present.
    pub const NULL: TaskId = TaskId(0);

    /// Slot index of this task in the task table.
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns `true` for the null task.
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tid {}", self.0)
    }
}

/// Scheduling priority. Smaller values run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Priority(pub u8);

impl Priority {
    /// Reserved for real-time tasks; never accepted from callers.
    pub const RT: Priority = Priority(0x00);
    /// Highest priority available to ordinary tasks.
    pub const HIGH: Priority = Priority(0x80);
    /// Medium priority.
    pub const MEDIUM: Priority = Priority(0x81);
    /// Low priority.
    pub const LOW: Priority = Priority(0x82);
    /// Lowest ordinary priority.
    pub const LOWEST: Priority = Priority(0x83);
    /// Reserved for the null task.
    pub const NULL: Priority = Priority(0xFF);

    /// Returns `true` if `self` runs strictly before `other`.
    pub const fn is_higher_than(self, other: Priority) -> bool {
        self.0 < other.0
    }

    /// Returns `true` for the two reserved extremes.
    pub const fn is_reserved(self) -> bool {
        self.0 == Self::RT.0 || self.0 == Self::NULL.0
    }
}

/// Lifecycle state of a task slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TaskState {
    /// Slot unused, or task has exited.
    Dormant,
    /// Eligible to run, waiting in the ready queue.
    Ready,
    /// Currently executing.
    Running,
}

/// Snapshot of a task descriptor returned by `get_info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TaskInfo {
    /// Task id.
    pub tid: TaskId,
    /// Current priority.
    pub priority: Priority,
    /// Current lifecycle state.
    pub state: TaskState,
    /// Whether the task runs in the kernel's mode.
    pub privileged: bool,
    /// Entry procedure address.
    pub entry: usize,
    /// High end of the kernel stack.
    pub k_stack_hi: usize,
    /// Kernel stack size in bytes.
    pub k_stack_size: usize,
    /// High end of the user stack.
    pub u_stack_hi: usize,
    /// User stack size in bytes.
    pub u_stack_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        assert!(Priority::HIGH.is_higher_than(Priority::LOW));
        assert!(!Priority::LOW.is_higher_than(Priority::LOW));
        assert!(Priority::LOWEST.is_higher_than(Priority::NULL));
        assert!(Priority::RT.is_reserved());
        assert!(Priority::NULL.is_reserved());
        assert!(!Priority::MEDIUM.is_reserved());
    }

    #[test]
    fn test_task_id_index() {
        assert!(TaskId::NULL.is_null());
        assert_eq!(TaskId(5).index(), 5);
    }
}
