//! Priority-ordered ready queue threaded through the task table.
//!
//! Entries are sorted by ascending priority value and kept FIFO among equal
//! priorities. The idle task sits at the tail for the whole life of the
//! kernel and is never unlinked.

use rtx_common::{Priority, TaskError, TaskId};

use super::TaskTable;
use crate::config::MAX_TASKS;

impl TaskTable {
    /// Links `tid` into the ready queue behind every entry of equal or higher priority.
    pub fn insert(&mut self, tid: TaskId) -> Result<(), TaskError> {
        let head = self.head.ok_or(TaskError::QueueUninitialized)?;
        if tid.index() >= MAX_TASKS {
            return Err(TaskError::InvalidTaskId);
        }
        if self.active > MAX_TASKS {
            return Err(TaskError::TableFull);
        }

        let priority = self.slot(tid).priority;
        if priority.is_higher_than(self.slot(head).priority) {
            self.slot_mut(tid).next = Some(head);
            self.head = Some(tid);
            return Ok(());
        }

        let mut prev = head;
        while let Some(next) = self.slot(prev).next {
            if priority.is_higher_than(self.slot(next).priority) {
                break;
            }
            prev = next;
        }
        self.slot_mut(tid).next = self.slot(prev).next;
        self.slot_mut(prev).next = Some(tid);
        Ok(())
    }

    /// Unlinks `tid` from the ready queue.
    pub fn remove(&mut self, tid: TaskId) -> Result<(), TaskError> {
        if tid.is_null() || tid.index() >= MAX_TASKS {
            return Err(TaskError::InvalidTaskId);
        }
        let head = self.head.ok_or(TaskError::QueueUninitialized)?;
        if head == tid {
            self.head = self.slot(tid).next;
            self.slot_mut(tid).next = None;
            return Ok(());
        }

        let mut prev = head;
        while let Some(next) = self.slot(prev).next {
            if next == tid {
                self.unlink(prev, tid);
                return Ok(());
            }
            prev = next;
        }
        Err(TaskError::NotQueued)
    }

    /// Moves a queued task to the position its new priority calls for.
    pub fn reprioritize(&mut self, tid: TaskId, priority: Priority) -> Result<(), TaskError> {
        self.remove(tid)?;
        self.slot_mut(tid).priority = priority;
        self.insert(tid)
    }

    /// Walks the ready queue from the head.
    pub fn iter(&self) -> QueueIter<'_> {
        QueueIter {
            table: self,
            cursor: self.head,
        }
    }

    /// Splices `tid` out, given its predecessor.
    pub(super) fn unlink(&mut self, prev: TaskId, tid: TaskId) {
        self.slot_mut(prev).next = self.slot(tid).next;
        self.slot_mut(tid).next = None;
    }
}

/// Iterator over queued task ids, see [`TaskTable::iter`].
pub struct QueueIter<'a> {
    table: &'a TaskTable,
    cursor: Option<TaskId>,
}

impl Iterator for QueueIter<'_> {
    type Item = TaskId;

    fn next(&mut self) -> Option<TaskId> {
        let tid = self.cursor?;
        self.cursor = self.table.slot(tid).next;
        Some(tid)
    }
}
