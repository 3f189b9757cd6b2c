//! Next-task selection and the switch decision.

use rtx_common::{TaskError, TaskId, TaskState};

use super::TaskTable;

/// A context switch decided by the scheduler but not yet performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Switch {
    /// Task whose context is saved.
    pub from: TaskId,
    /// Task whose context is restored.
    pub to: TaskId,
}

impl TaskTable {
    /// Picks the task that should run next and unlinks it from the queue.
    ///
    /// The first READY entry wins. The idle task at the tail is returned
    /// without being unlinked, also when nothing else is READY.
    pub fn select_next(&mut self) -> Option<TaskId> {
        let head = self.head?;
        let first = *self.slot(head);
        if first.state == TaskState::Ready {
            if first.next.is_some() {
                self.head = first.next;
                self.slot_mut(head).next = None;
            }
            return Some(head);
        }

        let mut prev = head;
        while let Some(cursor) = self.slot(prev).next {
            let tcb = *self.slot(cursor);
            if tcb.next.is_none() {
                return Some(cursor);
            }
            if tcb.state == TaskState::Ready {
                self.unlink(prev, cursor);
                return Some(cursor);
            }
            prev = cursor;
        }
        Some(prev)
    }

    /// Whether the queue head is READY and strictly outranks the running task.
    pub fn head_outranks_current(&self) -> bool {
        match (self.head, self.current) {
            (Some(head), Some(current)) => {
                let head = self.slot(head);
                head.state == TaskState::Ready
                    && head.priority.is_higher_than(self.slot(current).priority)
            }
            _ => false,
        }
    }

    /// Hands the CPU to the best ready task.
    ///
    /// The outgoing task goes back to the queue as READY unless it has exited.
    /// Returns the switch to perform, or `None` when the current task keeps
    /// running.
    pub fn reschedule(&mut self) -> Result<Option<Switch>, TaskError> {
        let from = self.current.ok_or(TaskError::NoCurrentTask)?;
        let to = self.select_next().ok_or(TaskError::QueueUninitialized)?;
        if to == from {
            return Ok(None);
        }

        self.slot_mut(to).state = TaskState::Running;
        if self.slot(from).state != TaskState::Dormant {
            self.slot_mut(from).state = TaskState::Ready;
            if !from.is_null() {
                self.insert(from)?;
            }
        }
        self.current = Some(to);

        log::debug!("switch {} -> {}", from, to);
        Ok(Some(Switch { from, to }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Tcb;
    use rtx_common::Priority;

    fn table_with_idle() -> TaskTable {
        let mut table = TaskTable::new();
        let mut idle = Tcb::dormant(TaskId::NULL);
        idle.priority = Priority::NULL;
        table.install_idle(idle);
        table
    }

    fn ready(table: &mut TaskTable, tid: u8, priority: Priority) {
        let tcb = table.tcb_mut(TaskId(tid)).expect("slot");
        tcb.priority = priority;
        tcb.state = TaskState::Ready;
        table.activated();
        table.insert(TaskId(tid)).expect("insert");
    }

    #[test]
    fn test_idle_alone_keeps_running() {
        let mut table = table_with_idle();
        assert_eq!(table.select_next(), Some(TaskId::NULL));
        assert_eq!(table.reschedule(), Ok(None));
        assert_eq!(table.head(), Some(TaskId::NULL));
    }

    #[test]
    fn test_idle_hands_over_to_ready_head() {
        let mut table = table_with_idle();
        ready(&mut table, 1, Priority::MEDIUM);
        ready(&mut table, 2, Priority::HIGH);

        let switch = table.reschedule().expect("reschedule");
        assert_eq!(
            switch,
            Some(Switch {
                from: TaskId::NULL,
                to: TaskId(2)
            })
        );
        assert_eq!(table.current(), Some(TaskId(2)));
        assert_eq!(table.tcb(TaskId(2)).expect("slot").state, TaskState::Running);
        assert_eq!(table.tcb(TaskId::NULL).expect("slot").state, TaskState::Ready);
        let queued: Vec<TaskId> = table.iter().collect();
        assert_eq!(queued, vec![TaskId(1), TaskId::NULL]);
    }

    #[test]
    fn test_outgoing_task_requeued_behind_equal_priority() {
        let mut table = table_with_idle();
        ready(&mut table, 1, Priority::HIGH);
        ready(&mut table, 2, Priority::HIGH);
        table.reschedule().expect("to 1");

        let switch = table.reschedule().expect("to 2");
        assert_eq!(switch.map(|s| s.to), Some(TaskId(2)));
        let queued: Vec<TaskId> = table.iter().collect();
        assert_eq!(queued, vec![TaskId(1), TaskId::NULL]);
    }

    #[test]
    fn test_exited_task_not_requeued() {
        let mut table = table_with_idle();
        ready(&mut table, 1, Priority::HIGH);
        table.reschedule().expect("to 1");
        table.tcb_mut(TaskId(1)).expect("slot").state = TaskState::Dormant;

        let switch = table.reschedule().expect("back to idle");
        assert_eq!(switch.map(|s| s.to), Some(TaskId::NULL));
        let queued: Vec<TaskId> = table.iter().collect();
        assert_eq!(queued, vec![TaskId::NULL]);
        assert_eq!(table.tcb(TaskId::NULL).expect("slot").state, TaskState::Running);
    }

    #[test]
    fn test_head_outranks_current_is_strict() {
        let mut table = table_with_idle();
        ready(&mut table, 1, Priority::MEDIUM);
        table.reschedule().expect("to 1");
        ready(&mut table, 2, Priority::MEDIUM);
        assert!(!table.head_outranks_current());
        ready(&mut table, 3, Priority::HIGH);
        assert!(table.head_outranks_current());
    }
}
