use std::sync::{
    Mutex, PoisonError,
    atomic::{AtomicU8, Ordering},
};

use crossbeam::queue::ArrayQueue;

use super::task::{Outcome, Task, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum SlotState {
    Free,
    Running,
    Ended,
    /// The parent went away without joining; the task frees itself when it ends.
    Detached,
}

impl SlotState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SlotState::Free,
            1 => SlotState::Running,
            2 => SlotState::Ended,
            3 => SlotState::Detached,
            _ => unreachable!("invalid slot state {}", value),
        }
    }
}

#[derive(Debug)]
struct Slot {
    state: AtomicU8,
    /// A finished task waiting for its parent to pick up the outcome.
    parked: Mutex<Option<(Box<Task>, Outcome)>>,
}

impl Slot {
    fn state(&self) -> SlotState {
        SlotState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: SlotState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Fixed set of reusable tasks.
///
/// Idle tasks sit on a lock-free free list. A task is owned by exactly one
/// of the free list, a run queue, the worker executing it, or its slot's
/// parking place once it has ended.
#[derive(Debug)]
pub struct TaskPool {
    slots: Box<[Slot]>,
    free: ArrayQueue<Box<Task>>,
}

impl TaskPool {
    pub fn new(size: usize, stack_size: usize) -> Self {
        let free = ArrayQueue::new(size.max(1));

        for id in 0..size {
            // Capacity covers every task, so this cannot fail.
            let _ = free.push(Box::new(Task::new(Some(TaskId(id as u32)), stack_size)));
        }

        Self {
            slots: (0..size)
                .map(|_| Slot {
                    state: AtomicU8::new(SlotState::Free as u8),
                    parked: Mutex::new(None),
                })
                .collect(),
            free,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of tasks currently on the free list.
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Takes a task off the free list; `None` when every task is in use.
    pub fn alloc(&self) -> Option<Box<Task>> {
        let task = self.free.pop()?;
        self.slot(&task).set_state(SlotState::Running);
        Some(task)
    }

    fn slot(&self, task: &Task) -> &Slot {
        match task.id {
            Some(id) => &self.slots[id.index()],
            None => unreachable!("the root task is not pooled"),
        }
    }

    fn release(&self, mut task: Box<Task>) {
        self.slot(&task).set_state(SlotState::Free);
        task.reset();

        if self.free.push(task).is_err() {
            unreachable!("task returned to a full pool");
        }
    }

    /// Records the outcome of a finished task for its parent, or frees the
    /// task right away when the parent has detached it.
    pub(crate) fn finish(&self, task: Box<Task>, outcome: Outcome) {
        let slot = self.slot(&task);
        let mut parked = slot.parked.lock().unwrap_or_else(PoisonError::into_inner);

        if slot.state() == SlotState::Detached {
            drop(parked);
            tracing::trace!(id = ?task.id, "detached task finished");
            self.release(task);
        } else {
            *parked = Some((task, outcome));
            slot.set_state(SlotState::Ended);
        }
    }

    /// Collects the outcome of `id` if it has ended, returning the task to the pool.
    pub(crate) fn try_join(&self, id: TaskId) -> Option<Outcome> {
        let slot = &self.slots[id.index()];

        if slot.state() != SlotState::Ended {
            return None;
        }

        let parked = slot.parked.lock().unwrap_or_else(PoisonError::into_inner).take();
        parked.map(|(task, outcome)| {
            self.release(task);
            outcome
        })
    }

    /// Gives up on the outcome of `id`.
    pub(crate) fn detach(&self, id: TaskId) {
        let slot = &self.slots[id.index()];
        let mut parked = slot.parked.lock().unwrap_or_else(PoisonError::into_inner);

        match parked.take() {
            Some((task, _)) => {
                drop(parked);
                self.release(task);
            }
            None => slot.set_state(SlotState::Detached),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::vm::{RuntimeError, RuntimeValue};

    #[rstest]
    #[case::empty(0)]
    #[case::single(1)]
    #[case::several(4)]
    fn test_alloc_until_exhausted(#[case] size: usize) {
        let pool = TaskPool::new(size, 16);
        let tasks = (0..size).map(|_| pool.alloc()).collect::<Vec<_>>();

        assert!(tasks.iter().all(Option::is_some));
        assert!(pool.alloc().is_none());
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn test_join_after_finish_recycles_task() {
        let pool = TaskPool::new(1, 16);
        let task = pool.alloc().unwrap();
        let id = task.id.unwrap();

        assert_eq!(pool.try_join(id), None);
        pool.finish(task, Ok(RuntimeValue::Int(5)));
        assert_eq!(pool.available(), 0);
        assert_eq!(pool.try_join(id), Some(Ok(RuntimeValue::Int(5))));
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_fault_is_handed_to_joiner() {
        let pool = TaskPool::new(1, 16);
        let task = pool.alloc().unwrap();
        let id = task.id.unwrap();

        pool.finish(task, Err(RuntimeError::ZeroDivision));
        assert_eq!(pool.try_join(id), Some(Err(RuntimeError::ZeroDivision)));
    }

    #[rstest]
    #[case::detach_before_finish(true)]
    #[case::detach_after_finish(false)]
    fn test_detached_task_returns_to_pool(#[case] detach_first: bool) {
        let pool = TaskPool::new(2, 16);
        let task = pool.alloc().unwrap();
        let id = task.id.unwrap();

        if detach_first {
            pool.detach(id);
            pool.finish(task, Ok(RuntimeValue::Int(1)));
        } else {
            pool.finish(task, Ok(RuntimeValue::Int(1)));
            pool.detach(id);
        }

        assert_eq!(pool.available(), 2);
    }
}
