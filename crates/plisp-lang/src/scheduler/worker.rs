use std::sync::Arc;
use std::thread;

use crossbeam::deque::{Steal, Worker as WorkQueue};

use crate::vm::{self, Step};

use super::{RunQueue, Shared, Spawner, pool::TaskPool, task::Task};

/// State owned by one OS worker thread.
pub(crate) struct WorkerThread {
    pub(crate) index: usize,
    /// Private deque; present only under the work-stealing strategy.
    pub(crate) local: Option<WorkQueue<Box<Task>>>,
    pub(crate) shared: Arc<Shared>,
}

impl WorkerThread {
    pub(crate) fn run(self) {
        tracing::debug!(worker = self.index, "worker started");

        while let Some(task) = self.next_task() {
            self.execute(task);
        }

        tracing::debug!(worker = self.index, "worker stopped");
    }

    /// Blocks until a runnable task is found; `None` on shutdown.
    fn next_task(&self) -> Option<Box<Task>> {
        match &self.shared.queue {
            RunQueue::Shared(queue) => queue.pop(),
            RunQueue::Stealing { signal, .. } => loop {
                if self.shared.is_shutdown() {
                    return None;
                }

                let seen = signal.epoch();
                if let Some(task) = self.find_work() {
                    return Some(task);
                }

                signal.wait(seen, || self.shared.is_shutdown());
            },
        }
    }

    fn find_work(&self) -> Option<Box<Task>> {
        let RunQueue::Stealing {
            injector, stealers, ..
        } = &self.shared.queue
        else {
            return None;
        };
        let local = self.local.as_ref()?;

        if let Some(task) = local.pop() {
            return Some(task);
        }

        loop {
            match injector.steal_batch_and_pop(local) {
                Steal::Success(task) => return Some(task),
                Steal::Empty => break,
                Steal::Retry => continue,
            }
        }

        for offset in 1..stealers.len() {
            let victim = (self.index + offset) % stealers.len();

            loop {
                match stealers[victim].steal() {
                    Steal::Success(task) => {
                        tracing::trace!(worker = self.index, victim, "stole task");
                        return Some(task);
                    }
                    Steal::Empty => break,
                    Steal::Retry => continue,
                }
            }
        }

        None
    }

    fn execute(&self, mut task: Box<Task>) {
        match vm::run(&mut task, self) {
            Step::Finish(value) => self.shared.complete(task, Ok(value)),
            Step::Fault(err) => {
                tracing::debug!(worker = self.index, id = ?task.id, "task faulted: {}", err);
                self.shared.complete(task, Err(err))
            }
            Step::Suspend => {
                self.shared.inject(task);
                thread::yield_now();
            }
            Step::Next => unreachable!("the interpreter loop only stops on a terminal step"),
        }
    }
}

impl Spawner for WorkerThread {
    fn pool(&self) -> &TaskPool {
        &self.shared.pool
    }

    fn spawn(&self, task: Box<Task>) {
        match (&self.local, &self.shared.queue) {
            (Some(local), RunQueue::Stealing { signal, .. }) => {
                local.push(task);
                signal.notify();
            }
            _ => self.shared.inject(task),
        }
    }
}
