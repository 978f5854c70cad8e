//! Task pool and worker threads that run compiled programs.
pub mod pool;
pub mod queue;
pub mod task;
mod worker;

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread::{self, JoinHandle};

use crossbeam::deque::{Injector, Stealer, Worker as WorkQueue};

pub use pool::TaskPool;
pub use task::{Outcome, Task, TaskId};

use crate::{
    config::{Config, SchedulerKind},
    vm::{Program, RuntimeError},
};
use queue::{RingQueue, Signal};
use worker::WorkerThread;

/// Where the interpreter hands the tasks it spawns.
pub trait Spawner {
    fn pool(&self) -> &TaskPool;

    /// Makes a freshly started task runnable.
    fn spawn(&self, task: Box<Task>);
}

pub(crate) enum RunQueue {
    Stealing {
        /// Root tasks and tasks suspended on a join.
        injector: Injector<Box<Task>>,
        stealers: Vec<Stealer<Box<Task>>>,
        signal: Signal,
    },
    Shared(RingQueue<Box<Task>>),
}

pub(crate) struct Shared {
    pub(crate) pool: TaskPool,
    pub(crate) queue: RunQueue,
    shutdown: AtomicBool,
}

impl Shared {
    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Queues `task` behind everything already waiting.
    pub(crate) fn inject(&self, task: Box<Task>) {
        match &self.queue {
            RunQueue::Stealing {
                injector, signal, ..
            } => {
                injector.push(task);
                signal.notify();
            }
            RunQueue::Shared(queue) => queue.push(task),
        }
    }

    /// Hands the outcome of a finished task to whoever waits for it.
    pub(crate) fn complete(&self, mut task: Box<Task>, outcome: Outcome) {
        for child in task.children.drain(..) {
            self.pool.detach(child);
        }

        match task.id {
            Some(_) => self.pool.finish(task, outcome),
            None => {
                if let Some(completion) = task.completion.take() {
                    // The receiver is gone only when the caller stopped waiting.
                    let _ = completion.send(outcome);
                }
            }
        }
    }
}

/// A fixed set of worker threads sharing one task pool.
pub struct Scheduler {
    shared: Arc<Shared>,
    threads: Vec<JoinHandle<()>>,
    kind: SchedulerKind,
    stack_size: usize,
}

impl Scheduler {
    pub fn new(config: &Config) -> Self {
        let workers = config.worker_count();
        let pool = TaskPool::new(config.pool_size(), config.task_stack_size);
        let mut locals = Vec::with_capacity(workers);

        let queue = match config.scheduler {
            SchedulerKind::WorkStealing => {
                locals.extend((0..workers).map(|_| Some(WorkQueue::new_lifo())));
                RunQueue::Stealing {
                    injector: Injector::new(),
                    stealers: locals
                        .iter()
                        .flatten()
                        .map(WorkQueue::stealer)
                        .collect(),
                    signal: Signal::default(),
                }
            }
            SchedulerKind::SharedQueue => {
                locals.extend((0..workers).map(|_| None));
                // Every live task fits: the pool plus one root.
                RunQueue::Shared(RingQueue::new(pool.capacity() + 1))
            }
        };

        let shared = Arc::new(Shared {
            pool,
            queue,
            shutdown: AtomicBool::new(false),
        });

        let threads = locals
            .into_iter()
            .enumerate()
            .filter_map(|(index, local)| {
                let worker = WorkerThread {
                    index,
                    local,
                    shared: Arc::clone(&shared),
                };

                thread::Builder::new()
                    .name(format!("plisp-worker-{}", index))
                    .spawn(move || worker.run())
                    .map_err(|err| tracing::error!("failed to spawn worker {}: {}", index, err))
                    .ok()
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            scheduler = %config.scheduler,
            workers = threads.len(),
            pool = shared.pool.capacity(),
            "scheduler started"
        );

        Self {
            shared,
            threads,
            kind: config.scheduler,
            stack_size: config.task_stack_size,
        }
    }

    /// Runs the entry code of `program` as a root task and waits for its result.
    pub fn run(&self, program: Arc<Program>) -> Outcome {
        if self.threads.is_empty() {
            return Err(RuntimeError::WorkerDisconnected);
        }

        let (sender, receiver) = crossbeam_channel::bounded(1);
        self.shared
            .inject(Box::new(Task::root(self.stack_size, program, sender)));

        receiver
            .recv()
            .unwrap_or(Err(RuntimeError::WorkerDisconnected))
    }

    pub fn pool(&self) -> &TaskPool {
        &self.shared.pool
    }

    pub fn workers(&self) -> usize {
        self.threads.len()
    }

    pub fn kind(&self) -> SchedulerKind {
        self.kind
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);

        match &self.shared.queue {
            RunQueue::Stealing { signal, .. } => signal.notify_all(),
            RunQueue::Shared(queue) => queue.close(),
        }

        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }

        tracing::debug!("scheduler stopped");
    }
}
