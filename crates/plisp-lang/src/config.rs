use std::{env, fmt, str::FromStr};

/// Default number of optimizer inlining rounds.
pub const DEFAULT_INLINE_DEPTH: usize = 2;
pub const DEFAULT_WORKERS: usize = 5;
/// Slots in each task's private value stack.
pub const DEFAULT_TASK_STACK_SIZE: usize = 16 * 1024;
/// Code size, in words, past which the optimizer stops inlining.
pub const DEFAULT_CODE_SIZE_BUDGET: usize = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerKind {
    /// Per-worker deques with stealing from the opposite end.
    #[default]
    WorkStealing,
    /// One ring buffer shared by every worker.
    SharedQueue,
}

impl FromStr for SchedulerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "work-stealing" | "work_stealing" | "stealing" => Ok(SchedulerKind::WorkStealing),
            "shared-queue" | "shared_queue" | "shared" => Ok(SchedulerKind::SharedQueue),
            _ => Err(format!("unknown scheduler `{}`", s)),
        }
    }
}

impl fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerKind::WorkStealing => write!(f, "work-stealing"),
            SchedulerKind::SharedQueue => write!(f, "shared-queue"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Number of inlining rounds run on every compiled function.
    pub inline_depth: usize,
    pub workers: usize,
    /// Emits the final bytecode of every compiled function on the `plisp::ir` target.
    pub show_ir: bool,
    pub optimize: bool,
    /// Compiles calls in operand position as spawned tasks.
    pub spawn: bool,
    /// Capacity of the task pool; `None` derives it from `workers`.
    pub task_pool_size: Option<usize>,
    pub task_stack_size: usize,
    pub code_size_budget: usize,
    pub scheduler: SchedulerKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            inline_depth: DEFAULT_INLINE_DEPTH,
            workers: DEFAULT_WORKERS,
            show_ir: false,
            optimize: true,
            spawn: true,
            task_pool_size: None,
            task_stack_size: DEFAULT_TASK_STACK_SIZE,
            code_size_budget: DEFAULT_CODE_SIZE_BUDGET,
            scheduler: SchedulerKind::default(),
        }
    }
}

impl Config {
    /// Default configuration overridden by `PLISP_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        parse_env("PLISP_INLINE_DEPTH", &mut config.inline_depth);
        parse_env("PLISP_WORKERS", &mut config.workers);
        parse_env("PLISP_SHOW_IR", &mut config.show_ir);
        parse_env("PLISP_TASK_STACK_SIZE", &mut config.task_stack_size);
        parse_env("PLISP_SCHEDULER", &mut config.scheduler);

        if let Ok(size) = env::var("PLISP_TASK_POOL_SIZE") {
            match size.parse::<usize>() {
                Ok(size) => config.task_pool_size = Some(size),
                Err(_) => {
                    tracing::warn!("Invalid PLISP_TASK_POOL_SIZE value '{}', using default", size)
                }
            }
        }

        config
    }

    /// Worker count clamped to at least one thread.
    pub fn worker_count(&self) -> usize {
        self.workers.max(1)
    }

    pub fn pool_size(&self) -> usize {
        self.task_pool_size
            .unwrap_or_else(|| self.worker_count() * 3 / 2)
    }

    pub fn with_inline_depth(mut self, inline_depth: usize) -> Self {
        self.inline_depth = inline_depth;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_show_ir(mut self, show_ir: bool) -> Self {
        self.show_ir = show_ir;
        self
    }

    pub fn with_optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    pub fn with_spawn(mut self, spawn: bool) -> Self {
        self.spawn = spawn;
        self
    }

    pub fn with_task_pool_size(mut self, size: usize) -> Self {
        self.task_pool_size = Some(size);
        self
    }

    pub fn with_task_stack_size(mut self, size: usize) -> Self {
        self.task_stack_size = size;
        self
    }

    pub fn with_scheduler(mut self, scheduler: SchedulerKind) -> Self {
        self.scheduler = scheduler;
        self
    }
}

fn parse_env<T>(name: &str, target: &mut T)
where
    T: FromStr + fmt::Debug,
{
    if let Ok(value) = env::var(name) {
        match value.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!(
                "Invalid {} value '{}', using default {:?}",
                name,
                value,
                target
            ),
        }
    }
}
