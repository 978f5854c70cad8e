use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use crossbeam_channel::Sender;
use smallvec::SmallVec;

use crate::vm::{CodeRef, Program, RuntimeError, RuntimeValue};

/// Result a task hands to whoever waits on it.
pub type Outcome = Result<RuntimeValue, RuntimeError>;

/// Index of a pooled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub(crate) u32);

impl TaskId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// A suspendable execution: its own value stack plus the registers of the
/// interpreter loop.
#[derive(Debug)]
pub struct Task {
    /// `None` for the root task of a top-level form, which is not pooled.
    pub(crate) id: Option<TaskId>,
    pub(crate) stack: Box<[RuntimeValue]>,
    pub(crate) pc: usize,
    pub(crate) base: usize,
    pub(crate) code: CodeRef,
    pub(crate) program: Option<Arc<Program>>,
    /// Spawned children that have not been joined yet.
    pub(crate) children: SmallVec<[TaskId; 4]>,
    pub(crate) completion: Option<Sender<Outcome>>,
}

impl Task {
    pub(crate) fn new(id: Option<TaskId>, stack_size: usize) -> Self {
        Self {
            id,
            stack: vec![RuntimeValue::None; stack_size].into_boxed_slice(),
            pc: 0,
            base: 0,
            code: CodeRef::Entry,
            program: None,
            children: SmallVec::new(),
            completion: None,
        }
    }

    /// Root task running the entry code of `program`; its outcome is sent on `completion`.
    pub(crate) fn root(stack_size: usize, program: Arc<Program>, completion: Sender<Outcome>) -> Self {
        let mut task = Self::new(None, stack_size);
        task.program = Some(program);
        task.completion = Some(completion);
        task
    }

    /// Binds a pooled task to `code` with `args` in its first slots.
    pub(crate) fn start(&mut self, program: Arc<Program>, code: CodeRef, args: &[RuntimeValue]) {
        self.pc = 0;
        self.base = 0;
        self.code = code;
        self.program = Some(program);
        self.stack[..args.len()].copy_from_slice(args);
    }

    /// Drops everything tied to the last run before the task returns to the pool.
    pub(crate) fn reset(&mut self) {
        self.pc = 0;
        self.base = 0;
        self.code = CodeRef::Entry;
        self.program = None;
        self.children.clear();
        self.completion = None;
    }

    pub fn stack_size(&self) -> usize {
        self.stack.len()
    }
}
