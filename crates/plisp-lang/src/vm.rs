//! Threaded-code interpreter for a single task.
mod dispatch;
mod error;
mod runtime_value;
mod threaded;

pub use dispatch::Step;
pub use error::RuntimeError;
pub use runtime_value::{CodeRef, RuntimeValue};
pub use threaded::{Program, ThreadedCode, lower};

use std::sync::Arc;

use crate::{
    bytecode::Reg,
    scheduler::{Spawner, Task},
};

/// Interpreter registers for one run of a task.
pub struct Machine<'a> {
    pub(crate) task: &'a mut Task,
    pub(crate) program: &'a Program,
    /// Code object `task.code` refers to.
    pub(crate) code: &'a ThreadedCode,
    pub(crate) spawner: &'a dyn Spawner,
}

impl<'a> Machine<'a> {
    #[inline(always)]
    pub(crate) fn get(&self, reg: Reg) -> RuntimeValue {
        self.task.stack[self.task.base + reg as usize]
    }

    #[inline(always)]
    pub(crate) fn int(&self, reg: Reg) -> Result<i64, RuntimeError> {
        self.get(reg).int()
    }

    #[inline(always)]
    pub(crate) fn integral(&self, reg: Reg) -> Result<i64, RuntimeError> {
        self.get(reg).integral()
    }

    #[inline(always)]
    pub(crate) fn set(&mut self, reg: Reg, value: RuntimeValue) {
        self.task.stack[self.task.base + reg as usize] = value;
    }

    #[inline(always)]
    pub(crate) fn next(&mut self) -> Step {
        self.task.pc += 1;
        Step::Next
    }

    /// Switches to `code` at `pc` with the frame starting at `base`.
    #[inline(always)]
    pub(crate) fn enter(&mut self, code: CodeRef, pc: usize, base: usize) {
        self.code = self.program.code(code);
        self.task.code = code;
        self.task.pc = pc;
        self.task.base = base;
    }
}

/// Runs `task` until it finishes, faults or has to wait on a child.
///
/// A suspended task keeps its program counter on the `JOIN` that stopped it,
/// so running it again retries the join.
pub fn run(task: &mut Task, spawner: &dyn Spawner) -> Step {
    let Some(program) = task.program.as_ref().map(Arc::clone) else {
        unreachable!("task scheduled without a program");
    };
    let code = program.code(task.code);

    if task.base + code.frame_size > task.stack.len() {
        return Step::Fault(RuntimeError::StackOverflow);
    }

    let mut machine = Machine {
        task,
        program: &program,
        code,
        spawner,
    };

    loop {
        let code = machine.code;
        let threaded = &code.insts[machine.task.pc];

        match (threaded.exec)(&mut machine, &threaded.inst) {
            Step::Next => {}
            step => return step,
        }
    }
}
