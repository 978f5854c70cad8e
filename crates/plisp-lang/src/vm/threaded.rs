use std::fmt;
use std::sync::Arc;

use crate::{
    bytecode::{FuncId, Inst},
    context::FuncTable,
};

use super::{
    dispatch::{self, Handler},
    runtime_value::CodeRef,
};

/// An instruction paired with the handler that executes it.
#[derive(Clone)]
pub struct Threaded {
    pub exec: Handler,
    pub inst: Inst,
}

impl fmt::Debug for Threaded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inst)
    }
}

/// Executable form of a compiled function.
#[derive(Debug, Clone)]
pub struct ThreadedCode {
    pub insts: Box<[Threaded]>,
    /// Number of stack slots the function touches, linkage included.
    pub frame_size: usize,
    pub arity: usize,
}

impl ThreadedCode {
    pub fn len(&self) -> usize {
        self.insts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }
}

/// Resolves every instruction of `code` to its handler.
///
/// This is the last step of compilation: the optimizer never sees the result.
pub fn lower(code: &[Inst], arity: usize) -> ThreadedCode {
    let frame_size = code
        .iter()
        .filter_map(Inst::max_reg)
        .map(|reg| reg as usize + 1)
        .max()
        .unwrap_or(0)
        .max(arity);

    ThreadedCode {
        insts: code
            .iter()
            .map(|inst| Threaded {
                exec: dispatch::resolve(inst.opcode()),
                inst: inst.clone(),
            })
            .collect(),
        frame_size,
        arity,
    }
}

/// Everything a task needs to run: the entry code of one top-level form
/// and a snapshot of the function table it was compiled against.
#[derive(Debug, Clone)]
pub struct Program {
    funcs: FuncTable,
    entry: Arc<ThreadedCode>,
}

impl Program {
    pub fn new(funcs: FuncTable, entry: Arc<ThreadedCode>) -> Self {
        Self { funcs, entry }
    }

    #[inline(always)]
    pub fn code(&self, code: CodeRef) -> &ThreadedCode {
        match code {
            CodeRef::Entry => &self.entry,
            CodeRef::Func(id) => self.func(id),
        }
    }

    #[inline(always)]
    pub fn func(&self, id: FuncId) -> &ThreadedCode {
        match self.funcs.get(id.index()) {
            Some(Some(code)) => code,
            _ => unreachable!("function {} was called before it was compiled", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{BinOp, Opcode};

    #[test]
    fn test_lower_keeps_instructions_and_frame() {
        let code = vec![
            Inst::Mov { dst: 1, src: 0 },
            Inst::BinaryC {
                op: BinOp::Add,
                dst: 1,
                value: 1,
            },
            Inst::Call {
                func: FuncId(0),
                shift: 4,
            },
            Inst::Ret { src: 2 },
            Inst::End,
        ];
        let threaded = lower(&code, 1);

        assert_eq!(threaded.len(), code.len());
        assert_eq!(threaded.frame_size, 4);
        assert_eq!(threaded.arity, 1);
        assert_eq!(threaded.insts[1].inst.opcode(), Opcode::IAddC);
    }

    #[test]
    fn test_frame_covers_parameters() {
        let threaded = lower(&[Inst::RetC { value: 0 }, Inst::End], 3);
        assert_eq!(threaded.frame_size, 3);
    }
}
