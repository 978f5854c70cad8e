//! Register bytecode shared by the code generator, the optimizer and the VM.
pub mod builder;
pub mod inst;

use std::fmt;

use itertools::Itertools;

pub use builder::{CodeBuilder, Label};
pub use inst::{BinOp, Cond, FuncId, Inst, Offset, Opcode, Reg, VarRef};

/// Total size of `code` in machine words.
pub fn code_words(code: &[Inst]) -> usize {
    code.iter().map(Inst::width).sum()
}

/// Numbered listing of `code`, one instruction per line.
pub struct Listing<'a>(pub &'a [Inst]);

impl fmt::Display for Listing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            self.0
                .iter()
                .enumerate()
                .map(|(i, inst)| format!("{:>4}: {}", i, inst))
                .join("\n")
        )
    }
}
