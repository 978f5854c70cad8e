use crate::bytecode::inst::{BinOp, Cond, FuncId, Inst, Offset, Reg, VarRef};

/// Position of an emitted jump whose displacement is patched by [`CodeBuilder::set_label`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

/// Append-only bytecode buffer.
///
/// Register allocation is the caller's business; the builder only records
/// instructions and backpatches forward jumps.
#[derive(Debug, Default)]
pub struct CodeBuilder {
    code: Vec<Inst>,
    words: usize,
    show_ir: bool,
}

impl CodeBuilder {
    pub fn new(show_ir: bool) -> Self {
        Self {
            code: Vec::with_capacity(64),
            words: 0,
            show_ir,
        }
    }

    /// Number of instructions emitted so far.
    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Size of the emitted code in machine words.
    pub fn words(&self) -> usize {
        self.words
    }

    pub fn finish(self) -> Vec<Inst> {
        self.code
    }

    pub(crate) fn emit(&mut self, inst: Inst) {
        if self.show_ir {
            tracing::info!(target: "plisp::ir", "{:>4}: {}", self.code.len(), inst);
        } else {
            tracing::trace!("{:>4}: {}", self.code.len(), inst);
        }

        self.words += inst.width();
        self.code.push(inst);
    }

    fn emit_jump(&mut self, inst: Inst) -> Label {
        let label = Label(self.code.len());
        self.emit(inst);
        label
    }

    /// Points the jump at `label` to the next instruction to be emitted.
    pub fn set_label(&mut self, label: Label) {
        let distance = (self.code.len() - label.0) as Offset;

        match self.code.get_mut(label.0) {
            Some(Inst::Branch { offset, .. })
            | Some(Inst::BranchC { offset, .. })
            | Some(Inst::Jmp { offset }) => *offset = distance,
            other => panic!("label {} does not refer to a jump: {:?}", label.0, other),
        }
    }

    pub fn create_iconst(&mut self, dst: Reg, value: i64) {
        self.emit(Inst::IConst { dst, value });
    }

    pub fn create_bconst(&mut self, dst: Reg, value: bool) {
        self.emit(Inst::BConst { dst, value });
    }

    pub fn create_fconst(&mut self, dst: Reg, value: f64) {
        self.emit(Inst::FConst { dst, value });
    }

    pub fn create_mov(&mut self, dst: Reg, src: Reg) {
        self.emit(Inst::Mov { dst, src });
    }

    pub fn create_binary(&mut self, op: BinOp, dst: Reg, src: Reg) {
        self.emit(Inst::Binary { op, dst, src });
    }

    pub fn create_binary_c(&mut self, op: BinOp, dst: Reg, value: i64) {
        self.emit(Inst::BinaryC { op, dst, value });
    }

    pub fn create_neg(&mut self, dst: Reg) {
        self.emit(Inst::Neg { dst });
    }

    pub fn create_branch(&mut self, cond: Cond, lhs: Reg, rhs: Reg) -> Label {
        self.emit_jump(Inst::Branch {
            cond,
            offset: 0,
            lhs,
            rhs,
        })
    }

    pub fn create_branch_c(&mut self, cond: Cond, lhs: Reg, value: i64) -> Label {
        self.emit_jump(Inst::BranchC {
            cond,
            offset: 0,
            lhs,
            value,
        })
    }

    pub fn create_jmp(&mut self) -> Label {
        self.emit_jump(Inst::Jmp { offset: 0 })
    }

    pub fn create_load_global(&mut self, dst: Reg, var: VarRef) {
        self.emit(Inst::LoadGlobal { dst, var });
    }

    pub fn create_store_global(&mut self, src: Reg, var: VarRef) {
        self.emit(Inst::StoreGlobal { src, var });
    }

    pub fn create_call(&mut self, func: FuncId, shift: Reg) {
        self.emit(Inst::Call { func, shift });
    }

    pub fn create_spawn(&mut self, func: FuncId, shift: Reg) {
        self.emit(Inst::Spawn { func, shift });
    }

    pub fn create_join(&mut self, reg: Reg) {
        self.emit(Inst::Join { reg });
    }

    pub fn create_ret(&mut self, src: Reg) {
        self.emit(Inst::Ret { src });
    }

    pub fn create_ret_c(&mut self, value: i64) {
        self.emit(Inst::RetC { value });
    }

    pub fn create_iprint(&mut self, src: Reg) {
        self.emit(Inst::IPrint { src });
    }

    pub fn create_bprint(&mut self, src: Reg) {
        self.emit(Inst::BPrint { src });
    }

    pub fn create_end(&mut self) {
        self.emit(Inst::End);
    }
}
