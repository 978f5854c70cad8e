use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use smallvec::{SmallVec, smallvec};

use crate::context::Variable;

/// Index of a slot in the current frame of a task's value stack.
pub type Reg = u32;
/// Relative jump displacement, counted in instructions from the jump itself.
pub type Offset = i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FuncId(pub u32);

impl FuncId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for FuncId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Shared handle to a global variable, compared by identity.
#[derive(Debug, Clone)]
pub struct VarRef(pub(crate) Arc<Variable>);

impl VarRef {
    pub fn new(variable: Variable) -> Self {
        Self(Arc::new(variable))
    }

    pub fn variable(&self) -> &Variable {
        &self.0
    }
}

impl PartialEq for VarRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinOp {
    /// Integer semantics shared by the interpreter and constant folding.
    /// Returns `None` on division or remainder by zero.
    #[inline(always)]
    pub fn apply(self, lhs: i64, rhs: i64) -> Option<i64> {
        match self {
            BinOp::Add => Some(lhs.wrapping_add(rhs)),
            BinOp::Sub => Some(lhs.wrapping_sub(rhs)),
            BinOp::Mul => Some(lhs.wrapping_mul(rhs)),
            BinOp::Div if rhs == 0 => None,
            BinOp::Div => Some(lhs.wrapping_div(rhs)),
            BinOp::Mod if rhs == 0 => None,
            BinOp::Mod => Some(lhs.wrapping_rem(rhs)),
        }
    }

    pub fn can_fault(self) -> bool {
        matches!(self, BinOp::Div | BinOp::Mod)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cond {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Cond {
    #[inline(always)]
    pub fn holds(self, lhs: i64, rhs: i64) -> bool {
        match self {
            Cond::Lt => lhs < rhs,
            Cond::Le => lhs <= rhs,
            Cond::Gt => lhs > rhs,
            Cond::Ge => lhs >= rhs,
            Cond::Eq => lhs == rhs,
            Cond::Ne => lhs != rhs,
        }
    }

    /// The comparator that holds exactly when `self` does not.
    pub fn negate(self) -> Self {
        match self {
            Cond::Lt => Cond::Ge,
            Cond::Le => Cond::Gt,
            Cond::Gt => Cond::Le,
            Cond::Ge => Cond::Lt,
            Cond::Eq => Cond::Ne,
            Cond::Ne => Cond::Eq,
        }
    }

    /// The comparator for swapped operands: `a self b` iff `b self.reverse() a`.
    pub fn reverse(self) -> Self {
        match self {
            Cond::Lt => Cond::Gt,
            Cond::Le => Cond::Ge,
            Cond::Gt => Cond::Lt,
            Cond::Ge => Cond::Le,
            Cond::Eq => Cond::Eq,
            Cond::Ne => Cond::Ne,
        }
    }
}

/// One bytecode instruction.
///
/// Every variant corresponds to an opcode with a fixed operand layout; see
/// [`Opcode::width`] for the word count of each.
#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    IConst { dst: Reg, value: i64 },
    BConst { dst: Reg, value: bool },
    FConst { dst: Reg, value: f64 },
    Mov { dst: Reg, src: Reg },
    /// `dst = dst op src`
    Binary { op: BinOp, dst: Reg, src: Reg },
    /// `dst = dst op value`
    BinaryC { op: BinOp, dst: Reg, value: i64 },
    Neg { dst: Reg },
    /// Jumps by `offset` when `lhs cond rhs`.
    Branch { cond: Cond, offset: Offset, lhs: Reg, rhs: Reg },
    /// Jumps by `offset` when `lhs cond value`.
    BranchC { cond: Cond, offset: Offset, lhs: Reg, value: i64 },
    Jmp { offset: Offset },
    LoadGlobal { dst: Reg, var: VarRef },
    StoreGlobal { src: Reg, var: VarRef },
    /// Arguments start at `shift`; `shift - 2` and `shift - 1` hold the linkage.
    Call { func: FuncId, shift: Reg },
    /// Arguments start at `shift`; the task handle is written to `shift - 3`.
    Spawn { func: FuncId, shift: Reg },
    Join { reg: Reg },
    Ret { src: Reg },
    RetC { value: i64 },
    IPrint { src: Reg },
    BPrint { src: Reg },
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumCount, strum::EnumIter)]
#[strum(serialize_all = "UPPERCASE")]
#[repr(u8)]
pub enum Opcode {
    IConst,
    BConst,
    FConst,
    Mov,
    IAdd,
    ISub,
    IMul,
    IDiv,
    IMod,
    IAddC,
    ISubC,
    IMulC,
    IDivC,
    IModC,
    INeg,
    IJmpLt,
    IJmpLe,
    IJmpGt,
    IJmpGe,
    IJmpEq,
    IJmpNe,
    IJmpLtC,
    IJmpLeC,
    IJmpGtC,
    IJmpGeC,
    IJmpEqC,
    IJmpNeC,
    Jmp,
    #[strum(serialize = "LOAD_GLOBAL")]
    LoadGlobal,
    #[strum(serialize = "STORE_GLOBAL")]
    StoreGlobal,
    Call,
    Spawn,
    Join,
    Ret,
    RetC,
    IPrint,
    BPrint,
    End,
}

impl Opcode {
    /// Number of machine words the instruction occupies, opcode included.
    pub fn width(self) -> usize {
        match self {
            Opcode::End => 1,
            Opcode::INeg
            | Opcode::Jmp
            | Opcode::Join
            | Opcode::Ret
            | Opcode::RetC
            | Opcode::IPrint
            | Opcode::BPrint => 2,
            Opcode::IJmpLt
            | Opcode::IJmpLe
            | Opcode::IJmpGt
            | Opcode::IJmpGe
            | Opcode::IJmpEq
            | Opcode::IJmpNe
            | Opcode::IJmpLtC
            | Opcode::IJmpLeC
            | Opcode::IJmpGtC
            | Opcode::IJmpGeC
            | Opcode::IJmpEqC
            | Opcode::IJmpNeC => 4,
            _ => 3,
        }
    }
}

impl Inst {
    pub fn opcode(&self) -> Opcode {
        match self {
            Inst::IConst { .. } => Opcode::IConst,
            Inst::BConst { .. } => Opcode::BConst,
            Inst::FConst { .. } => Opcode::FConst,
            Inst::Mov { .. } => Opcode::Mov,
            Inst::Binary { op, .. } => match op {
                BinOp::Add => Opcode::IAdd,
                BinOp::Sub => Opcode::ISub,
                BinOp::Mul => Opcode::IMul,
                BinOp::Div => Opcode::IDiv,
                BinOp::Mod => Opcode::IMod,
            },
            Inst::BinaryC { op, .. } => match op {
                BinOp::Add => Opcode::IAddC,
                BinOp::Sub => Opcode::ISubC,
                BinOp::Mul => Opcode::IMulC,
                BinOp::Div => Opcode::IDivC,
                BinOp::Mod => Opcode::IModC,
            },
            Inst::Neg { .. } => Opcode::INeg,
            Inst::Branch { cond, .. } => match cond {
                Cond::Lt => Opcode::IJmpLt,
                Cond::Le => Opcode::IJmpLe,
                Cond::Gt => Opcode::IJmpGt,
                Cond::Ge => Opcode::IJmpGe,
                Cond::Eq => Opcode::IJmpEq,
                Cond::Ne => Opcode::IJmpNe,
            },
            Inst::BranchC { cond, .. } => match cond {
                Cond::Lt => Opcode::IJmpLtC,
                Cond::Le => Opcode::IJmpLeC,
                Cond::Gt => Opcode::IJmpGtC,
                Cond::Ge => Opcode::IJmpGeC,
                Cond::Eq => Opcode::IJmpEqC,
                Cond::Ne => Opcode::IJmpNeC,
            },
            Inst::Jmp { .. } => Opcode::Jmp,
            Inst::LoadGlobal { .. } => Opcode::LoadGlobal,
            Inst::StoreGlobal { .. } => Opcode::StoreGlobal,
            Inst::Call { .. } => Opcode::Call,
            Inst::Spawn { .. } => Opcode::Spawn,
            Inst::Join { .. } => Opcode::Join,
            Inst::Ret { .. } => Opcode::Ret,
            Inst::RetC { .. } => Opcode::RetC,
            Inst::IPrint { .. } => Opcode::IPrint,
            Inst::BPrint { .. } => Opcode::BPrint,
            Inst::End => Opcode::End,
        }
    }

    pub fn width(&self) -> usize {
        self.opcode().width()
    }

    /// Relative target of a jump instruction.
    pub fn jump_offset(&self) -> Option<Offset> {
        match self {
            Inst::Branch { offset, .. } | Inst::BranchC { offset, .. } | Inst::Jmp { offset } => {
                Some(*offset)
            }
            _ => None,
        }
    }

    pub fn is_cond_jump(&self) -> bool {
        matches!(self, Inst::Branch { .. } | Inst::BranchC { .. })
    }

    pub fn is_return(&self) -> bool {
        matches!(self, Inst::Ret { .. } | Inst::RetC { .. })
    }

    /// Register written by a side-effect free instruction, if any.
    ///
    /// Instructions that can fault or touch anything beyond their
    /// destination are excluded, so removing a returned definition whose
    /// register is dead never changes observable behavior.
    pub fn pure_def(&self) -> Option<Reg> {
        match self {
            Inst::IConst { dst, .. }
            | Inst::BConst { dst, .. }
            | Inst::FConst { dst, .. }
            | Inst::Mov { dst, .. }
            | Inst::Neg { dst }
            | Inst::LoadGlobal { dst, .. } => Some(*dst),
            Inst::Binary { op, dst, .. } | Inst::BinaryC { op, dst, .. } if !op.can_fault() => {
                Some(*dst)
            }
            _ => None,
        }
    }

    /// Registers this instruction reads. `arity` resolves the argument count
    /// of call targets.
    pub fn uses(&self, arity: impl Fn(FuncId) -> usize) -> SmallVec<[Reg; 4]> {
        match self {
            Inst::IConst { .. }
            | Inst::BConst { .. }
            | Inst::FConst { .. }
            | Inst::Jmp { .. }
            | Inst::LoadGlobal { .. }
            | Inst::RetC { .. }
            | Inst::End => SmallVec::new(),
            Inst::Mov { src, .. } => smallvec![*src],
            Inst::Binary { dst, src, .. } => smallvec![*dst, *src],
            Inst::BinaryC { dst, .. } | Inst::Neg { dst } => smallvec![*dst],
            Inst::Branch { lhs, rhs, .. } => smallvec![*lhs, *rhs],
            Inst::BranchC { lhs, .. } => smallvec![*lhs],
            Inst::StoreGlobal { src, .. }
            | Inst::Ret { src }
            | Inst::IPrint { src }
            | Inst::BPrint { src } => smallvec![*src],
            Inst::Call { func, shift } | Inst::Spawn { func, shift } => {
                (*shift..*shift + arity(*func) as Reg).collect()
            }
            Inst::Join { reg } => smallvec![*reg, *reg + 1],
        }
    }

    /// Registers this instruction always overwrites.
    pub fn defs(&self) -> SmallVec<[Reg; 2]> {
        match self {
            Inst::IConst { dst, .. }
            | Inst::BConst { dst, .. }
            | Inst::FConst { dst, .. }
            | Inst::Mov { dst, .. }
            | Inst::Binary { dst, .. }
            | Inst::BinaryC { dst, .. }
            | Inst::Neg { dst }
            | Inst::LoadGlobal { dst, .. } => smallvec![*dst],
            Inst::Call { shift, .. } => smallvec![*shift - 2],
            Inst::Spawn { shift, .. } => smallvec![*shift - 3],
            Inst::Join { reg } => smallvec![*reg],
            _ => SmallVec::new(),
        }
    }

    /// Highest register referenced by this instruction, linkage slots included.
    pub fn max_reg(&self) -> Option<Reg> {
        match self {
            Inst::Call { shift, .. } | Inst::Spawn { shift, .. } => Some(shift.saturating_sub(1)),
            Inst::Join { reg } => Some(*reg + 1),
            _ => self
                .defs()
                .into_iter()
                .chain(self.uses(|_| 0))
                .max(),
        }
    }

    /// Copy of the instruction with `base` added to every register operand.
    pub fn rebase(&self, base: Reg) -> Inst {
        match self {
            Inst::IConst { dst, value } => Inst::IConst {
                dst: dst + base,
                value: *value,
            },
            Inst::BConst { dst, value } => Inst::BConst {
                dst: dst + base,
                value: *value,
            },
            Inst::FConst { dst, value } => Inst::FConst {
                dst: dst + base,
                value: *value,
            },
            Inst::Mov { dst, src } => Inst::Mov {
                dst: dst + base,
                src: src + base,
            },
            Inst::Binary { op, dst, src } => Inst::Binary {
                op: *op,
                dst: dst + base,
                src: src + base,
            },
            Inst::BinaryC { op, dst, value } => Inst::BinaryC {
                op: *op,
                dst: dst + base,
                value: *value,
            },
            Inst::Neg { dst } => Inst::Neg { dst: dst + base },
            Inst::Branch {
                cond,
                offset,
                lhs,
                rhs,
            } => Inst::Branch {
                cond: *cond,
                offset: *offset,
                lhs: lhs + base,
                rhs: rhs + base,
            },
            Inst::BranchC {
                cond,
                offset,
                lhs,
                value,
            } => Inst::BranchC {
                cond: *cond,
                offset: *offset,
                lhs: lhs + base,
                value: *value,
            },
            Inst::Jmp { offset } => Inst::Jmp { offset: *offset },
            Inst::LoadGlobal { dst, var } => Inst::LoadGlobal {
                dst: dst + base,
                var: var.clone(),
            },
            Inst::StoreGlobal { src, var } => Inst::StoreGlobal {
                src: src + base,
                var: var.clone(),
            },
            Inst::Call { func, shift } => Inst::Call {
                func: *func,
                shift: shift + base,
            },
            Inst::Spawn { func, shift } => Inst::Spawn {
                func: *func,
                shift: shift + base,
            },
            Inst::Join { reg } => Inst::Join { reg: reg + base },
            Inst::Ret { src } => Inst::Ret { src: src + base },
            Inst::RetC { value } => Inst::RetC { value: *value },
            Inst::IPrint { src } => Inst::IPrint { src: src + base },
            Inst::BPrint { src } => Inst::BPrint { src: src + base },
            Inst::End => Inst::End,
        }
    }
}

impl Display for Inst {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let opcode = self.opcode();

        match self {
            Inst::IConst { dst, value } => write!(f, "{opcode} r{dst}, {value}"),
            Inst::BConst { dst, value } => write!(f, "{opcode} r{dst}, {}", if *value { "t" } else { "nil" }),
            Inst::FConst { dst, value } => write!(f, "{opcode} r{dst}, {value:?}"),
            Inst::Mov { dst, src } | Inst::Binary { dst, src, .. } => {
                write!(f, "{opcode} r{dst}, r{src}")
            }
            Inst::BinaryC { dst, value, .. } => write!(f, "{opcode} r{dst}, {value}"),
            Inst::Neg { dst } => write!(f, "{opcode} r{dst}"),
            Inst::Branch {
                offset, lhs, rhs, ..
            } => write!(f, "{opcode} {offset:+}, r{lhs}, r{rhs}"),
            Inst::BranchC {
                offset, lhs, value, ..
            } => write!(f, "{opcode} {offset:+}, r{lhs}, {value}"),
            Inst::Jmp { offset } => write!(f, "{opcode} {offset:+}"),
            Inst::LoadGlobal { dst, var } => write!(f, "{opcode} r{dst}, {}", var.variable().name),
            Inst::StoreGlobal { src, var } => write!(f, "{opcode} r{src}, {}", var.variable().name),
            Inst::Call { func, shift } | Inst::Spawn { func, shift } => {
                write!(f, "{opcode} {func}, {shift}")
            }
            Inst::Join { reg } => write!(f, "{opcode} r{reg}"),
            Inst::Ret { src } | Inst::IPrint { src } | Inst::BPrint { src } => {
                write!(f, "{opcode} r{src}")
            }
            Inst::RetC { value } => write!(f, "{opcode} {value}"),
            Inst::End => write!(f, "{opcode}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use strum::IntoEnumIterator;

    use super::*;

    #[rstest]
    #[case::iconst(Inst::IConst { dst: 1, value: 5 }, 3)]
    #[case::bconst(Inst::BConst { dst: 1, value: true }, 3)]
    #[case::neg(Inst::Neg { dst: 1 }, 2)]
    #[case::branch(Inst::Branch { cond: Cond::Lt, offset: 3, lhs: 0, rhs: 1 }, 4)]
    #[case::branch_c(Inst::BranchC { cond: Cond::Ne, offset: 3, lhs: 0, value: 0 }, 4)]
    #[case::jmp(Inst::Jmp { offset: 2 }, 2)]
    #[case::call(Inst::Call { func: FuncId(0), shift: 4 }, 3)]
    #[case::retc(Inst::RetC { value: 0 }, 2)]
    #[case::end(Inst::End, 1)]
    fn test_width(#[case] inst: Inst, #[case] expected: usize) {
        assert_eq!(inst.width(), expected);
    }

    #[test]
    fn test_cond_negate_and_reverse() {
        let values = [-2i64, -1, 0, 1, 2];
        for cond in [Cond::Lt, Cond::Le, Cond::Gt, Cond::Ge, Cond::Eq, Cond::Ne] {
            for a in values {
                for b in values {
                    assert_eq!(cond.negate().holds(a, b), !cond.holds(a, b));
                    assert_eq!(cond.reverse().holds(b, a), cond.holds(a, b));
                }
            }
        }
    }

    #[rstest]
    #[case::add(BinOp::Add, i64::MAX, 1, Some(i64::MIN))]
    #[case::div(BinOp::Div, 7, 2, Some(3))]
    #[case::div_negative(BinOp::Div, -7, 2, Some(-3))]
    #[case::div_zero(BinOp::Div, 7, 0, None)]
    #[case::modulo(BinOp::Mod, -7, 3, Some(-1))]
    #[case::mod_zero(BinOp::Mod, 7, 0, None)]
    #[case::div_overflow(BinOp::Div, i64::MIN, -1, Some(i64::MIN))]
    fn test_binop_apply(#[case] op: BinOp, #[case] a: i64, #[case] b: i64, #[case] expected: Option<i64>) {
        assert_eq!(op.apply(a, b), expected);
    }

    #[test]
    fn test_rebase_shifts_every_register() {
        let inst = Inst::Branch {
            cond: Cond::Eq,
            offset: 5,
            lhs: 1,
            rhs: 2,
        };
        assert_eq!(
            inst.rebase(10),
            Inst::Branch {
                cond: Cond::Eq,
                offset: 5,
                lhs: 11,
                rhs: 12
            }
        );
        assert_eq!(
            Inst::Call {
                func: FuncId(3),
                shift: 4
            }
            .rebase(2),
            Inst::Call {
                func: FuncId(3),
                shift: 6
            }
        );
    }

    #[test]
    fn test_opcode_mnemonics() {
        assert_eq!(Opcode::IAddC.to_string(), "IADDC");
        assert_eq!(Opcode::LoadGlobal.to_string(), "LOAD_GLOBAL");
        assert!(Opcode::iter().all(|op| (1..=4).contains(&op.width())));
    }

    #[test]
    fn test_display() {
        assert_eq!(Inst::IConst { dst: 0, value: 42 }.to_string(), "ICONST r0, 42");
        assert_eq!(Inst::BConst { dst: 1, value: false }.to_string(), "BCONST r1, nil");
        assert_eq!(
            Inst::BranchC {
                cond: Cond::Ge,
                offset: 4,
                lhs: 1,
                value: 2
            }
            .to_string(),
            "IJMPGEC +4, r1, 2"
        );
    }
}
