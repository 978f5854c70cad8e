//! Peephole and inlining passes over generated bytecode.
//!
//! Each pass walks the code once from the top with a read cursor. Call
//! sites below the pass depth are flattened in place by pushing an inline
//! frame and moving the cursor into the callee, so the output is always a
//! single linear function. Two adjacent instructions are fused only when no
//! pending jump lands on the second one.
mod liveness;

use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::{
    bytecode::{BinOp, CodeBuilder, FuncId, Inst, Label, Listing, Offset, Reg, code_words},
    context::Context,
};
use liveness::Liveness;

const CLEANUP_ROUNDS_BEFORE_INLINE: usize = 2;
const CLEANUP_ROUNDS_AFTER_INLINE: usize = 4;

pub struct Optimizer<'a> {
    ctx: &'a Context,
    /// Function being optimized; its calls resolve to the code handed to the pass.
    this: Option<FuncId>,
}

impl<'a> Optimizer<'a> {
    pub fn new(ctx: &'a Context, this: Option<FuncId>) -> Self {
        Self { ctx, this }
    }

    /// Runs the full schedule: cleanup, inlining rounds, cleanup.
    pub fn run(&self, code: Vec<Inst>) -> Vec<Inst> {
        let config = &self.ctx.config;
        let before = code_words(&code);
        let mut code = code;

        for _ in 0..CLEANUP_ROUNDS_BEFORE_INLINE {
            code = self.cleanup(&code);
        }

        for round in 0..config.inline_depth {
            if code_words(&code) >= config.code_size_budget {
                debug!(round, "Code size budget reached, inlining stopped");
                break;
            }
            code = self.pass(&code, 1);
        }

        for _ in 0..CLEANUP_ROUNDS_AFTER_INLINE {
            code = self.cleanup(&code);
        }
        let code = self.cleanup(&code);

        debug!(
            name = self.name(),
            before,
            after = code_words(&code),
            "Optimized"
        );
        if config.show_ir {
            info!(target: "plisp::ir", "{}:\n{}", self.name(), Listing(&code));
        }

        code
    }

    /// One rewrite pass without inlining.
    pub fn cleanup(&self, code: &[Inst]) -> Vec<Inst> {
        self.pass(code, 0)
    }

    fn pass(&self, code: &[Inst], depth: usize) -> Vec<Inst> {
        Pass::new(self, code, depth).run()
    }

    fn name(&self) -> &str {
        self.this
            .map(|id| self.ctx.func(id).name.as_str())
            .unwrap_or("<entry>")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CodeKey {
    Root,
    Func(FuncId),
}

/// Read position; `instance` tells apart two inlined copies of the same code.
#[derive(Debug, Clone, Copy)]
struct Cursor {
    code: CodeKey,
    instance: usize,
    pc: usize,
    base: Reg,
}

enum Fusion {
    Into(Inst),
    /// Emit the first, keep fusing the second.
    Split(Inst, Inst),
    Vanish,
}

struct Pass<'p, 'a> {
    opt: &'p Optimizer<'a>,
    root: &'p [Inst],
    depth: usize,
    cb: CodeBuilder,
    cursor: Cursor,
    /// Caller cursors of the inline frames, positioned at the continuation.
    frames: Vec<Cursor>,
    instances: usize,
    labels: Vec<(Label, usize, usize)>,
    liveness: FxHashMap<CodeKey, Liveness>,
}

impl<'p, 'a> Pass<'p, 'a> {
    fn new(opt: &'p Optimizer<'a>, root: &'p [Inst], depth: usize) -> Self {
        Self {
            opt,
            root,
            depth,
            cb: CodeBuilder::new(false),
            cursor: Cursor {
                code: CodeKey::Root,
                instance: 0,
                pc: 0,
                base: 0,
            },
            frames: Vec::new(),
            instances: 0,
            labels: Vec::new(),
            liveness: FxHashMap::default(),
        }
    }

    fn run(mut self) -> Vec<Inst> {
        loop {
            let Cursor { instance, pc, .. } = self.cursor;
            self.resolve_labels(instance, pc);

            match self.fetch(pc) {
                Inst::End => match self.frames.pop() {
                    Some(caller) => self.cursor = caller,
                    None => {
                        self.cb.create_end();
                        break;
                    }
                },
                Inst::Call { func, shift } if self.can_inline(func) => self.enter_inline(func, shift),
                inst => self.place(inst, pc),
            }
        }

        self.cb.finish()
    }

    fn code(&self, key: CodeKey) -> &'p [Inst] {
        let opt: &'p Optimizer<'a> = self.opt;

        match key {
            CodeKey::Func(id) if opt.this != Some(id) => &opt.ctx.func(id).code,
            _ => self.root,
        }
    }

    fn fetch(&self, pc: usize) -> Inst {
        let Cursor { code, base, .. } = self.cursor;
        normalize(self.code(code)[pc].rebase(base))
    }

    fn is_target(&self, instance: usize, pc: usize) -> bool {
        self.labels.iter().any(|&(_, i, p)| i == instance && p == pc)
    }

    fn resolve_labels(&mut self, instance: usize, pc: usize) {
        let cb = &mut self.cb;

        self.labels.retain(|&(label, i, p)| {
            if i == instance && p == pc {
                cb.set_label(label);
                false
            } else {
                true
            }
        });
    }

    fn is_dead_after(&mut self, pc: usize, reg: Reg) -> bool {
        let Cursor { code: key, base, .. } = self.cursor;
        let Some(reg) = reg.checked_sub(base) else {
            return false;
        };
        let code = self.code(key);
        let ctx = self.opt.ctx;

        !self
            .liveness
            .entry(key)
            .or_insert_with(|| Liveness::analyze(code, |id| ctx.func(id).arity()))
            .is_live_after(pc, reg)
    }

    /// First position at or after `from` that can be reached: a pending
    /// jump target, `stop`, or the end of the code.
    fn skip_dead(&self, from: usize, stop: Option<usize>) -> usize {
        let Cursor { code, instance, .. } = self.cursor;
        let code = self.code(code);
        let mut pc = from;

        while !matches!(code[pc], Inst::End) && Some(pc) != stop && !self.is_target(instance, pc) {
            pc += 1;
        }

        pc
    }

    fn can_inline(&self, func: FuncId) -> bool {
        self.frames.len() < self.depth
            && self.cb.words() < self.opt.ctx.config.code_size_budget
            && !self.code(CodeKey::Func(func)).is_empty()
    }

    fn enter_inline(&mut self, func: FuncId, shift: Reg) {
        let mut caller = self.cursor;
        caller.pc += 1;
        self.frames.push(caller);
        self.instances += 1;

        self.cursor = Cursor {
            code: CodeKey::Func(func),
            instance: self.instances,
            pc: 0,
            base: shift,
        };
    }

    /// Emits `inst` as if read at `pc` and moves the cursor past it.
    fn place(&mut self, inst: Inst, pc: usize) {
        match inst {
            Inst::Jmp { offset } => self.place_jmp(jump_target(pc, offset), pc),
            Inst::Branch { offset, .. } | Inst::BranchC { offset, .. } => {
                self.emit_branch(inst, jump_target(pc, offset), pc);
                self.cursor.pc = pc + 1;
            }
            Inst::Ret { .. } | Inst::RetC { .. } => self.place_return(inst, pc),
            Inst::IConst { .. }
            | Inst::BConst { .. }
            | Inst::FConst { .. }
            | Inst::Mov { .. }
            | Inst::Binary { .. }
            | Inst::BinaryC { .. }
            | Inst::Neg { .. }
            | Inst::LoadGlobal { .. } => self.peephole(inst, pc),
            Inst::End => unreachable!("end is handled by the pass loop"),
            inst => {
                self.cb.emit(inst);
                self.cursor.pc = pc + 1;
            }
        }
    }

    fn emit_branch(&mut self, inst: Inst, target: usize, pc: usize) {
        if target == pc + 1 {
            return;
        }

        let label = match inst {
            Inst::Branch { cond, lhs, rhs, .. } => self.cb.create_branch(cond, lhs, rhs),
            Inst::BranchC {
                cond, lhs, value, ..
            } => self.cb.create_branch_c(cond, lhs, value),
            other => unreachable!("not a conditional jump: {}", other),
        };
        self.labels.push((label, self.cursor.instance, target));
    }

    fn place_jmp(&mut self, target: usize, pc: usize) {
        let Cursor { code, base, .. } = self.cursor;
        let code = self.code(code);

        match &code[target] {
            ret @ (Inst::Ret { .. } | Inst::RetC { .. }) => self.place_return(ret.rebase(base), pc),
            branch @ (Inst::Branch { offset, .. } | Inst::BranchC { offset, .. })
                if self.frames.is_empty() =>
            {
                self.emit_branch(branch.rebase(base), jump_target(target, *offset), target);
                self.place_jmp(target + 1, pc);
            }
            _ => {
                let next = self.skip_dead(pc + 1, Some(target));

                if next != target {
                    let label = self.cb.create_jmp();
                    self.labels.push((label, self.cursor.instance, target));
                }
                self.cursor.pc = next;
            }
        }
    }

    fn place_return(&mut self, inst: Inst, pc: usize) {
        let Some(caller) = self.frames.last().copied() else {
            self.cb.emit(inst);
            self.cursor.pc = self.skip_dead(pc + 1, None);
            return;
        };

        // The inlined callee's result slot sits two below its base.
        let result = self.cursor.base - 2;
        match inst {
            Inst::Ret { src } => self.cb.create_mov(result, src),
            Inst::RetC { value } => self.cb.create_iconst(result, value),
            other => unreachable!("not a return: {}", other),
        }

        let next = self.skip_dead(pc + 1, None);
        if !matches!(self.code(self.cursor.code)[next], Inst::End) {
            let label = self.cb.create_jmp();
            self.labels.push((label, caller.instance, caller.pc));
        }
        self.cursor.pc = next;
    }

    fn peephole(&mut self, mut inst: Inst, mut pc: usize) {
        loop {
            match self.simplify(inst, pc) {
                Some(simplified) => inst = simplified,
                None => {
                    self.cursor.pc = pc + 1;
                    return;
                }
            }

            if !is_straight(&inst) {
                return self.place(inst, pc);
            }

            let next_pc = pc + 1;
            if self.is_target(self.cursor.instance, next_pc) {
                break;
            }

            let next = self.fetch(next_pc);
            match self.fuse(&inst, &next, next_pc) {
                Some(Fusion::Into(fused)) => {
                    inst = fused;
                    pc = next_pc;
                }
                Some(Fusion::Split(first, rest)) => {
                    self.cb.emit(first);
                    inst = rest;
                    pc = next_pc;
                }
                Some(Fusion::Vanish) => {
                    self.cursor.pc = next_pc + 1;
                    return;
                }
                None => break,
            }
        }

        self.cb.emit(inst);
        self.cursor.pc = pc + 1;
    }

    /// Drops no-ops and dead definitions.
    fn simplify(&mut self, inst: Inst, pc: usize) -> Option<Inst> {
        let inst = match inst {
            Inst::Mov { dst, src } if dst == src => return None,
            Inst::BinaryC {
                op: BinOp::Add,
                value: 0,
                ..
            }
            | Inst::BinaryC {
                op: BinOp::Mul | BinOp::Div,
                value: 1,
                ..
            } => return None,
            Inst::BinaryC {
                op: BinOp::Mul,
                dst,
                value: 0,
            } => Inst::IConst { dst, value: 0 },
            inst => inst,
        };

        match inst.pure_def() {
            Some(dst) if self.is_dead_after(pc, dst) => None,
            _ => Some(inst),
        }
    }

    fn fuse(&mut self, cur: &Inst, next: &Inst, next_pc: usize) -> Option<Fusion> {
        let fusion = match (cur, next) {
            (&Inst::IConst { dst: a, value: x }, &Inst::Mov { dst, src })
                if src == a && dst != a && self.is_dead_after(next_pc, a) =>
            {
                Fusion::Into(Inst::IConst { dst, value: x })
            }
            (&Inst::IConst { dst: a, value: x }, &Inst::Binary { op, dst, src })
                if src == a && dst != a && self.is_dead_after(next_pc, a) =>
            {
                Fusion::Into(normalize(Inst::BinaryC { op, dst, value: x }))
            }
            (
                &Inst::IConst { dst: a, value: x },
                &Inst::Binary {
                    op: op @ (BinOp::Add | BinOp::Mul),
                    dst,
                    src,
                },
            ) if dst == a && src != a => Fusion::Split(
                Inst::Mov { dst: a, src },
                Inst::BinaryC { op, dst: a, value: x },
            ),
            (&Inst::IConst { dst: a, value: x }, &Inst::BinaryC { op, dst, value }) if dst == a => {
                Fusion::Into(Inst::IConst {
                    dst: a,
                    value: op.apply(x, value)?,
                })
            }
            (
                &Inst::IConst { dst: a, value: x },
                &Inst::Branch {
                    cond,
                    offset,
                    lhs,
                    rhs,
                },
            ) if lhs != rhs && (lhs == a || rhs == a) && self.is_dead_after(next_pc, a) => {
                Fusion::Into(if rhs == a {
                    Inst::BranchC {
                        cond,
                        offset,
                        lhs,
                        value: x,
                    }
                } else {
                    Inst::BranchC {
                        cond: cond.reverse(),
                        offset,
                        lhs: rhs,
                        value: x,
                    }
                })
            }
            (
                &Inst::IConst { dst: a, value: x },
                &Inst::BranchC {
                    cond,
                    offset,
                    lhs,
                    value,
                },
            ) if lhs == a && self.is_dead_after(next_pc, a) => {
                if cond.holds(x, value) {
                    Fusion::Into(Inst::Jmp { offset })
                } else {
                    Fusion::Vanish
                }
            }
            (&Inst::IConst { dst: a, value: x }, &Inst::Ret { src }) if src == a => {
                Fusion::Into(Inst::RetC { value: x })
            }
            (&Inst::BConst { dst: a, value: x }, &Inst::Mov { dst, src })
                if src == a && dst != a && self.is_dead_after(next_pc, a) =>
            {
                Fusion::Into(Inst::BConst { dst, value: x })
            }
            // Booleans compare as 0 and 1; the tag only matters once stored or returned.
            (&Inst::BConst { dst: a, value: x }, branch @ (Inst::Branch { .. } | Inst::BranchC { .. })) => {
                return self.fuse(&Inst::IConst { dst: a, value: x as i64 }, branch, next_pc);
            }
            (&Inst::Mov { dst: a, src: b }, &Inst::Mov { dst, src })
                if src == a && dst != a && self.is_dead_after(next_pc, a) =>
            {
                Fusion::Into(Inst::Mov { dst, src: b })
            }
            (&Inst::Mov { dst: a, src: b }, &Inst::Binary { op, dst, src })
                if src == a && dst != a && self.is_dead_after(next_pc, a) =>
            {
                Fusion::Into(Inst::Binary { op, dst, src: b })
            }
            (
                &Inst::Mov { dst: a, src: b },
                &Inst::Branch {
                    cond,
                    offset,
                    lhs,
                    rhs,
                },
            ) if (lhs == a || rhs == a) && self.is_dead_after(next_pc, a) => {
                let forward = |reg| if reg == a { b } else { reg };
                Fusion::Into(Inst::Branch {
                    cond,
                    offset,
                    lhs: forward(lhs),
                    rhs: forward(rhs),
                })
            }
            (
                &Inst::Mov { dst: a, src: b },
                &Inst::BranchC {
                    cond,
                    offset,
                    lhs,
                    value,
                },
            ) if lhs == a && self.is_dead_after(next_pc, a) => Fusion::Into(Inst::BranchC {
                cond,
                offset,
                lhs: b,
                value,
            }),
            (&Inst::Mov { dst: a, src: b }, &Inst::Ret { src }) if src == a => {
                Fusion::Into(Inst::Ret { src: b })
            }
            (
                &Inst::BinaryC {
                    op: lop,
                    dst: a,
                    value: x,
                },
                &Inst::BinaryC {
                    op: rop,
                    dst,
                    value: y,
                },
            ) if dst == a => Fusion::Into(Inst::BinaryC {
                op: lop,
                dst: a,
                value: merge_immediates(lop, rop, x, y)?,
            }),
            _ => return None,
        };

        Some(fusion)
    }
}

#[inline(always)]
fn jump_target(pc: usize, offset: Offset) -> usize {
    pc.wrapping_add_signed(offset as isize)
}

/// Instructions that fall through and only write registers.
fn is_straight(inst: &Inst) -> bool {
    matches!(
        inst,
        Inst::IConst { .. }
            | Inst::BConst { .. }
            | Inst::FConst { .. }
            | Inst::Mov { .. }
            | Inst::Binary { .. }
            | Inst::BinaryC { .. }
            | Inst::Neg { .. }
            | Inst::LoadGlobal { .. }
    )
}

/// Subtraction of an immediate becomes addition of its negation.
fn normalize(inst: Inst) -> Inst {
    match inst {
        Inst::BinaryC {
            op: BinOp::Sub,
            dst,
            value,
        } => Inst::BinaryC {
            op: BinOp::Add,
            dst,
            value: value.wrapping_neg(),
        },
        inst => inst,
    }
}

fn merge_immediates(lhs: BinOp, rhs: BinOp, x: i64, y: i64) -> Option<i64> {
    match (lhs, rhs) {
        (BinOp::Add, BinOp::Add) => Some(x.wrapping_add(y)),
        (BinOp::Mul, BinOp::Mul) => Some(x.wrapping_mul(y)),
        (BinOp::Div, BinOp::Div) if x > 0 && y > 0 => x.checked_mul(y),
        _ => None,
    }
}
