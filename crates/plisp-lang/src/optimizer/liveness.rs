use smallvec::SmallVec;

use crate::bytecode::{FuncId, Inst, Reg};

/// Growable bitset of registers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegSet(SmallVec<[u64; 2]>);

impl RegSet {
    #[inline(always)]
    fn split(reg: Reg) -> (usize, u64) {
        (reg as usize / 64, 1u64 << (reg % 64))
    }

    pub fn contains(&self, reg: Reg) -> bool {
        let (word, bit) = Self::split(reg);
        self.0.get(word).is_some_and(|w| w & bit != 0)
    }

    pub fn insert(&mut self, reg: Reg) {
        let (word, bit) = Self::split(reg);

        if word >= self.0.len() {
            self.0.resize(word + 1, 0);
        }
        self.0[word] |= bit;
    }

    pub fn remove(&mut self, reg: Reg) {
        let (word, bit) = Self::split(reg);

        if let Some(w) = self.0.get_mut(word) {
            *w &= !bit;
        }
    }

    pub fn union_with(&mut self, other: &RegSet) {
        if other.0.len() > self.0.len() {
            self.0.resize(other.0.len(), 0);
        }

        for (w, o) in self.0.iter_mut().zip(other.0.iter()) {
            *w |= o;
        }
    }
}

/// Registers live after each instruction of one code object.
///
/// Jumps only go forward, so one backward sweep reaches the fixed point.
#[derive(Debug, Clone)]
pub struct Liveness {
    live_out: Vec<RegSet>,
}

impl Liveness {
    pub fn analyze(code: &[Inst], arity: impl Fn(FuncId) -> usize) -> Self {
        let len = code.len();
        let mut live_in = vec![RegSet::default(); len];
        let mut live_out = vec![RegSet::default(); len];

        for pc in (0..len).rev() {
            let inst = &code[pc];
            let mut out = RegSet::default();

            let falls_through = !matches!(
                inst,
                Inst::Jmp { .. } | Inst::Ret { .. } | Inst::RetC { .. } | Inst::End
            );
            if falls_through && pc + 1 < len {
                out.union_with(&live_in[pc + 1]);
            }

            if let Some(offset) = inst.jump_offset() {
                let target = pc.wrapping_add_signed(offset as isize);

                if target > pc && target < len {
                    out.union_with(&live_in[target]);
                }
            }

            let mut inn = out.clone();
            for reg in inst.defs() {
                inn.remove(reg);
            }
            for reg in inst.uses(&arity) {
                inn.insert(reg);
            }

            live_in[pc] = inn;
            live_out[pc] = out;
        }

        Self { live_out }
    }

    pub fn is_live_after(&self, pc: usize, reg: Reg) -> bool {
        self.live_out.get(pc).is_some_and(|set| set.contains(reg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{BinOp, Cond};

    #[test]
    fn test_regset_grows() {
        let mut set = RegSet::default();
        set.insert(3);
        set.insert(200);

        assert!(set.contains(3));
        assert!(set.contains(200));
        assert!(!set.contains(64));

        set.remove(200);
        assert!(!set.contains(200));
    }

    #[test]
    fn test_liveness_follows_both_branch_edges() {
        // r1 is read on the taken path only, r2 on the fallthrough only.
        let code = vec![
            Inst::IConst { dst: 1, value: 1 },
            Inst::IConst { dst: 2, value: 2 },
            Inst::BranchC {
                cond: Cond::Eq,
                offset: 2,
                lhs: 0,
                value: 0,
            },
            Inst::Ret { src: 2 },
            Inst::Ret { src: 1 },
            Inst::End,
        ];
        let liveness = Liveness::analyze(&code, |_| 0);

        assert!(liveness.is_live_after(1, 1));
        assert!(liveness.is_live_after(1, 2));
        assert!(liveness.is_live_after(1, 0));
        assert!(!liveness.is_live_after(2, 0));
        assert!(!liveness.is_live_after(3, 2));
    }

    #[test]
    fn test_redefinition_kills_register() {
        let code = vec![
            Inst::IConst { dst: 0, value: 1 },
            Inst::IConst { dst: 0, value: 2 },
            Inst::BinaryC {
                op: BinOp::Add,
                dst: 0,
                value: 1,
            },
            Inst::Ret { src: 0 },
            Inst::End,
        ];
        let liveness = Liveness::analyze(&code, |_| 0);

        assert!(!liveness.is_live_after(0, 0));
        assert!(liveness.is_live_after(1, 0));
        assert!(liveness.is_live_after(2, 0));
    }
}
