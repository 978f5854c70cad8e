use crate::bytecode::{BinOp, Cond, FuncId, Inst, Opcode, Reg};

use super::{CodeRef, Machine, RuntimeError, RuntimeValue};

/// Executes one instruction and says how the interpreter loop continues.
pub type Handler = fn(&mut Machine<'_>, &Inst) -> Step;

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Next,
    /// The task waits on a child; the current instruction runs again on resume.
    Suspend,
    Finish(RuntimeValue),
    Fault(RuntimeError),
}

macro_rules! tri {
    ($expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(err) => return Step::Fault(err),
        }
    };
}

macro_rules! binary_handlers {
    ($($name:ident, $name_c:ident => $op:expr;)*) => {
        $(
            fn $name(m: &mut Machine<'_>, inst: &Inst) -> Step {
                let Inst::Binary { dst, src, .. } = inst else { mismatch(inst) };
                let rhs = m.int(*src);
                binary(m, $op, *dst, rhs)
            }

            fn $name_c(m: &mut Machine<'_>, inst: &Inst) -> Step {
                let Inst::BinaryC { dst, value, .. } = inst else { mismatch(inst) };
                binary(m, $op, *dst, Ok(*value))
            }
        )*
    };
}

macro_rules! branch_handlers {
    ($($name:ident, $name_c:ident => $cond:expr;)*) => {
        $(
            fn $name(m: &mut Machine<'_>, inst: &Inst) -> Step {
                let Inst::Branch { offset, lhs, rhs, .. } = inst else { mismatch(inst) };
                let rhs = m.integral(*rhs);
                branch(m, $cond, *offset, *lhs, rhs)
            }

            fn $name_c(m: &mut Machine<'_>, inst: &Inst) -> Step {
                let Inst::BranchC { offset, lhs, value, .. } = inst else { mismatch(inst) };
                branch(m, $cond, *offset, *lhs, Ok(*value))
            }
        )*
    };
}

/// Handler table keyed by opcode.
pub fn resolve(opcode: Opcode) -> Handler {
    match opcode {
        Opcode::IConst => iconst,
        Opcode::BConst => bconst,
        Opcode::FConst => fconst,
        Opcode::Mov => mov,
        Opcode::IAdd => iadd,
        Opcode::ISub => isub,
        Opcode::IMul => imul,
        Opcode::IDiv => idiv,
        Opcode::IMod => imod,
        Opcode::IAddC => iaddc,
        Opcode::ISubC => isubc,
        Opcode::IMulC => imulc,
        Opcode::IDivC => idivc,
        Opcode::IModC => imodc,
        Opcode::INeg => ineg,
        Opcode::IJmpLt => ijmplt,
        Opcode::IJmpLe => ijmple,
        Opcode::IJmpGt => ijmpgt,
        Opcode::IJmpGe => ijmpge,
        Opcode::IJmpEq => ijmpeq,
        Opcode::IJmpNe => ijmpne,
        Opcode::IJmpLtC => ijmpltc,
        Opcode::IJmpLeC => ijmplec,
        Opcode::IJmpGtC => ijmpgtc,
        Opcode::IJmpGeC => ijmpgec,
        Opcode::IJmpEqC => ijmpeqc,
        Opcode::IJmpNeC => ijmpnec,
        Opcode::Jmp => jmp,
        Opcode::LoadGlobal => load_global,
        Opcode::StoreGlobal => store_global,
        Opcode::Call => call,
        Opcode::Spawn => spawn,
        Opcode::Join => join,
        Opcode::Ret => ret,
        Opcode::RetC => retc,
        Opcode::IPrint => iprint,
        Opcode::BPrint => bprint,
        Opcode::End => end,
    }
}

#[cold]
fn mismatch(inst: &Inst) -> ! {
    unreachable!("handler dispatched for `{}`", inst)
}

#[inline(always)]
fn binary(m: &mut Machine<'_>, op: BinOp, dst: Reg, rhs: Result<i64, RuntimeError>) -> Step {
    let lhs = tri!(m.int(dst));
    let rhs = tri!(rhs);

    match op.apply(lhs, rhs) {
        Some(result) => {
            m.set(dst, RuntimeValue::Int(result));
            m.next()
        }
        None => Step::Fault(RuntimeError::ZeroDivision),
    }
}

#[inline(always)]
fn branch(
    m: &mut Machine<'_>,
    cond: Cond,
    offset: i32,
    lhs: Reg,
    rhs: Result<i64, RuntimeError>,
) -> Step {
    let lhs = tri!(m.integral(lhs));
    let rhs = tri!(rhs);

    if cond.holds(lhs, rhs) {
        m.task.pc = m.task.pc.wrapping_add_signed(offset as isize);
        Step::Next
    } else {
        m.next()
    }
}

binary_handlers! {
    iadd, iaddc => BinOp::Add;
    isub, isubc => BinOp::Sub;
    imul, imulc => BinOp::Mul;
    idiv, idivc => BinOp::Div;
    imod, imodc => BinOp::Mod;
}

branch_handlers! {
    ijmplt, ijmpltc => Cond::Lt;
    ijmple, ijmplec => Cond::Le;
    ijmpgt, ijmpgtc => Cond::Gt;
    ijmpge, ijmpgec => Cond::Ge;
    ijmpeq, ijmpeqc => Cond::Eq;
    ijmpne, ijmpnec => Cond::Ne;
}

fn iconst(m: &mut Machine<'_>, inst: &Inst) -> Step {
    let Inst::IConst { dst, value } = inst else { mismatch(inst) };
    m.set(*dst, RuntimeValue::Int(*value));
    m.next()
}

fn bconst(m: &mut Machine<'_>, inst: &Inst) -> Step {
    let Inst::BConst { dst, value } = inst else { mismatch(inst) };
    m.set(*dst, RuntimeValue::Bool(*value));
    m.next()
}

fn fconst(m: &mut Machine<'_>, inst: &Inst) -> Step {
    let Inst::FConst { dst, value } = inst else { mismatch(inst) };
    m.set(*dst, RuntimeValue::Float(*value));
    m.next()
}

fn mov(m: &mut Machine<'_>, inst: &Inst) -> Step {
    let Inst::Mov { dst, src } = inst else { mismatch(inst) };
    let value = m.get(*src);
    m.set(*dst, value);
    m.next()
}

fn ineg(m: &mut Machine<'_>, inst: &Inst) -> Step {
    let Inst::Neg { dst } = inst else { mismatch(inst) };
    let value = tri!(m.int(*dst));
    m.set(*dst, RuntimeValue::Int(value.wrapping_neg()));
    m.next()
}

fn jmp(m: &mut Machine<'_>, inst: &Inst) -> Step {
    let Inst::Jmp { offset } = inst else { mismatch(inst) };
    m.task.pc = m.task.pc.wrapping_add_signed(*offset as isize);
    Step::Next
}

fn load_global(m: &mut Machine<'_>, inst: &Inst) -> Step {
    let Inst::LoadGlobal { dst, var } = inst else { mismatch(inst) };
    m.set(*dst, var.variable().load());
    m.next()
}

fn store_global(m: &mut Machine<'_>, inst: &Inst) -> Step {
    let Inst::StoreGlobal { src, var } = inst else { mismatch(inst) };
    var.variable().store(m.get(*src));
    m.next()
}

/// Enters `func` with its frame at `shift`, saving the caller's base and
/// return address in the two slots below it.
#[inline(always)]
fn enter_call(m: &mut Machine<'_>, func: FuncId, shift: Reg) -> Step {
    let program = m.program;
    let callee = program.func(func);
    let base = m.task.base + shift as usize;

    if base + callee.frame_size > m.task.stack.len() {
        return Step::Fault(RuntimeError::StackOverflow);
    }

    m.task.stack[base - 2] = RuntimeValue::Frame(m.task.base);
    m.task.stack[base - 1] = RuntimeValue::Return {
        code: m.task.code,
        pc: (m.task.pc + 1) as u32,
    };
    m.enter(CodeRef::Func(func), 0, base);
    Step::Next
}

fn call(m: &mut Machine<'_>, inst: &Inst) -> Step {
    let Inst::Call { func, shift } = inst else { mismatch(inst) };
    enter_call(m, *func, *shift)
}

fn spawn(m: &mut Machine<'_>, inst: &Inst) -> Step {
    let Inst::Spawn { func, shift } = inst else { mismatch(inst) };
    let handle = shift - 3;

    let program = m.program;
    let callee = program.func(*func);
    if callee.frame_size > m.task.stack.len() {
        return Step::Fault(RuntimeError::StackOverflow);
    }

    let Some(mut child) = m.spawner.pool().alloc() else {
        tracing::trace!(func = %func, "task pool exhausted, calling synchronously");
        m.set(handle, RuntimeValue::Future(None));
        return enter_call(m, *func, *shift);
    };

    let start = m.task.base + *shift as usize;
    let Some(snapshot) = m.task.program.clone() else {
        unreachable!("running task without a program");
    };
    child.start(
        snapshot,
        CodeRef::Func(*func),
        &m.task.stack[start..start + callee.arity],
    );

    let Some(id) = child.id else {
        unreachable!("pooled task without an id");
    };
    tracing::trace!(func = %func, %id, "spawned");

    m.set(handle, RuntimeValue::Future(Some(id)));
    m.task.children.push(id);
    m.spawner.spawn(child);
    m.next()
}

fn join(m: &mut Machine<'_>, inst: &Inst) -> Step {
    let Inst::Join { reg } = inst else { mismatch(inst) };

    match m.get(*reg) {
        RuntimeValue::Future(None) => {
            let value = m.get(reg + 1);
            m.set(*reg, value);
            m.next()
        }
        RuntimeValue::Future(Some(id)) => match m.spawner.pool().try_join(id) {
            Some(outcome) => {
                m.task.children.retain(|child| *child != id);
                let value = tri!(outcome);
                m.set(*reg, value);
                m.next()
            }
            None => Step::Suspend,
        },
        _ => m.next(),
    }
}

#[inline(always)]
fn leave(m: &mut Machine<'_>, value: RuntimeValue) -> Step {
    let base = m.task.base;

    if base == 0 {
        return Step::Finish(value);
    }

    let (RuntimeValue::Frame(caller), RuntimeValue::Return { code, pc }) =
        (m.task.stack[base - 2], m.task.stack[base - 1])
    else {
        unreachable!("corrupt call linkage below frame {}", base);
    };

    m.task.stack[base - 2] = value;
    m.enter(code, pc as usize, caller);
    Step::Next
}

fn ret(m: &mut Machine<'_>, inst: &Inst) -> Step {
    let Inst::Ret { src } = inst else { mismatch(inst) };
    let value = m.get(*src);
    leave(m, value)
}

fn retc(m: &mut Machine<'_>, inst: &Inst) -> Step {
    let Inst::RetC { value } = inst else { mismatch(inst) };
    leave(m, RuntimeValue::Int(*value))
}

fn iprint(m: &mut Machine<'_>, inst: &Inst) -> Step {
    let Inst::IPrint { src } = inst else { mismatch(inst) };

    match m.get(*src) {
        RuntimeValue::Float(n) => println!("{:?}", n),
        RuntimeValue::Bool(b) => println!("{}", if b { "T" } else { "Nil" }),
        other => println!("{}", tri!(other.int())),
    }
    m.next()
}

fn bprint(m: &mut Machine<'_>, inst: &Inst) -> Step {
    let Inst::BPrint { src } = inst else { mismatch(inst) };
    let value = tri!(m.integral(*src));
    println!("{}", if value != 0 { "T" } else { "Nil" });
    m.next()
}

fn end(_: &mut Machine<'_>, inst: &Inst) -> Step {
    unreachable!("fell through to `{}`", inst)
}
