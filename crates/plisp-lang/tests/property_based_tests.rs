//! Property-based tests for the plisp optimizer.

use plisp_lang::{BinOp, CodeGenerator, Config, Context, Engine, Inst, InnerError, Optimizer, Value};
use proptest::prelude::*;
use smol_str::SmolStr;
use strategies::{HELPERS, arb_args, arb_expr, arb_expr_with_calls};

/// Evaluates `code` on a fresh engine and keeps the last value or the error cause.
fn eval(config: Config, code: &str) -> Result<Value, InnerError> {
    let mut engine = Engine::new(config.with_workers(1).with_spawn(false));

    engine
        .eval(code)
        .map(|mut values| values.pop().unwrap())
        .map_err(|err| err.cause)
}

/// Direct interpreter for call-free bytecode with `a` and `b` in slots 0 and 1.
fn interpret(code: &[Inst], a: i64, b: i64) -> Option<i64> {
    let mut regs = vec![0i64; 1024];
    let mut pc = 0usize;
    regs[0] = a;
    regs[1] = b;

    loop {
        let inst = &code[pc];
        let mut next = pc + 1;

        match inst {
            Inst::IConst { dst, value } => regs[*dst as usize] = *value,
            Inst::BConst { dst, value } => regs[*dst as usize] = *value as i64,
            Inst::Mov { dst, src } => regs[*dst as usize] = regs[*src as usize],
            Inst::Binary { op, dst, src } => {
                regs[*dst as usize] = op.apply(regs[*dst as usize], regs[*src as usize])?;
            }
            Inst::BinaryC { op, dst, value } => regs[*dst as usize] = op.apply(regs[*dst as usize], *value)?,
            Inst::Neg { dst } => regs[*dst as usize] = BinOp::Sub.apply(0, regs[*dst as usize])?,
            Inst::Branch { cond, offset, lhs, rhs } => {
                if cond.holds(regs[*lhs as usize], regs[*rhs as usize]) {
                    next = pc.wrapping_add_signed(*offset as isize);
                }
            }
            Inst::BranchC { cond, offset, lhs, value } => {
                if cond.holds(regs[*lhs as usize], *value) {
                    next = pc.wrapping_add_signed(*offset as isize);
                }
            }
            Inst::Jmp { offset } => next = pc.wrapping_add_signed(*offset as isize),
            Inst::Ret { src } => return Some(regs[*src as usize]),
            Inst::RetC { value } => return Some(*value),
            other => panic!("unexpected instruction {other:?}"),
        }

        pc = next;
    }
}

fn generate(expr: &str) -> Vec<Inst> {
    let program = plisp_lang::parse(expr).unwrap();
    let params = [SmolStr::new("a"), SmolStr::new("b")];
    let mut ctx = Context::new(Config::default());
    let mut generator = CodeGenerator::new(&mut ctx, &params);

    generator.generate_body(&program, 2).unwrap();
    generator.finish()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_optimized_function_matches_unoptimized(expr in arb_expr_with_calls(), (a, b) in arb_args()) {
        let code = format!("{HELPERS} (defun f (a b) {expr}) (f {a} {b})");

        prop_assert_eq!(
            eval(Config::default(), &code),
            eval(Config::default().with_optimize(false), &code),
            "{}", code
        );
    }

    #[test]
    fn test_inline_depth_does_not_change_results(expr in arb_expr_with_calls(), (a, b) in arb_args()) {
        let code = format!("{HELPERS} (defun f (a b) {expr}) (f {a} {b})");
        let expected = eval(Config::default().with_inline_depth(0), &code);

        for depth in [1, 4] {
            prop_assert_eq!(&eval(Config::default().with_inline_depth(depth), &code), &expected, "{}", code);
        }
    }

    #[test]
    fn test_optimized_globals_match_unoptimized(expr in arb_expr(), (a, b) in arb_args()) {
        let code = format!("(setq a {a}) (setq b {b}) {expr}");

        prop_assert_eq!(
            eval(Config::default(), &code),
            eval(Config::default().with_optimize(false), &code),
            "{}", code
        );
    }

    #[test]
    fn test_cleanup_preserves_behavior(expr in arb_expr(), (a, b) in arb_args()) {
        let raw = generate(&expr);
        let ctx = Context::new(Config::default());
        let optimizer = Optimizer::new(&ctx, None);
        let once = optimizer.cleanup(&raw);

        prop_assert_eq!(interpret(&once, a, b), interpret(&raw, a, b), "{}", expr);
    }

    #[test]
    fn test_cleanup_is_idempotent(expr in arb_expr(), (a, b) in arb_args()) {
        let raw = generate(&expr);
        let ctx = Context::new(Config::default());
        let optimizer = Optimizer::new(&ctx, None);
        let once = optimizer.cleanup(&raw);
        let twice = optimizer.cleanup(&once);

        prop_assert_eq!(interpret(&twice, a, b), interpret(&once, a, b), "{}", expr);
    }
}
