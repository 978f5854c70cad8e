use std::str::FromStr;

use smallvec::SmallVec;
use smol_str::SmolStr;

use crate::{
    ast::node::{Expr, Node},
    bytecode::{BinOp, CodeBuilder, Cond, FuncId, Inst, Label, Reg},
    context::Context,
    value::ValueKind,
};

use super::{builtin::Builtin, error::CompileError};

/// Lowers expression trees into register bytecode for one code object.
///
/// Every `generate*` method writes the value of its node into the slot it
/// is handed and may use any slot above it as scratch space. Parameters of
/// the enclosing function live in the slots below the body.
pub struct CodeGenerator<'a> {
    ctx: &'a mut Context,
    params: &'a [SmolStr],
    cb: CodeBuilder,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(ctx: &'a mut Context, params: &'a [SmolStr]) -> Self {
        let show_ir = ctx.config.show_ir;

        Self {
            ctx,
            params,
            cb: CodeBuilder::new(show_ir),
        }
    }

    pub fn finish(self) -> Vec<Inst> {
        self.cb.finish()
    }

    /// Evaluates `body` in order into `base` and returns the last value.
    pub fn generate_body(&mut self, body: &[Node], base: Reg) -> Result<ValueKind, CompileError> {
        let mut kind = ValueKind::Bool;

        for node in body {
            kind = self.generate(node, base)?;
        }

        self.cb.create_ret(base);
        self.cb.create_end();

        Ok(kind)
    }

    pub fn generate(&mut self, node: &Node, r: Reg) -> Result<ValueKind, CompileError> {
        match &node.expr {
            Expr::Int(i) => {
                self.cb.create_iconst(r, *i);
                Ok(ValueKind::Int)
            }
            Expr::Float(n) => {
                self.cb.create_fconst(r, *n);
                Ok(ValueKind::Float)
            }
            Expr::Symbol(name) => self.generate_symbol(node, name, r),
            Expr::List(nodes) => match nodes.split_first() {
                None => {
                    self.cb.create_bconst(r, false);
                    Ok(ValueKind::Bool)
                }
                Some((head, args)) => match head.symbol() {
                    Some(name) => self.generate_call(node, name, args, r),
                    None => Err(CompileError::NotCallable(head.range, head.to_string())),
                },
            },
        }
    }

    fn generate_symbol(&mut self, node: &Node, name: &SmolStr, r: Reg) -> Result<ValueKind, CompileError> {
        match name.as_str() {
            "t" => {
                self.cb.create_bconst(r, true);
                Ok(ValueKind::Bool)
            }
            "nil" => {
                self.cb.create_bconst(r, false);
                Ok(ValueKind::Bool)
            }
            _ => {
                if let Some(index) = self.params.iter().position(|param| param == name) {
                    self.cb.create_mov(r, index as Reg);
                    Ok(ValueKind::Any)
                } else if let Some(var) = self.ctx.lookup_var(name) {
                    self.cb.create_load_global(r, var);
                    Ok(ValueKind::Any)
                } else {
                    Err(CompileError::NotDefined(node.range, name.clone()))
                }
            }
        }
    }

    /// Compiles an operand of a comparison.
    fn generate_integral(&mut self, node: &Node, operator: &SmolStr, r: Reg) -> Result<ValueKind, CompileError> {
        let kind = self.generate(node, r)?;

        if kind.is_integral() {
            Ok(kind)
        } else {
            Err(CompileError::NotInteger(node.range, operator.clone()))
        }
    }

    /// Compiles an operand of an arithmetic operator.
    fn generate_integer(&mut self, node: &Node, operator: &SmolStr, r: Reg) -> Result<ValueKind, CompileError> {
        let kind = self.generate(node, r)?;

        if kind.is_arithmetic() {
            Ok(kind)
        } else {
            Err(CompileError::NotInteger(node.range, operator.clone()))
        }
    }

    fn generate_call(
        &mut self,
        node: &Node,
        name: &SmolStr,
        args: &[Node],
        r: Reg,
    ) -> Result<ValueKind, CompileError> {
        let Ok(builtin) = Builtin::from_str(name) else {
            let (func, kind) = self.resolve_func(node, name, args.len())?;
            self.generate_args(args, r + 2)?;
            self.cb.create_call(func, r + 2);
            return Ok(kind);
        };

        match builtin {
            Builtin::Add => self.generate_arith(node, name, BinOp::Add, args, r),
            Builtin::Sub => self.generate_arith(node, name, BinOp::Sub, args, r),
            Builtin::Mul => self.generate_arith(node, name, BinOp::Mul, args, r),
            Builtin::Div => self.generate_arith(node, name, BinOp::Div, args, r),
            Builtin::Mod => self.generate_arith(node, name, BinOp::Mod, args, r),
            Builtin::Lt => self.generate_compare(node, name, Cond::Lt, args, r),
            Builtin::Le => self.generate_compare(node, name, Cond::Le, args, r),
            Builtin::Gt => self.generate_compare(node, name, Cond::Gt, args, r),
            Builtin::Ge => self.generate_compare(node, name, Cond::Ge, args, r),
            Builtin::Eq => self.generate_compare(node, name, Cond::Eq, args, r),
            Builtin::Ne => self.generate_compare(node, name, Cond::Ne, args, r),
            Builtin::If => self.generate_if(node, name, args, r),
            Builtin::Setq => self.generate_setq(node, name, args, r),
            Builtin::Print => self.generate_print(node, name, args, r),
            Builtin::Defun => Err(CompileError::InvalidDefinition(
                node.range,
                "defun is only allowed at top level".to_string(),
            )),
        }
    }

    fn resolve_func(&self, node: &Node, name: &SmolStr, argc: usize) -> Result<(FuncId, ValueKind), CompileError> {
        match self.ctx.lookup_func(name) {
            Some(id) => {
                let func = self.ctx.func(id);

                if func.arity() == argc {
                    Ok((id, func.kind))
                } else {
                    Err(CompileError::InvalidNumberOfArguments(
                        node.range,
                        name.clone(),
                        func.arity(),
                        argc,
                    ))
                }
            }
            None if self.params.contains(name) || self.ctx.lookup_var(name).is_some() => {
                Err(CompileError::NotCallable(node.range, name.to_string()))
            }
            None => Err(CompileError::NotDefined(node.range, name.clone())),
        }
    }

    fn generate_args(&mut self, args: &[Node], start: Reg) -> Result<(), CompileError> {
        for (i, arg) in args.iter().enumerate() {
            self.generate(arg, start + i as Reg)?;
        }

        Ok(())
    }

    /// Compiles an operand that may run concurrently with its siblings.
    ///
    /// Calls to user functions that may return an integer become `SPAWN`s and
    /// yield a future in `r`; `r + 1` is reserved for the synchronous fallback result.
    fn generate_operand(&mut self, node: &Node, operator: &SmolStr, r: Reg) -> Result<ValueKind, CompileError> {
        if let Some((callee, args)) = node.call()
            && Builtin::from_str(callee).is_err()
        {
            let (func, kind) = self.resolve_func(node, callee, args.len())?;

            if kind.is_arithmetic() {
                self.generate_args(args, r + 3)?;
                self.cb.create_spawn(func, r + 3);
                return Ok(ValueKind::Future);
            }
        }

        self.generate_integer(node, operator, r)
    }

    fn generate_arith(
        &mut self,
        node: &Node,
        name: &SmolStr,
        op: BinOp,
        args: &[Node],
        r: Reg,
    ) -> Result<ValueKind, CompileError> {
        match (op, args.len()) {
            (BinOp::Add, 0) => {
                self.cb.create_iconst(r, 0);
                return Ok(ValueKind::Int);
            }
            (BinOp::Mul, 0) => {
                self.cb.create_iconst(r, 1);
                return Ok(ValueKind::Int);
            }
            (BinOp::Add | BinOp::Mul, 1) => {
                self.generate_integer(&args[0], name, r)?;
                return Ok(ValueKind::Int);
            }
            (BinOp::Sub, 1) => {
                self.generate_integer(&args[0], name, r)?;
                self.cb.create_neg(r);
                return Ok(ValueKind::Int);
            }
            (BinOp::Sub, 0) => {
                return Err(CompileError::InvalidNumberOfArguments(node.range, name.clone(), 1, 0));
            }
            (BinOp::Div, argc) if argc < 2 => {
                return Err(CompileError::InvalidNumberOfArguments(node.range, name.clone(), 2, argc));
            }
            (BinOp::Mod, argc) if argc != 2 => {
                return Err(CompileError::InvalidNumberOfArguments(node.range, name.clone(), 2, argc));
            }
            _ => {}
        }

        let spawn = self.ctx.config.spawn && matches!(op, BinOp::Add | BinOp::Sub | BinOp::Mul);
        let mut operands: SmallVec<[(Reg, bool); 8]> = SmallVec::new();
        let mut slot = r;

        for (i, arg) in args.iter().enumerate() {
            let kind = if spawn && i + 1 < args.len() {
                self.generate_operand(arg, name, slot)?
            } else {
                self.generate_integer(arg, name, slot)?
            };
            let spawned = kind == ValueKind::Future;

            operands.push((slot, spawned));
            slot += if spawned { 2 } else { 1 };
        }

        for (slot, _) in operands.iter().filter(|(_, spawned)| *spawned) {
            self.cb.create_join(*slot);
        }

        for (slot, _) in operands.iter().skip(1) {
            self.cb.create_binary(op, r, *slot);
        }

        Ok(ValueKind::Int)
    }

    fn generate_comparison_operands(
        &mut self,
        node: &Node,
        name: &SmolStr,
        args: &[Node],
        r: Reg,
    ) -> Result<(), CompileError> {
        let [lhs, rhs] = args else {
            return Err(CompileError::InvalidNumberOfArguments(
                node.range,
                name.clone(),
                2,
                args.len(),
            ));
        };

        self.generate_integral(lhs, name, r)?;
        self.generate_integral(rhs, name, r + 1)?;

        Ok(())
    }

    fn generate_compare(
        &mut self,
        node: &Node,
        name: &SmolStr,
        cond: Cond,
        args: &[Node],
        r: Reg,
    ) -> Result<ValueKind, CompileError> {
        self.generate_comparison_operands(node, name, args, r)?;

        let if_false = self.cb.create_branch(cond.negate(), r, r + 1);
        self.cb.create_bconst(r, true);
        let merge = self.cb.create_jmp();
        self.cb.set_label(if_false);
        self.cb.create_bconst(r, false);
        self.cb.set_label(merge);

        Ok(ValueKind::Bool)
    }

    /// Emits a branch taken when `cond` is false.
    fn generate_condition(&mut self, cond: &Node, r: Reg) -> Result<Label, CompileError> {
        if let Some((name, args)) = cond.call()
            && let Some(test) = Builtin::from_str(name).ok().and_then(Builtin::cond)
        {
            self.generate_comparison_operands(cond, name, args, r)?;
            return Ok(self.cb.create_branch(test.negate(), r, r + 1));
        }

        if !self.generate(cond, r)?.is_integral() {
            return Err(CompileError::NotInteger(cond.range, SmolStr::new_static("if")));
        }

        self.cb.create_iconst(r + 1, 0);
        Ok(self.cb.create_branch(Cond::Eq, r, r + 1))
    }

    fn generate_if(&mut self, node: &Node, name: &SmolStr, args: &[Node], r: Reg) -> Result<ValueKind, CompileError> {
        let (cond, then, otherwise) = match args {
            [cond, then] => (cond, then, None),
            [cond, then, otherwise] => (cond, then, Some(otherwise)),
            _ => {
                return Err(CompileError::InvalidNumberOfArguments(
                    node.range,
                    name.clone(),
                    3,
                    args.len(),
                ));
            }
        };

        let if_false = self.generate_condition(cond, r)?;
        let then_kind = self.generate(then, r)?;
        let merge = self.cb.create_jmp();

        self.cb.set_label(if_false);
        let else_kind = match otherwise {
            Some(otherwise) => self.generate(otherwise, r)?,
            None => {
                self.cb.create_bconst(r, false);
                ValueKind::Bool
            }
        };
        self.cb.set_label(merge);

        Ok(then_kind.merge(else_kind))
    }

    fn generate_setq(&mut self, node: &Node, name: &SmolStr, args: &[Node], r: Reg) -> Result<ValueKind, CompileError> {
        let [target, value] = args else {
            return Err(CompileError::InvalidNumberOfArguments(
                node.range,
                name.clone(),
                2,
                args.len(),
            ));
        };

        let var_name = match target.symbol() {
            Some(var_name) if !matches!(var_name.as_str(), "t" | "nil") => var_name,
            _ => {
                return Err(CompileError::InvalidDefinition(
                    target.range,
                    format!("cannot assign to `{}`", target),
                ));
            }
        };

        let kind = self.generate(value, r)?;
        let var = self.ctx.define_var(var_name);
        self.cb.create_store_global(r, var);

        Ok(kind)
    }

    fn generate_print(&mut self, node: &Node, name: &SmolStr, args: &[Node], r: Reg) -> Result<ValueKind, CompileError> {
        let [value] = args else {
            return Err(CompileError::InvalidNumberOfArguments(
                node.range,
                name.clone(),
                1,
                args.len(),
            ));
        };

        let kind = self.generate(value, r)?;

        if kind == ValueKind::Bool {
            self.cb.create_bprint(r);
        } else {
            self.cb.create_iprint(r);
        }

        Ok(kind)
    }
}
