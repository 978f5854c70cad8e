pub mod builtin;
pub mod codegen;
pub mod error;

use std::{slice, str::FromStr, sync::Arc};

use itertools::Itertools;
use smol_str::SmolStr;
use tracing::debug;

use crate::{
    ast::node::Node,
    bytecode::{FuncId, Inst, Reg, code_words},
    context::Context,
    optimizer::Optimizer,
    value::ValueKind,
    vm::{self, ThreadedCode},
};

pub use builtin::Builtin;
pub use codegen::CodeGenerator;
pub use error::CompileError;

/// Outcome of compiling one top-level form.
#[derive(Debug, Clone)]
pub enum Compiled {
    /// A `defun` that bound a new function.
    Function(SmolStr),
    /// Any other form, wrapped as an anonymous entry function.
    Entry(Arc<ThreadedCode>),
}

pub struct Compiler<'a> {
    ctx: &'a mut Context,
}

impl<'a> Compiler<'a> {
    pub fn new(ctx: &'a mut Context) -> Self {
        Self { ctx }
    }

    /// Compiles one top-level form. A form that fails leaves no new globals behind.
    pub fn compile(&mut self, node: &Node) -> Result<Compiled, CompileError> {
        let mark = self.ctx.globals_mark();
        let compiled = match node.call() {
            Some((name, args)) if matches!(Builtin::from_str(name), Ok(Builtin::Defun)) => {
                self.compile_defun(node, args)
            }
            _ => self.compile_entry(node),
        };

        if compiled.is_err() {
            self.ctx.rollback_globals(mark);
        }

        compiled
    }

    fn compile_defun(&mut self, node: &Node, args: &[Node]) -> Result<Compiled, CompileError> {
        let invalid = |node: &Node, message: String| CompileError::InvalidDefinition(node.range, message);

        let (name_node, params_node, body) = match args {
            [name, params, body @ ..] => (name, params, body),
            _ => return Err(invalid(node, "expected (defun name (params...) body...)".to_string())),
        };

        let name = match name_node.symbol() {
            Some(name) if !is_reserved(name) => name.clone(),
            _ => return Err(invalid(name_node, format!("cannot define `{}`", name_node))),
        };

        let params = params_node
            .list()
            .ok_or_else(|| invalid(params_node, format!("expected a parameter list, got `{}`", params_node)))?
            .iter()
            .map(|param| match param.symbol() {
                Some(param_name) if !matches!(param_name.as_str(), "t" | "nil") => Ok(param_name.clone()),
                _ => Err(invalid(param, format!("invalid parameter `{}`", param))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(duplicate) = params.iter().duplicates().next() {
            return Err(invalid(params_node, format!("duplicate parameter `{}`", duplicate)));
        }

        if body.is_empty() {
            return Err(invalid(node, format!("missing body of `{}`", name)));
        }

        let definition = self.ctx.define_func(name.clone(), params.clone());

        if let Err(err) = self.compile_function(definition.id, &params, body) {
            self.ctx.rollback(definition);
            return Err(err);
        }

        Ok(Compiled::Function(name))
    }

    fn compile_function(&mut self, id: FuncId, params: &[SmolStr], body: &[Node]) -> Result<(), CompileError> {
        let arity = params.len();
        let mut generator = CodeGenerator::new(self.ctx, params);
        let kind = generator.generate_body(body, arity as Reg)?;
        let raw = generator.finish();

        let code = self.optimize(raw.clone(), Some(id));
        let threaded = Arc::new(vm::lower(&code, arity));

        debug!(
            name = %self.ctx.func(id).name,
            %kind,
            raw = code_words(&raw),
            optimized = code_words(&code),
            "Compiled function"
        );

        let func = self.ctx.func_mut(id);
        func.kind = kind;
        func.raw = raw;
        func.code = code;
        self.ctx.finalize(id, threaded);

        Ok(())
    }

    fn compile_entry(&mut self, node: &Node) -> Result<Compiled, CompileError> {
        let mut generator = CodeGenerator::new(self.ctx, &[]);
        let kind = generator.generate_body(slice::from_ref(node), 0)?;
        let raw = generator.finish();

        let code = self.optimize(raw, None);
        debug!(%kind, words = code_words(&code), "Compiled entry");

        Ok(Compiled::Entry(Arc::new(vm::lower(&code, 0))))
    }

    fn optimize(&self, code: Vec<Inst>, this: Option<FuncId>) -> Vec<Inst> {
        if self.ctx.config.optimize {
            Optimizer::new(self.ctx, this).run(code)
        } else {
            code
        }
    }
}

/// Names that a `defun` may not rebind.
fn is_reserved(name: &str) -> bool {
    matches!(name, "t" | "nil") || Builtin::from_str(name).is_ok()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{ast::parser::Parser, config::Config, lexer::Lexer};

    fn compile(ctx: &mut Context, code: &str) -> Result<Compiled, CompileError> {
        let tokens = Lexer::new().tokenize(code).unwrap();
        let nodes = Parser::new(tokens.iter()).parse().unwrap();
        Compiler::new(ctx).compile(&nodes[0])
    }

    #[test]
    fn test_defun_binds_function() {
        let mut ctx = Context::new(Config::default());
        let compiled = compile(&mut ctx, "(defun inc (x) (+ x 1))").unwrap();

        assert!(matches!(compiled, Compiled::Function(name) if name == "inc"));
        let id = ctx.lookup_func("inc").unwrap();
        let func = ctx.func(id);
        assert_eq!(func.arity(), 1);
        assert_eq!(func.kind, ValueKind::Int);
        assert!(func.threaded.is_some());
        assert!(func.code_words() <= code_words(&func.raw));
    }

    #[test]
    fn test_boolean_function_kind() {
        let mut ctx = Context::new(Config::default());
        compile(&mut ctx, "(defun neg? (x) (< x 0))").unwrap();

        let id = ctx.lookup_func("neg?").unwrap();
        assert_eq!(ctx.func(id).kind, ValueKind::Bool);
    }

    #[test]
    fn test_unoptimized_code_is_raw() {
        let mut ctx = Context::new(Config::default().with_optimize(false));
        compile(&mut ctx, "(defun two () (+ 1 1))").unwrap();

        let func = ctx.func(ctx.lookup_func("two").unwrap());
        assert_eq!(func.code, func.raw);
    }

    #[test]
    fn test_failed_defun_is_rolled_back() {
        let mut ctx = Context::new(Config::default());
        compile(&mut ctx, "(defun f (x) x)").unwrap();
        let before = ctx.lookup_func("f");

        assert!(compile(&mut ctx, "(defun f (x) (+ x y))").is_err());
        assert_eq!(ctx.lookup_func("f"), before);
        assert_eq!(ctx.functions().count(), 1);
    }

    #[test]
    fn test_entry_is_lowered() {
        let mut ctx = Context::new(Config::default());
        let compiled = compile(&mut ctx, "(= 1 1)").unwrap();

        assert!(matches!(compiled, Compiled::Entry(code) if !code.is_empty()));
    }

    #[rstest]
    #[case::entry("(if (setq z 1) (undefined))")]
    #[case::defun("(defun f () (setq z 1) (undefined))")]
    fn test_failed_form_forgets_new_globals(#[case] code: &str) {
        let mut ctx = Context::new(Config::default());
        compile(&mut ctx, "(setq y 2)").unwrap();

        assert!(compile(&mut ctx, code).is_err());
        assert!(ctx.lookup_var("z").is_none());
        assert!(ctx.lookup_var("y").is_some());
    }

    #[test]
    fn test_parameter_function_kind() {
        let mut ctx = Context::new(Config::default());
        compile(&mut ctx, "(defun id (x) x)").unwrap();
        compile(&mut ctx, "(defun maybe (x) (if (< x 0) x))").unwrap();

        assert_eq!(ctx.func(ctx.lookup_func("id").unwrap()).kind, ValueKind::Any);
        assert_eq!(ctx.func(ctx.lookup_func("maybe").unwrap()).kind, ValueKind::Any);
    }

    #[rstest]
    #[case::missing_params("(defun f)", "Invalid definition, expected (defun name (params...) body...)")]
    #[case::missing_body("(defun f (x))", "Invalid definition, missing body of `f`")]
    #[case::builtin_name("(defun + (x) x)", "Invalid definition, cannot define `+`")]
    #[case::reserved_name("(defun nil () 1)", "Invalid definition, cannot define `nil`")]
    #[case::params_not_list("(defun f x x)", "Invalid definition, expected a parameter list, got `x`")]
    #[case::numeric_param("(defun f (1) 1)", "Invalid definition, invalid parameter `1`")]
    #[case::duplicate_param("(defun f (x x) x)", "Invalid definition, duplicate parameter `x`")]
    fn test_defun_error(#[case] code: &str, #[case] expected: &str) {
        let mut ctx = Context::new(Config::default());
        assert_eq!(compile(&mut ctx, code).unwrap_err().to_string(), expected);
        assert_eq!(ctx.functions().count(), 0);
    }
}
