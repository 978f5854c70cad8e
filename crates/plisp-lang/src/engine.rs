use std::sync::Arc;

use smol_str::SmolStr;

use crate::{
    ast::node::Node,
    bytecode::Listing,
    compiler::{Compiled, Compiler},
    config::{Config, SchedulerKind},
    context::{Context, Func},
    error::{Error, InnerError},
    parse,
    scheduler::Scheduler,
    value::{Value, Values},
    vm::Program,
};

/// Compiles and runs plisp source, keeping definitions between calls.
///
/// The worker threads are started once and shared by every evaluation.
pub struct Engine {
    ctx: Context,
    scheduler: Scheduler,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Engine {
    pub fn new(config: Config) -> Self {
        let scheduler = Scheduler::new(&config);

        Self {
            ctx: Context::new(config),
            scheduler,
        }
    }

    /// Evaluates every top-level form of `code` in order, stopping at the first error.
    #[allow(clippy::result_large_err)]
    pub fn eval(&mut self, code: &str) -> Result<Values, Error> {
        let program = parse(code)?;

        program
            .iter()
            .map(|node| {
                self.eval_node(node)
                    .map_err(|cause| Error::from_error(code, cause, Some(node.range)))
            })
            .collect()
    }

    pub fn eval_node(&mut self, node: &Node) -> Result<Value, InnerError> {
        match Compiler::new(&mut self.ctx).compile(node)? {
            Compiled::Function(name) => Ok(Value::Symbol(name)),
            Compiled::Entry(code) => {
                let program = Arc::new(Program::new(self.ctx.func_table(), code));
                let value = self.scheduler.run(program)?;

                Ok(Value::from(value))
            }
        }
    }

    /// Number of functions currently bound.
    pub fn define_count(&self) -> usize {
        self.ctx.functions().count()
    }

    pub fn functions(&self) -> impl Iterator<Item = &Func> {
        self.ctx.functions()
    }

    pub fn variables(&self) -> Vec<(SmolStr, Value)> {
        self.ctx
            .variables()
            .map(|(name, value)| (name.clone(), Value::from(value)))
            .collect()
    }

    /// Optimized bytecode listing of the function called `name`.
    pub fn disassemble(&self, name: &str) -> Option<String> {
        self.ctx
            .lookup_func(name)
            .map(|id| Listing(&self.ctx.func(id).code).to_string())
    }

    pub fn config(&self) -> &Config {
        self.ctx.config()
    }

    pub fn scheduler_kind(&self) -> SchedulerKind {
        self.scheduler.kind()
    }

    pub const fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }
}
