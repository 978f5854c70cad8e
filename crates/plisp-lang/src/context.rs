use std::sync::Arc;

use crossbeam::atomic::AtomicCell;
use itertools::Itertools;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::{
    bytecode::{FuncId, Inst, VarRef, code_words},
    config::Config,
    value::ValueKind,
    vm::{RuntimeValue, ThreadedCode},
};

/// A global variable cell, shared between the compiled code and the tasks running it.
#[derive(Debug)]
pub struct Variable {
    pub name: SmolStr,
    value: AtomicCell<RuntimeValue>,
}

impl Variable {
    pub fn new(name: SmolStr) -> Self {
        Self {
            name,
            value: AtomicCell::new(RuntimeValue::Int(0)),
        }
    }

    #[inline(always)]
    pub fn load(&self) -> RuntimeValue {
        self.value.load()
    }

    #[inline(always)]
    pub fn store(&self, value: RuntimeValue) {
        self.value.store(value)
    }
}

/// A user function created by `defun`.
#[derive(Debug, Clone)]
pub struct Func {
    pub name: SmolStr,
    pub params: Vec<SmolStr>,
    /// Kind of the value the body returns.
    pub kind: ValueKind,
    /// Bytecode as emitted by the code generator.
    pub raw: Vec<Inst>,
    /// Bytecode after the optimizer; what callers inline.
    pub code: Vec<Inst>,
    pub threaded: Option<Arc<ThreadedCode>>,
}

impl Func {
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn code_words(&self) -> usize {
        code_words(&self.code)
    }
}

/// Registration of a function name, kept so a failed compile can be undone.
#[derive(Debug, Clone, Copy)]
pub struct Definition {
    pub id: FuncId,
    previous: Option<FuncId>,
}

pub type FuncTable = Arc<[Option<Arc<ThreadedCode>>]>;

/// Global symbol tables and runtime configuration.
///
/// Functions and variables are looked up by name; a later definition
/// replaces the binding of an earlier one without affecting code already
/// compiled against it.
#[derive(Debug, Default)]
pub struct Context {
    pub(crate) config: Config,
    funcs: Vec<Func>,
    func_names: FxHashMap<SmolStr, FuncId>,
    globals: Vec<VarRef>,
    global_names: FxHashMap<SmolStr, usize>,
    table: Option<FuncTable>,
}

impl Context {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn lookup_func(&self, name: &str) -> Option<FuncId> {
        self.func_names.get(name).copied()
    }

    pub fn func(&self, id: FuncId) -> &Func {
        &self.funcs[id.index()]
    }

    pub(crate) fn func_mut(&mut self, id: FuncId) -> &mut Func {
        &mut self.funcs[id.index()]
    }

    /// Registers `name` before its body is compiled so the body can call itself.
    pub(crate) fn define_func(&mut self, name: SmolStr, params: Vec<SmolStr>) -> Definition {
        let id = FuncId(self.funcs.len() as u32);
        self.funcs.push(Func {
            name: name.clone(),
            params,
            kind: ValueKind::Int,
            raw: Vec::new(),
            code: Vec::new(),
            threaded: None,
        });
        let previous = self.func_names.insert(name, id);

        Definition { id, previous }
    }

    /// Undoes a registration whose body failed to compile.
    pub(crate) fn rollback(&mut self, definition: Definition) {
        let Definition { id, previous } = definition;
        let name = self.func(id).name.clone();

        match previous {
            Some(previous) => self.func_names.insert(name, previous),
            None => self.func_names.remove(&name),
        };

        if id.index() + 1 == self.funcs.len() {
            self.funcs.pop();
        }
    }

    pub(crate) fn finalize(&mut self, id: FuncId, threaded: Arc<ThreadedCode>) {
        self.func_mut(id).threaded = Some(threaded);
        self.table = None;
    }

    /// Threaded code of every function, indexed by [`FuncId`].
    pub(crate) fn func_table(&mut self) -> FuncTable {
        if let Some(table) = &self.table {
            return Arc::clone(table);
        }

        let table: FuncTable = self.funcs.iter().map(|func| func.threaded.clone()).collect();
        self.table = Some(Arc::clone(&table));
        table
    }

    pub fn lookup_var(&self, name: &str) -> Option<VarRef> {
        self.global_names
            .get(name)
            .map(|index| self.globals[*index].clone())
    }

    /// Returns the variable called `name`, creating it on first use.
    pub(crate) fn define_var(&mut self, name: &SmolStr) -> VarRef {
        if let Some(var) = self.lookup_var(name) {
            return var;
        }

        let var = VarRef::new(Variable::new(name.clone()));
        self.global_names.insert(name.clone(), self.globals.len());
        self.globals.push(var.clone());
        var
    }

    /// Number of globals defined so far, for [`Context::rollback_globals`].
    pub(crate) fn globals_mark(&self) -> usize {
        self.globals.len()
    }

    /// Forgets the globals created after `mark`.
    pub(crate) fn rollback_globals(&mut self, mark: usize) {
        for var in self.globals.drain(mark..) {
            self.global_names.remove(&var.variable().name);
        }
    }

    /// Currently bound functions, sorted by name.
    pub fn functions(&self) -> impl Iterator<Item = &Func> {
        self.func_names
            .iter()
            .sorted_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, id)| self.func(*id))
    }

    /// Global variables with their current values, sorted by name.
    pub fn variables(&self) -> impl Iterator<Item = (&SmolStr, RuntimeValue)> {
        self.globals
            .iter()
            .map(VarRef::variable)
            .sorted_by(|a, b| a.name.cmp(&b.name))
            .map(|variable| (&variable.name, variable.load()))
    }
}
