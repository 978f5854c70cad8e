use std::fmt::{self, Display, Formatter};

use crate::{bytecode::FuncId, scheduler::TaskId};

use super::error::RuntimeError;

/// Code object a return address points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CodeRef {
    /// Anonymous function compiled from a top-level form.
    #[default]
    Entry,
    Func(FuncId),
}

impl Display for CodeRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CodeRef::Entry => write!(f, "<entry>"),
            CodeRef::Func(id) => write!(f, "{}", id),
        }
    }
}

/// One slot of a task's value stack.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum RuntimeValue {
    #[default]
    None,
    Int(i64),
    Bool(bool),
    Float(f64),
    /// Handle written by `SPAWN`; `None` when the call ran synchronously.
    Future(Option<TaskId>),
    /// Caller frame base saved by `CALL`.
    Frame(usize),
    /// Return address saved by `CALL`.
    Return { code: CodeRef, pc: u32 },
}

impl RuntimeValue {
    /// Operand of an arithmetic instruction.
    #[inline(always)]
    pub fn int(self) -> Result<i64, RuntimeError> {
        match self {
            RuntimeValue::Int(i) => Ok(i),
            other => Err(RuntimeError::TypeMismatch(other.name())),
        }
    }

    /// Operand of a comparison, where booleans count as 0 and 1.
    #[inline(always)]
    pub fn integral(self) -> Result<i64, RuntimeError> {
        match self {
            RuntimeValue::Int(i) => Ok(i),
            RuntimeValue::Bool(b) => Ok(b as i64),
            other => Err(RuntimeError::TypeMismatch(other.name())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RuntimeValue::None => "none",
            RuntimeValue::Int(_) => "int",
            RuntimeValue::Bool(_) => "boolean",
            RuntimeValue::Float(_) => "float",
            RuntimeValue::Future(_) => "future",
            RuntimeValue::Frame(_) => "frame",
            RuntimeValue::Return { .. } => "return address",
        }
    }
}

impl From<i64> for RuntimeValue {
    fn from(i: i64) -> Self {
        RuntimeValue::Int(i)
    }
}

impl From<bool> for RuntimeValue {
    fn from(b: bool) -> Self {
        RuntimeValue::Bool(b)
    }
}

impl From<f64> for RuntimeValue {
    fn from(n: f64) -> Self {
        RuntimeValue::Float(n)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::int(RuntimeValue::Int(3), Ok(3))]
    #[case::bool(RuntimeValue::from(true), Err(RuntimeError::TypeMismatch("boolean")))]
    #[case::float(RuntimeValue::Float(1.0), Err(RuntimeError::TypeMismatch("float")))]
    #[case::future(RuntimeValue::Future(None), Err(RuntimeError::TypeMismatch("future")))]
    #[case::none(RuntimeValue::None, Err(RuntimeError::TypeMismatch("none")))]
    fn test_int(#[case] value: RuntimeValue, #[case] expected: Result<i64, RuntimeError>) {
        assert_eq!(value.int(), expected);
    }

    #[rstest]
    #[case::int(RuntimeValue::Int(-3), Ok(-3))]
    #[case::t(RuntimeValue::from(true), Ok(1))]
    #[case::nil(RuntimeValue::from(false), Ok(0))]
    #[case::float(RuntimeValue::Float(1.0), Err(RuntimeError::TypeMismatch("float")))]
    fn test_integral(#[case] value: RuntimeValue, #[case] expected: Result<i64, RuntimeError>) {
        assert_eq!(value.integral(), expected);
    }
}
