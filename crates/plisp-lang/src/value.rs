use std::fmt::{self, Display, Formatter};

use smol_str::SmolStr;

use crate::vm::RuntimeValue;

/// Static kind of a compiled expression.
///
/// The kind decides which operands an expression may appear in and whether
/// a `JOIN` is needed before it is used. Values carry their own tag at run
/// time, so `Any` is checked by the instruction that consumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Int,
    Bool,
    Float,
    /// Parameters, globals and expressions whose branches disagree.
    Any,
    /// Handle of a spawned task.
    Future,
}

impl ValueKind {
    /// Accepted by comparisons and conditions, where booleans count as 0 and 1.
    pub fn is_integral(self) -> bool {
        matches!(self, ValueKind::Int | ValueKind::Bool | ValueKind::Any)
    }

    /// Accepted by arithmetic.
    pub fn is_arithmetic(self) -> bool {
        matches!(self, ValueKind::Int | ValueKind::Any)
    }

    /// Kind of a value that comes from either of two branches.
    pub fn merge(self, other: Self) -> Self {
        if self == other { self } else { ValueKind::Any }
    }
}

impl Display for ValueKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Int => write!(f, "int"),
            ValueKind::Bool => write!(f, "boolean"),
            ValueKind::Float => write!(f, "float"),
            ValueKind::Any => write!(f, "any"),
            ValueKind::Future => write!(f, "future"),
        }
    }
}

/// Result of evaluating one top-level form.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Name of a function introduced by `defun`.
    Symbol(SmolStr),
}

pub type Values = Vec<Value>;

impl From<RuntimeValue> for Value {
    fn from(value: RuntimeValue) -> Self {
        match value {
            RuntimeValue::Int(i) => Value::Int(i),
            RuntimeValue::Bool(b) => Value::Bool(b),
            RuntimeValue::Float(n) => Value::Float(n),
            other => unreachable!("non-value {:?} escaped to the top level", other),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(n) => write!(f, "{:?}", n),
            Value::Bool(true) => write!(f, "T"),
            Value::Bool(false) => write!(f, "Nil"),
            Value::Symbol(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::int(Value::Int(-3), "-3")]
    #[case::float(Value::Float(2.5), "2.5")]
    #[case::t(Value::Bool(true), "T")]
    #[case::nil(Value::Bool(false), "Nil")]
    #[case::symbol(Value::Symbol("fib".into()), "fib")]
    fn test_display(#[case] value: Value, #[case] expected: &str) {
        assert_eq!(value.to_string(), expected);
    }

    #[rstest]
    #[case::int(RuntimeValue::Int(1), Value::Int(1))]
    #[case::bool(RuntimeValue::Bool(true), Value::Bool(true))]
    #[case::float(RuntimeValue::Float(0.5), Value::Float(0.5))]
    fn test_from_runtime(#[case] rv: RuntimeValue, #[case] expected: Value) {
        assert_eq!(Value::from(rv), expected);
    }

    #[rstest]
    #[case::same(ValueKind::Bool, ValueKind::Bool, ValueKind::Bool)]
    #[case::int_and_bool(ValueKind::Int, ValueKind::Bool, ValueKind::Any)]
    #[case::int_and_any(ValueKind::Any, ValueKind::Int, ValueKind::Any)]
    fn test_merge(#[case] lhs: ValueKind, #[case] rhs: ValueKind, #[case] expected: ValueKind) {
        assert_eq!(lhs.merge(rhs), expected);
    }
}
