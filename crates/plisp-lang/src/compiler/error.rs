use smol_str::SmolStr;
use thiserror::Error;

use crate::range::Range;

type Name = SmolStr;

#[derive(Error, Debug, PartialEq, Clone)]
pub enum CompileError {
    #[error("\"{1}\" is not defined")]
    NotDefined(Range, Name),
    #[error("\"{1}\" is not callable")]
    NotCallable(Range, String),
    #[error("Invalid number of arguments in \"{1}\", expected {2}, got {3}")]
    InvalidNumberOfArguments(Range, Name, usize, usize),
    #[error("Non-integer operand for \"{1}\"")]
    NotInteger(Range, Name),
    #[error("Invalid definition, {1}")]
    InvalidDefinition(Range, String),
    #[error("Unexpected form `{1}`")]
    UnexpectedForm(Range, String),
}

impl CompileError {
    /// Source range of the node the error points at.
    pub fn range(&self) -> Range {
        match self {
            CompileError::NotDefined(range, _)
            | CompileError::NotCallable(range, _)
            | CompileError::InvalidNumberOfArguments(range, _, _, _)
            | CompileError::NotInteger(range, _)
            | CompileError::InvalidDefinition(range, _)
            | CompileError::UnexpectedForm(range, _) => *range,
        }
    }
}
