//! `plisp-lang` compiles a small Lisp to register bytecode and runs it on a
//! pool of worker threads.
//!
//! ## Examples
//!
//! ```rust
//! use plisp_lang::{Config, Engine, Value};
//!
//! let mut engine = Engine::new(Config::default().with_workers(2));
//! engine.eval("(defun fib (n) (if (< n 2) n (+ (fib (- n 1)) (fib (- n 2)))))").unwrap();
//!
//! assert_eq!(engine.eval("(fib 10)").unwrap(), vec![Value::Int(55)]);
//! ```
mod ast;
mod bytecode;
mod compiler;
mod config;
mod context;
mod engine;
mod error;
mod lexer;
mod optimizer;
mod range;
mod scheduler;
mod value;
mod vm;

use ast::parser::Parser;
use lexer::Lexer;

pub use ast::Program;
pub use ast::error::ParseError;
pub use ast::node::{Expr as AstExpr, Node as AstNode};
pub use bytecode::{BinOp, CodeBuilder, Cond, FuncId, Inst, Listing, Opcode, Reg, code_words};
pub use compiler::{CodeGenerator, CompileError, Compiled, Compiler};
pub use config::{Config, SchedulerKind};
pub use context::{Context, Func};
pub use engine::Engine;
pub use error::{Error, InnerError};
pub use lexer::error::LexerError;
pub use lexer::token::{Token, TokenKind};
pub use optimizer::Optimizer;
pub use range::{Position, Range};
pub use scheduler::{Scheduler, TaskPool};
pub use value::{Value, ValueKind, Values};
pub use vm::{Program as ThreadedProgram, RuntimeError, RuntimeValue, ThreadedCode, lower};

pub type PlispResult = Result<Values, Error>;

/// Parses `code` into top-level forms.
#[allow(clippy::result_large_err)]
pub fn parse(code: &str) -> Result<Program, Error> {
    let tokens = Lexer::new()
        .tokenize(code)
        .map_err(|e| Error::from_error(code, InnerError::Lexer(e), None))?;

    Parser::new(tokens.iter())
        .parse()
        .map_err(|e| Error::from_error(code, InnerError::Parse(e), None))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::forms("(+ 1 2) 3", 2)]
    #[case::empty("", 0)]
    #[case::comment("; nothing\n(print 1)", 1)]
    fn test_parse(#[case] code: &str, #[case] expected: usize) {
        assert_eq!(parse(code).unwrap().len(), expected);
    }

    #[test]
    fn test_parse_unclosed() {
        let err = parse("(+ 1 (f 2)").unwrap_err();
        assert!(matches!(err.cause, InnerError::Parse(ParseError::ExpectedClosingParen(_))));
    }
}
