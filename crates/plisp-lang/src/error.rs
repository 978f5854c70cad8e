use miette::{Diagnostic, SourceOffset, SourceSpan};

use crate::{
    ast::error::ParseError, compiler::error::CompileError, lexer::error::LexerError, range::Range,
    vm::RuntimeError,
};

#[allow(clippy::useless_conversion)]
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum InnerError {
    #[error(transparent)]
    Lexer(#[from] LexerError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// An error with the source it was raised from, ready to be rendered by `miette`.
#[derive(PartialEq, Debug, thiserror::Error)]
#[error("{cause}")]
pub struct Error {
    pub cause: InnerError,
    pub source_code: String,
    pub location: SourceSpan,
}

impl Error {
    /// Wraps `cause`; `form` is the range of the top-level form being
    /// evaluated and is used when the cause carries no position itself.
    pub fn from_error(source_code: impl Into<String>, cause: InnerError, form: Option<Range>) -> Self {
        let source_code = source_code.into();
        let range = match &cause {
            InnerError::Lexer(LexerError::UnexpectedToken(token) | LexerError::InvalidNumber(token)) => {
                Some(token.range)
            }
            InnerError::Parse(ParseError::UnexpectedToken(token) | ParseError::ExpectedClosingParen(token)) => {
                Some(token.range)
            }
            InnerError::Parse(ParseError::UnexpectedEOFDetected) => None,
            InnerError::Compile(err) => Some(err.range()),
            InnerError::Runtime(_) => form,
        };

        let location = match range {
            Some(range) => {
                let start = SourceOffset::from_location(&source_code, range.start.line as usize, range.start.column);
                let end = SourceOffset::from_location(&source_code, range.end.line as usize, range.end.column);
                SourceSpan::new(start, end.offset().saturating_sub(start.offset()).max(1))
            }
            None => SourceSpan::new(source_code.len().saturating_sub(1).into(), 1),
        };

        Self {
            cause,
            source_code,
            location,
        }
    }
}

impl Diagnostic for Error {
    fn code<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let c = match &self.cause {
            InnerError::Lexer(LexerError::UnexpectedToken(_)) => "LexerError::UnexpectedToken",
            InnerError::Lexer(LexerError::InvalidNumber(_)) => "LexerError::InvalidNumber",
            InnerError::Parse(ParseError::UnexpectedToken(_)) => "ParseError::UnexpectedToken",
            InnerError::Parse(ParseError::UnexpectedEOFDetected) => "ParseError::UnexpectedEOFDetected",
            InnerError::Parse(ParseError::ExpectedClosingParen(_)) => "ParseError::ExpectedClosingParen",
            InnerError::Compile(CompileError::NotDefined(..)) => "CompileError::NotDefined",
            InnerError::Compile(CompileError::NotCallable(..)) => "CompileError::NotCallable",
            InnerError::Compile(CompileError::InvalidNumberOfArguments(..)) => {
                "CompileError::InvalidNumberOfArguments"
            }
            InnerError::Compile(CompileError::NotInteger(..)) => "CompileError::NotInteger",
            InnerError::Compile(CompileError::InvalidDefinition(..)) => "CompileError::InvalidDefinition",
            InnerError::Compile(CompileError::UnexpectedForm(..)) => "CompileError::UnexpectedForm",
            InnerError::Runtime(RuntimeError::ZeroDivision) => "RuntimeError::ZeroDivision",
            InnerError::Runtime(RuntimeError::TypeMismatch(_)) => "RuntimeError::TypeMismatch",
            InnerError::Runtime(RuntimeError::StackOverflow) => "RuntimeError::StackOverflow",
            InnerError::Runtime(RuntimeError::WorkerDisconnected) => "RuntimeError::WorkerDisconnected",
        };

        Some(Box::new(c))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let msg = match &self.cause {
            InnerError::Parse(ParseError::ExpectedClosingParen(_)) => {
                Some("Check for a missing `)` in the form.".to_string())
            }
            InnerError::Compile(CompileError::NotDefined(_, name)) => {
                Some(format!("'{name}' is not defined. Did you forget to `defun` or `setq` it?"))
            }
            InnerError::Compile(CompileError::InvalidNumberOfArguments(_, _, expected, actual)) => Some(format!(
                "Invalid number of arguments: expected {expected}, got {actual}."
            )),
            InnerError::Compile(CompileError::NotInteger(..)) => {
                Some("Arithmetic and comparisons only accept integers and booleans.".to_string())
            }
            InnerError::Runtime(RuntimeError::ZeroDivision) => Some("Division by zero is not allowed.".to_string()),
            InnerError::Runtime(RuntimeError::StackOverflow) => {
                Some("Recursion too deep. Increase the task stack size or check the base case.".to_string())
            }
            _ => None,
        };

        msg.map(|m| Box::new(m) as Box<dyn std::fmt::Display>)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = miette::LabeledSpan> + '_>> {
        Some(Box::new(std::iter::once(miette::LabeledSpan::new_with_span(
            Some(format!("{}", self.cause)),
            self.location,
        ))))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&self.source_code)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{
        lexer::token::{Token, TokenKind},
        range::Position,
    };

    fn range(start: usize, end: usize) -> Range {
        Range::new(Position::new(1, start), Position::new(1, end))
    }

    #[rstest]
    #[case::compile(
        InnerError::Compile(CompileError::NotDefined(range(4, 5), "y".into())),
        None,
        SourceSpan::new(3.into(), 1),
        "CompileError::NotDefined"
    )]
    #[case::parse(
        InnerError::Parse(ParseError::ExpectedClosingParen(Token { range: range(1, 2), kind: TokenKind::LParen })),
        None,
        SourceSpan::new(0.into(), 1),
        "ParseError::ExpectedClosingParen"
    )]
    #[case::runtime(
        InnerError::Runtime(RuntimeError::ZeroDivision),
        Some(range(1, 8)),
        SourceSpan::new(0.into(), 7),
        "RuntimeError::ZeroDivision"
    )]
    fn test_from_error(
        #[case] cause: InnerError,
        #[case] form: Option<Range>,
        #[case] expected: SourceSpan,
        #[case] code: &str,
    ) {
        let err = Error::from_error("(+ 1 y)", cause, form);

        assert_eq!(err.location, expected);
        assert_eq!(err.code().map(|c| c.to_string()), Some(code.to_string()));
    }
}
