use thiserror::Error;

use crate::lexer::token::Token;

#[derive(Error, Debug, PartialEq, Clone)]
pub enum ParseError {
    #[error("Unexpected token `{0}`")]
    UnexpectedToken(Token),
    #[error("Unexpected EOF detected")]
    UnexpectedEOFDetected,
    #[error("Expected a closing parenthesis `)` for `{0}`")]
    ExpectedClosingParen(Token),
}
