use thiserror::Error;

use super::token::Token;

#[derive(Error, Debug, PartialEq)]
pub enum LexerError {
    #[error("Unexpected token `{0}`")]
    UnexpectedToken(Token),
    #[error("Integer literal out of range `{0}`")]
    InvalidNumber(Token),
}
