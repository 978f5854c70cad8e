use std::fmt::{self, Display, Formatter};

use smol_str::SmolStr;

use crate::range::Range;

#[derive(PartialEq, Debug, Clone)]
pub struct Token {
    pub range: Range,
    pub kind: TokenKind,
}

#[derive(PartialEq, Debug, Clone)]
pub enum TokenKind {
    LParen,
    RParen,
    IntLiteral(i64),
    FloatLiteral(f64),
    Symbol(SmolStr),
    Eof,
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", self.kind)
    }
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match &self {
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::IntLiteral(i) => write!(f, "{}", i),
            TokenKind::FloatLiteral(n) => write!(f, "{}", n),
            TokenKind::Symbol(s) => write!(f, "{}", s),
            TokenKind::Eof => write!(f, ""),
        }
    }
}
