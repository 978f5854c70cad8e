use std::iter::Peekable;

use crate::lexer::token::{Token, TokenKind};

use super::Program;
use super::error::ParseError;
use super::node::{Expr, Node};

pub struct Parser<'a> {
    tokens: Peekable<core::slice::Iter<'a, Token>>,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: core::slice::Iter<'a, Token>) -> Self {
        Self {
            tokens: tokens.peekable(),
        }
    }

    pub fn parse(&mut self) -> Result<Program, ParseError> {
        let mut nodes = Vec::new();

        while let Some(token) = self.tokens.peek() {
            if matches!(token.kind, TokenKind::Eof) {
                break;
            }

            nodes.push(self.parse_expr()?);
        }

        Ok(nodes)
    }

    fn parse_expr(&mut self) -> Result<Node, ParseError> {
        let token = self.tokens.next().ok_or(ParseError::UnexpectedEOFDetected)?;

        match &token.kind {
            TokenKind::LParen => self.parse_list(token),
            TokenKind::IntLiteral(i) => Ok(Node::new(token.range, Expr::Int(*i))),
            TokenKind::FloatLiteral(n) => Ok(Node::new(token.range, Expr::Float(*n))),
            TokenKind::Symbol(s) => Ok(Node::new(token.range, Expr::Symbol(s.clone()))),
            TokenKind::RParen => Err(ParseError::UnexpectedToken(token.clone())),
            TokenKind::Eof => Err(ParseError::UnexpectedEOFDetected),
        }
    }

    fn parse_list(&mut self, open: &Token) -> Result<Node, ParseError> {
        let mut nodes = Vec::new();

        loop {
            match self.tokens.peek().map(|token| &token.kind) {
                Some(TokenKind::RParen) => {
                    let close = self.tokens.next().ok_or(ParseError::UnexpectedEOFDetected)?;
                    return Ok(Node::new(open.range.merge(&close.range), Expr::List(nodes)));
                }
                Some(TokenKind::Eof) | None => {
                    return Err(ParseError::ExpectedClosingParen(open.clone()));
                }
                Some(_) => nodes.push(self.parse_expr()?),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::lexer::Lexer;

    fn parse(input: &str) -> Result<Program, ParseError> {
        let tokens = Lexer::new().tokenize(input).unwrap();
        Parser::new(tokens.iter()).parse()
    }

    #[rstest]
    #[case::atom("42", "42")]
    #[case::call("(+ 1 2)", "(+ 1 2)")]
    #[case::nested("(defun f (x) (+ x 1))", "(defun f (x) (+ x 1))")]
    #[case::empty_list("()", "()")]
    #[case::float("(setq y 2.5)", "(setq y 2.5)")]
    fn test_parse_display(#[case] input: &str, #[case] expected: &str) {
        let program = parse(input).unwrap();
        assert_eq!(program.len(), 1);
        assert_eq!(program[0].to_string(), expected);
    }

    #[test]
    fn test_parse_multiple_forms() {
        let program = parse("(setq x 5) x (f x)").unwrap();
        assert_eq!(program.len(), 3);
        assert_eq!(program[1].symbol().map(|s| s.as_str()), Some("x"));
        assert_eq!(program[2].call().map(|(name, args)| (name.as_str(), args.len())), Some(("f", 1)));
    }

    #[rstest]
    #[case::unclosed("(+ 1 2", true)]
    #[case::nested_unclosed("(if (< 1 2) 3", true)]
    #[case::stray_close(")", false)]
    fn test_parse_error(#[case] input: &str, #[case] unclosed: bool) {
        let err = parse(input).unwrap_err();
        assert_eq!(matches!(err, ParseError::ExpectedClosingParen(_)), unclosed);
    }
}
