pub mod error;
pub mod token;

use error::LexerError;
use nom::Parser;
use nom::{
    IResult,
    branch::alt,
    bytes::complete::{is_not, tag, take_while1},
    character::complete::{char, multispace1},
    combinator::{opt, value},
    multi::many0,
    sequence::{pair, preceded, terminated},
};
use smol_str::SmolStr;
use token::{Token, TokenKind};

use crate::range::{Range, Span};

#[derive(Debug, Clone, Default)]
pub struct Lexer;

impl Lexer {
    pub fn new() -> Self {
        Self
    }

    pub fn tokenize(&self, input: &str) -> Result<Vec<Token>, LexerError> {
        match lexemes(Span::new(input)) {
            Ok((rest, lexemes)) => {
                if !rest.fragment().is_empty() {
                    return Err(LexerError::UnexpectedToken(Token {
                        range: rest.into(),
                        kind: TokenKind::Eof,
                    }));
                }

                let mut tokens = lexemes.into_iter().map(classify).collect::<Result<Vec<_>, _>>()?;
                let eof: Range = rest.into();
                tokens.push(Token {
                    range: eof,
                    kind: TokenKind::Eof,
                });

                Ok(tokens)
            }
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(LexerError::UnexpectedToken(Token {
                range: e.input.into(),
                kind: TokenKind::Eof,
            })),
            Err(nom::Err::Incomplete(_)) => unreachable!(),
        }
    }
}

fn is_atom_char(c: char) -> bool {
    !c.is_whitespace() && c != '(' && c != ')' && c != ';'
}

fn comment(input: Span) -> IResult<Span, ()> {
    value((), pair(char(';'), opt(is_not("\r\n")))).parse(input)
}

fn trivia(input: Span) -> IResult<Span, ()> {
    value((), many0(alt((value((), multispace1), comment)))).parse(input)
}

fn lexeme(input: Span) -> IResult<Span, Span> {
    alt((tag("("), tag(")"), take_while1(is_atom_char))).parse(input)
}

fn lexemes(input: Span) -> IResult<Span, Vec<Span>> {
    preceded(trivia, many0(terminated(lexeme, trivia))).parse(input)
}

fn looks_numeric(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => true,
        Some('+') | Some('-') => chars.next().is_some_and(|c| c.is_ascii_digit()),
        _ => false,
    }
}

fn classify(span: Span) -> Result<Token, LexerError> {
    let fragment = *span.fragment();
    let range: Range = span.into();

    let kind = match fragment {
        "(" => TokenKind::LParen,
        ")" => TokenKind::RParen,
        s if looks_numeric(s) => {
            let digits = s.trim_start_matches(['+', '-']);

            if digits.chars().all(|c| c.is_ascii_digit()) {
                match s.parse::<i64>() {
                    Ok(i) => TokenKind::IntLiteral(i),
                    Err(_) => {
                        return Err(LexerError::InvalidNumber(Token {
                            range,
                            kind: TokenKind::Symbol(SmolStr::new(s)),
                        }));
                    }
                }
            } else if digits.contains('.')
                && digits.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
            {
                s.parse::<f64>()
                    .map(TokenKind::FloatLiteral)
                    .unwrap_or_else(|_| TokenKind::Symbol(SmolStr::new(s.to_lowercase())))
            } else {
                TokenKind::Symbol(SmolStr::new(s.to_lowercase()))
            }
        }
        s => TokenKind::Symbol(SmolStr::new(s.to_lowercase())),
    };

    Ok(Token { range, kind })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::range::Position;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new()
            .tokenize(input)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[rstest]
    #[case::empty("", vec![TokenKind::Eof])]
    #[case::int("42", vec![TokenKind::IntLiteral(42), TokenKind::Eof])]
    #[case::signed_int("-7 +3", vec![TokenKind::IntLiteral(-7), TokenKind::IntLiteral(3), TokenKind::Eof])]
    #[case::float("1.5", vec![TokenKind::FloatLiteral(1.5), TokenKind::Eof])]
    #[case::operator("+", vec![TokenKind::Symbol("+".into()), TokenKind::Eof])]
    #[case::lisp_style_symbol("1+", vec![TokenKind::Symbol("1+".into()), TokenKind::Eof])]
    #[case::lowercase("FooBar", vec![TokenKind::Symbol("foobar".into()), TokenKind::Eof])]
    #[case::list(
        "(+ 1 x)",
        vec![
            TokenKind::LParen,
            TokenKind::Symbol("+".into()),
            TokenKind::IntLiteral(1),
            TokenKind::Symbol("x".into()),
            TokenKind::RParen,
            TokenKind::Eof,
        ]
    )]
    #[case::nested_without_spaces(
        "((a)b)",
        vec![
            TokenKind::LParen,
            TokenKind::LParen,
            TokenKind::Symbol("a".into()),
            TokenKind::RParen,
            TokenKind::Symbol("b".into()),
            TokenKind::RParen,
            TokenKind::Eof,
        ]
    )]
    #[case::comment(
        "; leading comment\n  (f) ; trailing",
        vec![TokenKind::LParen, TokenKind::Symbol("f".into()), TokenKind::RParen, TokenKind::Eof]
    )]
    fn test_tokenize(#[case] input: &str, #[case] expected: Vec<TokenKind>) {
        assert_eq!(kinds(input), expected);
    }

    #[test]
    fn test_tokenize_range() {
        let tokens = Lexer::new().tokenize("(foo\n  12)").unwrap();

        assert_eq!(
            tokens[1].range,
            Range::new(Position::new(1, 2), Position::new(1, 5))
        );
        assert_eq!(
            tokens[2].range,
            Range::new(Position::new(2, 3), Position::new(2, 5))
        );
    }

    #[test]
    fn test_tokenize_overflow() {
        assert!(matches!(
            Lexer::new().tokenize("99999999999999999999999"),
            Err(LexerError::InvalidNumber(_))
        ));
    }
}
