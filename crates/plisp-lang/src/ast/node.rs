use std::fmt::{self, Display, Formatter};

use itertools::Itertools;
use smol_str::SmolStr;

use crate::range::Range;

/// A cons-shaped expression tree.
///
/// A list's first element is the operator position; the remaining elements are
/// its arguments in source order.
#[derive(PartialEq, Debug, Clone)]
pub struct Node {
    pub range: Range,
    pub expr: Expr,
}

#[derive(PartialEq, Debug, Clone)]
pub enum Expr {
    Int(i64),
    Float(f64),
    Symbol(SmolStr),
    List(Vec<Node>),
}

impl Node {
    pub fn new(range: Range, expr: Expr) -> Self {
        Self { range, expr }
    }

    pub fn symbol(&self) -> Option<&SmolStr> {
        match &self.expr {
            Expr::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn list(&self) -> Option<&[Node]> {
        match &self.expr {
            Expr::List(nodes) => Some(nodes),
            _ => None,
        }
    }

    /// Splits a call form into its head symbol and argument list.
    pub fn call(&self) -> Option<(&SmolStr, &[Node])> {
        self.list()
            .and_then(|nodes| nodes.split_first())
            .and_then(|(head, args)| head.symbol().map(|name| (name, args)))
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Int(i) => write!(f, "{}", i),
            Expr::Float(n) => write!(f, "{:?}", n),
            Expr::Symbol(s) => write!(f, "{}", s),
            Expr::List(nodes) => write!(f, "({})", nodes.iter().join(" ")),
        }
    }
}
