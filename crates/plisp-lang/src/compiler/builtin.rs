use crate::bytecode::Cond;

/// Operators and special forms recognized in operator position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString)]
pub enum Builtin {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "mod")]
    Mod,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Ge,
    #[strum(serialize = "=", serialize = "==", serialize = "eq", serialize = "equal")]
    Eq,
    #[strum(serialize = "!=", serialize = "/=")]
    Ne,
    #[strum(serialize = "if")]
    If,
    #[strum(serialize = "defun")]
    Defun,
    #[strum(serialize = "setq")]
    Setq,
    #[strum(serialize = "print")]
    Print,
}

impl Builtin {
    /// Comparator tested by the operator, for the comparison builtins.
    pub fn cond(self) -> Option<Cond> {
        match self {
            Builtin::Lt => Some(Cond::Lt),
            Builtin::Le => Some(Cond::Le),
            Builtin::Gt => Some(Cond::Gt),
            Builtin::Ge => Some(Cond::Ge),
            Builtin::Eq => Some(Cond::Eq),
            Builtin::Ne => Some(Cond::Ne),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::plus("+", Some(Builtin::Add))]
    #[case::equal_sign("=", Some(Builtin::Eq))]
    #[case::double_equal("==", Some(Builtin::Eq))]
    #[case::eq("eq", Some(Builtin::Eq))]
    #[case::equal("equal", Some(Builtin::Eq))]
    #[case::not_equal("/=", Some(Builtin::Ne))]
    #[case::defun("defun", Some(Builtin::Defun))]
    #[case::user_function("fib", None)]
    fn test_from_str(#[case] name: &str, #[case] expected: Option<Builtin>) {
        assert_eq!(Builtin::from_str(name).ok(), expected);
    }
}
