use std::{fmt, fs};

use itertools::Itertools;
use miette::{IntoDiagnostic, miette};
use strum::IntoEnumIterator;

/// Special forms and literals offered by completion next to user definitions.
const KEYWORDS: [&str; 7] = ["defun", "setq", "if", "print", "mod", "t", "nil"];

#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutput {
    Value(Vec<plisp_lang::Value>),
    String(Vec<String>),
    Quit,
    None,
}

#[derive(Debug, Clone, strum::EnumIter)]
pub enum Command {
    Funcs,
    Help,
    Ir(String),
    LoadFile(String),
    Quit,
    Vars,
    Version,
    Eval(String),
    NotFound(String),
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Funcs => write!(f, ":funcs"),
            Command::Help => write!(f, ":help"),
            Command::Ir(_) => write!(f, ":ir"),
            Command::LoadFile(_) => write!(f, ":load"),
            Command::Quit => write!(f, ":quit"),
            Command::Vars => write!(f, ":vars"),
            Command::Version => write!(f, ":version"),
            Command::Eval(_) => write!(f, ":eval"),
            Command::NotFound(_) => write!(f, ":not_found"),
        }
    }
}

impl Command {
    pub fn help(&self) -> String {
        match self {
            Command::Funcs => format!("{:<12}{}", ":funcs", "List defined functions"),
            Command::Help => format!("{:<12}{}", ":help", "Print command help"),
            Command::Ir(_) => format!("{:<12}{}", ":ir", "Print the optimized bytecode of a function (name)"),
            Command::LoadFile(_) => format!("{:<12}{}", ":load", "Evaluate a plisp source file (path)"),
            Command::Quit => format!("{:<12}{}", ":quit", "Quit evaluation and exit"),
            Command::Vars => format!("{:<12}{}", ":vars", "List global variables"),
            Command::Version => format!("{:<12}{}", ":version", "Print plisp version"),
            Command::Eval(_) => format!("{:<12}{}", ":eval", ""),
            Command::NotFound(_) => format!("{:<12}{}", ":not_found", ""),
        }
    }
}

impl From<String> for Command {
    fn from(s: String) -> Self {
        match s.split_whitespace().collect::<Vec<&str>>().as_slice() {
            [":funcs"] => Command::Funcs,
            [":help"] => Command::Help,
            [":ir", name] => Command::Ir(name.to_lowercase()),
            [":load", file_path] => Command::LoadFile(file_path.to_string()),
            [":quit"] => Command::Quit,
            [":vars"] => Command::Vars,
            [":version"] => Command::Version,
            _ if s.starts_with(':') => Command::NotFound(s),
            _ => Command::Eval(s),
        }
    }
}

pub struct CommandContext {
    pub(crate) engine: plisp_lang::Engine,
}

impl CommandContext {
    pub fn new(engine: plisp_lang::Engine) -> Self {
        Self { engine }
    }

    /// Start of the word under the cursor and the names that complete it.
    pub fn completions(&self, line: &str, pos: usize) -> (usize, Vec<String>) {
        let src = &line[..pos];
        let start = src
            .rfind(|c: char| c.is_whitespace() || c == '(' || c == ')')
            .map(|i| i + 1)
            .unwrap_or(0);
        let word = src[start..].to_lowercase();

        if start == 0 && word.starts_with(':') {
            let commands = Command::iter()
                .filter(|c| !matches!(c, Command::Eval(_) | Command::NotFound(_)))
                .map(|c| c.to_string())
                .filter(|c| c.starts_with(&word))
                .collect();
            return (start, commands);
        }

        let names = self
            .engine
            .functions()
            .map(|func| func.name.to_string())
            .chain(self.engine.variables().into_iter().map(|(name, _)| name.to_string()))
            .chain(KEYWORDS.iter().map(|k| k.to_string()))
            .filter(|name| name.starts_with(&word))
            .unique()
            .sorted()
            .collect();

        (start, names)
    }

    pub fn execute(&mut self, to_run: &str) -> miette::Result<CommandOutput> {
        match to_run.to_string().into() {
            Command::Funcs => Ok(CommandOutput::String(
                self.engine
                    .functions()
                    .map(|func| {
                        format!(
                            "{}: ({}) -> {}, {} words",
                            func.name,
                            func.params.join(" "),
                            func.kind,
                            func.code_words()
                        )
                    })
                    .collect(),
            )),
            Command::Help => Ok(CommandOutput::String(
                Command::iter()
                    .filter(|c| !matches!(c, Command::Eval(_) | Command::NotFound(_)))
                    .map(|c| c.help())
                    .collect(),
            )),
            Command::Ir(name) => self
                .engine
                .disassemble(&name)
                .map(|listing| CommandOutput::String(listing.lines().map(str::to_string).collect()))
                .ok_or_else(|| miette!("Function not found: {}", name)),
            Command::LoadFile(file_path) => {
                let code = fs::read_to_string(&file_path).into_diagnostic()?;
                self.eval(&code)
            }
            Command::Quit => Ok(CommandOutput::Quit),
            Command::Vars => Ok(CommandOutput::String(
                self.engine
                    .variables()
                    .into_iter()
                    .map(|(name, value)| format!("{}: {}", name, value))
                    .collect(),
            )),
            Command::Version => Ok(CommandOutput::String(vec![
                plisp_lang::Engine::version().to_string(),
            ])),
            Command::NotFound(s) => Err(miette!("Command not found: {}", s)),
            Command::Eval(code) => self.eval(&code),
        }
    }

    fn eval(&mut self, code: &str) -> miette::Result<CommandOutput> {
        if code.trim().is_empty() {
            return Ok(CommandOutput::None);
        }

        self.engine
            .eval(code)
            .map(CommandOutput::Value)
            .map_err(miette::Report::new)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use plisp_lang::{Config, Engine, Value};
    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn ctx() -> CommandContext {
        CommandContext::new(Engine::new(Config::default().with_workers(1)))
    }

    #[rstest]
    #[case::funcs(":funcs", ":funcs")]
    #[case::help(":help", ":help")]
    #[case::ir(":ir fib", ":ir")]
    #[case::load(":load a.lisp", ":load")]
    #[case::quit(":quit", ":quit")]
    #[case::vars(":vars", ":vars")]
    #[case::version(":version", ":version")]
    #[case::not_found(":unknown", ":not_found")]
    #[case::missing_argument(":ir", ":not_found")]
    #[case::eval("(+ 1 2)", ":eval")]
    fn test_command_from_string(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(Command::from(input.to_string()).to_string(), expected);
    }

    #[test]
    fn test_command_help() {
        for cmd in Command::iter() {
            assert!(cmd.help().starts_with(&cmd.to_string()));
        }
    }

    #[rstest]
    fn test_execute_eval(mut ctx: CommandContext) {
        assert_eq!(
            ctx.execute("(defun sq (x) (* x x)) (sq 9)").unwrap(),
            CommandOutput::Value(vec![Value::Symbol("sq".into()), Value::Int(81)])
        );
        assert_eq!(ctx.execute("  ").unwrap(), CommandOutput::None);
    }

    #[rstest]
    fn test_execute_eval_error(mut ctx: CommandContext) {
        let err = ctx.execute("(+ 1 undefined)").unwrap_err();

        assert_eq!(
            err.code().map(|c| c.to_string()).as_deref(),
            Some("CompileError::NotDefined")
        );
    }

    #[rstest]
    fn test_execute_funcs_and_vars(mut ctx: CommandContext) {
        ctx.execute("(defun add (a b) (+ a b)) (setq limit 10)").unwrap();

        assert_eq!(
            ctx.execute(":funcs").unwrap(),
            CommandOutput::String(vec![format!(
                "add: (a b) -> int, {} words",
                ctx.engine.functions().next().unwrap().code_words()
            )])
        );
        assert_eq!(
            ctx.execute(":vars").unwrap(),
            CommandOutput::String(vec!["limit: 10".to_string()])
        );
    }

    #[rstest]
    fn test_execute_ir(mut ctx: CommandContext) {
        ctx.execute("(defun one () 1)").unwrap();

        assert_eq!(
            ctx.execute(":ir one").unwrap(),
            CommandOutput::String(vec!["   0: RETC 1".to_string(), "   1: END".to_string()])
        );
        assert!(ctx.execute(":ir two").is_err());
    }

    #[rstest]
    fn test_execute_load_file(mut ctx: CommandContext) {
        let path = std::env::temp_dir().join("plisp_repl_test_execute_load_file.lisp");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(b"(defun twice (x) (* 2 x))\n(twice 21)\n").unwrap();

        let result = ctx.execute(&format!(":load {}", path.display()));
        fs::remove_file(&path).unwrap();

        assert_eq!(
            result.unwrap(),
            CommandOutput::Value(vec![Value::Symbol("twice".into()), Value::Int(42)])
        );
    }

    #[rstest]
    fn test_execute_misc(mut ctx: CommandContext) {
        assert_eq!(ctx.execute(":quit").unwrap(), CommandOutput::Quit);
        assert_eq!(
            ctx.execute(":version").unwrap(),
            CommandOutput::String(vec![Engine::version().to_string()])
        );
        assert!(ctx.execute(":nope").is_err());

        let CommandOutput::String(help) = ctx.execute(":help").unwrap() else {
            panic!("Expected String output");
        };
        assert!(help.iter().any(|line| line.starts_with(":ir")));
    }

    #[rstest]
    #[case::function("(fi", 3, 1, vec!["fib"])]
    #[case::keyword("(se", 3, 1, vec!["setq"])]
    #[case::nested("(+ (f", 5, 4, vec!["fib"])]
    #[case::variable("lim", 3, 0, vec!["limit"])]
    #[case::command(":ve", 3, 0, vec![":version"])]
    fn test_completions(
        mut ctx: CommandContext,
        #[case] line: &str,
        #[case] pos: usize,
        #[case] start: usize,
        #[case] expected: Vec<&str>,
    ) {
        ctx.execute("(defun fib (n) n) (setq limit 3)").unwrap();

        let (actual_start, names) = ctx.completions(line, pos);
        assert_eq!(actual_start, start);
        assert_eq!(names, expected);
    }
}
