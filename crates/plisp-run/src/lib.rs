//! The `plisp` command: evaluates files or expressions, or starts the REPL.
mod cli;

pub use cli::Cli;
