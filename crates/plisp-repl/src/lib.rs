//! Interactive Read-Eval-Print Loop for [plisp](https://crates.io/crates/plisp-lang).
//!
//! The REPL supports:
//! - Multi-line forms, continued until the parentheses balance
//! - Completion of defined functions, variables and commands
//! - History persisted under the user's config directory
//!
//! ## Example
//!
//! ```rust,no_run
//! use plisp_repl::Repl;
//!
//! let repl = Repl::new(plisp_lang::Engine::default());
//! repl.run().unwrap();
//! ```
mod command_context;
mod repl;

pub use command_context::{Command, CommandContext, CommandOutput};
pub use repl::Repl;
