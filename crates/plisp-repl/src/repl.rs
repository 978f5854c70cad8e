use std::{borrow::Cow, cell::RefCell, fs, path::PathBuf, rc::Rc};

use colored::*;
use itertools::Itertools;
use miette::IntoDiagnostic;
use plisp_lang::{InnerError, ParseError};
use rustyline::{
    At, Cmd, CompletionType, Config, Context, EditMode, Editor, Helper, KeyCode, KeyEvent, Modifiers, Movement, Word,
    completion::{Completer, Pair},
    error::ReadlineError,
    highlight::{CmdKind, Highlighter, MatchingBracketHighlighter},
    hint::Hinter,
    validate::{ValidationContext, ValidationResult, Validator},
};

use crate::command_context::{CommandContext, CommandOutput};

const PROMPT: &str = "plisp> ";

/// Whether `input` stops in the middle of a form.
pub(crate) fn is_incomplete(input: &str) -> bool {
    matches!(
        plisp_lang::parse(input),
        Err(plisp_lang::Error {
            cause: InnerError::Parse(ParseError::ExpectedClosingParen(_) | ParseError::UnexpectedEOFDetected),
            ..
        })
    )
}

pub struct PlispLineHelper {
    command_context: Rc<RefCell<CommandContext>>,
    matching_bracket_highlighter: MatchingBracketHighlighter,
}

impl PlispLineHelper {
    pub fn new(command_context: Rc<RefCell<CommandContext>>) -> Self {
        Self {
            command_context,
            matching_bracket_highlighter: MatchingBracketHighlighter::default(),
        }
    }
}

impl Hinter for PlispLineHelper {
    type Hint = String;
}

impl Highlighter for PlispLineHelper {
    fn highlight_prompt<'b, 's: 'b, 'p: 'b>(&'s self, prompt: &'p str, _default: bool) -> Cow<'b, str> {
        prompt.cyan().to_string().into()
    }

    fn highlight<'l>(&self, line: &'l str, pos: usize) -> Cow<'l, str> {
        self.matching_bracket_highlighter.highlight(line, pos)
    }

    fn highlight_char(&self, line: &str, pos: usize, kind: CmdKind) -> bool {
        self.matching_bracket_highlighter.highlight_char(line, pos, kind)
    }
}

impl Validator for PlispLineHelper {
    fn validate(&self, ctx: &mut ValidationContext<'_>) -> Result<ValidationResult, ReadlineError> {
        let input = ctx.input();
        if input.is_empty() || input.ends_with("\n\n") || input.starts_with(':') {
            return Ok(ValidationResult::Valid(None));
        }

        if is_incomplete(input) {
            Ok(ValidationResult::Incomplete)
        } else {
            Ok(ValidationResult::Valid(None))
        }
    }

    fn validate_while_typing(&self) -> bool {
        false
    }
}

impl Completer for PlispLineHelper {
    type Candidate = Pair;

    fn complete(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Result<(usize, Vec<Pair>), ReadlineError> {
        let (start, names) = self.command_context.borrow().completions(line, pos);

        Ok((
            start,
            names
                .into_iter()
                .map(|name| Pair {
                    display: name.clone(),
                    replacement: name,
                })
                .collect_vec(),
        ))
    }
}

impl Helper for PlispLineHelper {}

pub struct Repl {
    command_context: Rc<RefCell<CommandContext>>,
}

impl Repl {
    pub fn new(engine: plisp_lang::Engine) -> Self {
        Self {
            command_context: Rc::new(RefCell::new(CommandContext::new(engine))),
        }
    }

    pub fn config_dir() -> Option<PathBuf> {
        std::env::var_os("PLISP_CONFIG_DIR")
            .map(PathBuf::from)
            .or_else(|| dirs::config_dir().map(|d| d.join("plisp")))
    }

    pub fn run(&self) -> miette::Result<()> {
        let config = Config::builder()
            .history_ignore_space(true)
            .completion_type(CompletionType::List)
            .edit_mode(EditMode::Emacs)
            .color_mode(rustyline::ColorMode::Enabled)
            .auto_add_history(false)
            .build();
        let mut editor = Editor::with_config(config).into_diagnostic()?;
        let helper = PlispLineHelper::new(Rc::clone(&self.command_context));

        editor.set_helper(Some(helper));
        editor.bind_sequence(
            KeyEvent(KeyCode::Left, Modifiers::CTRL),
            Cmd::Move(Movement::BackwardWord(1, Word::Big)),
        );
        editor.bind_sequence(
            KeyEvent(KeyCode::Right, Modifiers::CTRL),
            Cmd::Move(Movement::ForwardWord(1, At::AfterEnd, Word::Big)),
        );

        let history = Self::config_dir().map(|config_dir| {
            fs::create_dir_all(&config_dir).ok();
            config_dir.join("history.txt")
        });

        if let Some(history) = &history
            && editor.load_history(history).is_err()
        {
            println!("No previous history.");
        }

        println!("Welcome to plisp {}. For help, type :help", plisp_lang::Engine::version());

        loop {
            let readline = editor.readline(PROMPT);

            match readline {
                Ok(line) => match self.command_context.borrow_mut().execute(&line) {
                    Ok(CommandOutput::String(s)) => println!("{}", s.join("\n")),
                    Ok(CommandOutput::Value(values)) => {
                        if !values.is_empty() {
                            println!("{}", values.iter().join("\n").as_str().bright_white());
                        }

                        editor.add_history_entry(&line).into_diagnostic()?;
                    }
                    Ok(CommandOutput::Quit) => break,
                    Ok(CommandOutput::None) => (),
                    Err(e) => {
                        eprintln!("{:?}", e)
                    }
                },
                Err(ReadlineError::Interrupted) => {
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    break;
                }
                Err(err) => {
                    eprintln!("{}: {:?}", "Error".red(), err);
                    break;
                }
            }
        }

        if let Some(history) = &history {
            editor.save_history(history).into_diagnostic()?;
        }

        Ok(())
    }
}
