use std::{fs, path::PathBuf};

use clap::{Parser, Subcommand};
use miette::IntoDiagnostic;
use plisp_lang::{Config, Engine, SchedulerKind};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug, Default)]
#[command(name = "plisp")]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(after_help = "# Examples:\n\n\
    ## To evaluate a file:\n\
    plisp fib.lisp\n\n\
    ## To evaluate an expression:\n\
    plisp -e '(+ 1 2)'\n\n\
    ## To load definitions and evaluate an expression:\n\
    plisp fib.lisp -e '(fib 30)'\n\n\
    ## To start a REPL session:\n\
    plisp repl")]
#[command(
    about = "plisp compiles a small Lisp to register bytecode and runs it on a pool of worker threads.",
    long_about = None
)]
pub struct Cli {
    #[clap(flatten)]
    engine: EngineArgs,

    #[clap(subcommand)]
    commands: Option<Commands>,

    /// Evaluate the given code after FILE
    #[arg(short = 'e', long = "eval", value_name = "CODE")]
    eval: Option<String>,

    /// Source file to evaluate
    file: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, clap::ValueEnum)]
enum SchedulerArg {
    WorkStealing,
    SharedQueue,
}

impl From<SchedulerArg> for SchedulerKind {
    fn from(arg: SchedulerArg) -> Self {
        match arg {
            SchedulerArg::WorkStealing => SchedulerKind::WorkStealing,
            SchedulerArg::SharedQueue => SchedulerKind::SharedQueue,
        }
    }
}

#[derive(Clone, Debug, clap::Args, Default)]
struct EngineArgs {
    /// Number of worker threads
    #[arg(short = 'w', long)]
    workers: Option<usize>,

    /// Number of call inlining rounds run on every function
    #[arg(short = 'i', long)]
    inline_depth: Option<usize>,

    /// Print the optimized bytecode of every compiled function
    #[arg(long, default_value_t = false)]
    show_ir: bool,

    /// Run the bytecode as emitted by the code generator
    #[arg(long, default_value_t = false)]
    no_optimize: bool,

    /// Compile every call as a synchronous call
    #[arg(long, default_value_t = false)]
    no_spawn: bool,

    /// Capacity of the task pool; 0 runs every spawn synchronously
    #[arg(long, value_name = "N")]
    task_pool_size: Option<usize>,

    /// Task scheduling strategy
    #[arg(long, value_enum)]
    scheduler: Option<SchedulerArg>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start a REPL session
    Repl,
}

impl Cli {
    /// Configuration from the `PLISP_*` environment overridden by flags.
    fn config(&self) -> Config {
        let args = &self.engine;
        let mut config = Config::from_env();

        if let Some(workers) = args.workers {
            config = config.with_workers(workers);
        }
        if let Some(inline_depth) = args.inline_depth {
            config = config.with_inline_depth(inline_depth);
        }
        if let Some(size) = args.task_pool_size {
            config = config.with_task_pool_size(size);
        }
        if let Some(scheduler) = args.scheduler {
            config = config.with_scheduler(scheduler.into());
        }
        if args.show_ir {
            config = config.with_show_ir(true);
        }
        if args.no_optimize {
            config = config.with_optimize(false);
        }
        if args.no_spawn {
            config = config.with_spawn(false);
        }

        config
    }

    pub fn run(&self) -> miette::Result<()> {
        let config = self.config();
        init_tracing(config.show_ir);
        tracing::debug!(?config, "Starting plisp");

        let mut engine = Engine::new(config);

        match (&self.commands, &self.file, &self.eval) {
            (Some(Commands::Repl), _, _) | (None, None, None) => plisp_repl::Repl::new(engine).run(),
            (None, file, code) => {
                if let Some(file) = file {
                    let content = fs::read_to_string(file).into_diagnostic()?;
                    execute(&mut engine, &content)?;
                }

                if let Some(code) = code {
                    execute(&mut engine, code)?;
                }

                Ok(())
            }
        }
    }
}

fn init_tracing(show_ir: bool) {
    let default = if show_ir { "warn,plisp::ir=info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // A subscriber may already be installed when `run` is called more than once.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Evaluates the top-level forms of `code` one by one, printing each value.
///
/// Values are printed as soon as they are computed so that output produced
/// before a failing form is kept.
fn execute(engine: &mut Engine, code: &str) -> miette::Result<()> {
    let program = plisp_lang::parse(code).map_err(miette::Report::new)?;

    for node in &program {
        let value = engine
            .eval_node(node)
            .map_err(|cause| miette::Report::new(plisp_lang::Error::from_error(code, cause, Some(node.range))))?;

        println!("{}", value);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::defaults(vec!["plisp"], Config::from_env())]
    #[case::workers(vec!["plisp", "--workers", "3"], Config::from_env().with_workers(3))]
    #[case::inline_depth(vec!["plisp", "-i", "0"], Config::from_env().with_inline_depth(0))]
    #[case::no_optimize(vec!["plisp", "--no-optimize"], Config::from_env().with_optimize(false))]
    #[case::no_spawn(vec!["plisp", "--no-spawn"], Config::from_env().with_spawn(false))]
    #[case::show_ir(vec!["plisp", "--show-ir"], Config::from_env().with_show_ir(true))]
    #[case::pool(vec!["plisp", "--task-pool-size", "0"], Config::from_env().with_task_pool_size(0))]
    #[case::scheduler(
        vec!["plisp", "--scheduler", "shared-queue"],
        Config::from_env().with_scheduler(SchedulerKind::SharedQueue)
    )]
    fn test_config(#[case] args: Vec<&str>, #[case] expected: Config) {
        assert_eq!(Cli::parse_from(args).config(), expected);
    }

    #[test]
    fn test_parse_file_and_eval() {
        let cli = Cli::parse_from(["plisp", "fib.lisp", "-e", "(fib 10)"]);

        assert_eq!(cli.file, Some(PathBuf::from("fib.lisp")));
        assert_eq!(cli.eval.as_deref(), Some("(fib 10)"));
        assert!(cli.commands.is_none());
    }

    #[test]
    fn test_parse_repl_subcommand() {
        let cli = Cli::parse_from(["plisp", "repl"]);
        assert!(matches!(cli.commands, Some(Commands::Repl)));
    }

    #[test]
    fn test_execute_reports_first_error() {
        let mut engine = Engine::new(Config::default().with_workers(1));

        assert!(execute(&mut engine, "(setq n 1) (+ n undefined) (setq n 2)").is_err());
        assert_eq!(engine.eval("n").unwrap(), vec![plisp_lang::Value::Int(1)]);
    }

    #[test]
    fn test_run_eval() {
        let cli = Cli {
            engine: EngineArgs {
                workers: Some(1),
                ..Default::default()
            },
            eval: Some("(+ 1 2)".to_string()),
            ..Cli::default()
        };

        assert!(cli.run().is_ok());
    }
}
