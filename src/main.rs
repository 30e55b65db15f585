use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use clap::Parser as ClapParser;
use log::error;
use rustyline::config::Config as EditorConfig;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use simplelog::{Config as LogConfig, LevelFilter, SimpleLogger};

mod lang;
mod repl;

use lang::ast::Origin;
use lang::error::{locate, Diagnostic};
use lang::lex::lex;
use lang::parse::Parser;
use lang::runtime::Runtime;
use repl::{fixup_input, ReplHelper};

const HISTORY_FILE: &str = ".oca_history";
const PROMPT: &str = "(oca) ";

/// Interpreter for the Oca scripting language
#[derive(ClapParser)]
#[command(version, about)]
struct Opt {
    /// Program to run. Starts a REPL if omitted
    file: Option<PathBuf>,
    /// Show debug output
    #[arg(short, long)]
    debug: bool,
    /// Print the token stream of FILE instead of running it
    #[arg(long, requires = "file")]
    tokens: bool,
    /// Print the syntax tree of FILE instead of running it
    #[arg(long, requires = "file")]
    ast: bool,
    /// Print FILE re-printed from its syntax tree instead of running it
    #[arg(long, requires = "file")]
    fmt: bool,
}

/// What to show of a file that is not run
enum Dump {
    Tokens,
    Tree,
    Source,
}

fn init_logging(debug: bool) -> Result<()> {
    let filter = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Error
    };

    match SimpleLogger::init(filter, LogConfig::default()) {
        Ok(_) => Ok(()),
        Err(e) => bail!("Failed to init logger: {}", e),
    }
}

fn init_editor() -> Result<Editor<ReplHelper, DefaultHistory>> {
    let config = EditorConfig::builder().auto_add_history(true).build();
    let mut editor = Editor::with_config(config).context("Failed to create line editor")?;
    editor.set_helper(Some(ReplHelper::new()));

    Ok(editor)
}

fn save_history(editor: &mut Editor<ReplHelper, DefaultHistory>) -> Result<()> {
    match editor.save_history(HISTORY_FILE) {
        Ok(_) => Ok(()),
        Err(e) => bail!("Failed to save history: {}", e),
    }
}

fn welcome() {
    println!("oca v{}", env!("CARGO_PKG_VERSION"));
    println!("End a line with '\\' to continue on the next one, Ctrl-D to quit");
    println!();
}

/// Print `err`, rendering it as a diagnostic when it is one
fn report(err: &anyhow::Error) {
    match err.downcast_ref::<Diagnostic>() {
        Some(diag) => eprintln!("{}", diag),
        None => eprintln!("Error: {:#}", err),
    }
}

fn dump(path: &Path, what: Dump) -> Result<()> {
    let source =
        fs::read_to_string(path).with_context(|| format!("Failed to read '{}'", path.display()))?;
    let name = path.display().to_string();

    let toks = lex(&source).map_err(|e| locate(e, &name, &source))?;
    if let Dump::Tokens = what {
        for tok in &toks {
            println!("{}", tok);
        }

        return Ok(());
    }

    let origin = Origin {
        path: name.clone(),
        source: source.clone(),
    };
    let program = Parser::with_origin(toks, origin)
        .parse()
        .map_err(|e| locate(e, &name, &source))?;
    match what {
        Dump::Source => print!("{}", program.to_source()),
        _ => print!("{}", program),
    }

    Ok(())
}

fn run_file(path: &Path) -> Result<()> {
    let mut stdout = io::stdout();
    let result = Runtime::new(&mut stdout, false).run_file(path);
    io::stdout().flush()?;

    result.map(|_| ())
}

fn run_repl() -> Result<()> {
    let mut editor = init_editor()?;
    let _ = editor.load_history(HISTORY_FILE);
    welcome();

    let mut stdout = io::stdout();
    let mut rt = Runtime::new(&mut stdout, true);

    loop {
        match editor.readline(PROMPT) {
            Ok(line) => {
                let input = fixup_input(&line);
                if input.trim().is_empty() {
                    continue;
                }

                if let Err(e) = rt.eval(&input) {
                    report(&e);
                }
            }
            Err(ReadlineError::Interrupted) => {
                eprintln!("Press Ctrl-D to quit");
            }
            Err(ReadlineError::Eof) => {
                println!("quit");
                break;
            }
            Err(e) => {
                error!("Unexpected error: {}", e);
                println!("quit");
                break;
            }
        }
    }

    save_history(&mut editor)
}

fn main() -> Result<()> {
    let opts = Opt::parse();
    init_logging(opts.debug)?;

    let path = match opts.file {
        Some(p) => p,
        None => return run_repl(),
    };

    let result = if opts.tokens {
        dump(&path, Dump::Tokens)
    } else if opts.ast {
        dump(&path, Dump::Tree)
    } else if opts.fmt {
        dump(&path, Dump::Source)
    } else {
        run_file(&path)
    };

    if let Err(e) = result {
        report(&e);
        process::exit(1);
    }

    Ok(())
}
