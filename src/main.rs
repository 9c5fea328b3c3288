use std::io;

use anyhow::{bail, Result};
use clap::Parser;
use log::{error, info};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{config::Config as EditorConfig, Editor};
use simplelog::{Config as LogConfig, LevelFilter, SimpleLogger};

mod lang;
mod repl;

use lang::runtime::{EvalResult, Runtime};
use repl::{join_lines, ReplHelper};

const PROMPT: &str = "> ";

#[derive(Parser)]
#[command(version, about)]
struct Opt {
    /// Show debug output
    #[arg(short, long)]
    debug: bool,
    /// File to load line history from and save it to
    #[arg(long, default_value = ".calc_history")]
    history: String,
    /// Import a builtin before the first prompt. May be repeated
    #[arg(short, long, value_name = "NAME")]
    import: Vec<String>,
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
    let mut editor = Editor::with_config(config)?;
    editor.set_helper(Some(ReplHelper::new()));

    Ok(editor)
}

fn save_history(editor: &mut Editor<ReplHelper, DefaultHistory>, path: &str) -> Result<()> {
    match editor.save_history(path) {
        Ok(_) => Ok(()),
        Err(e) => bail!("Failed to save history: {}", e),
    }
}

fn welcome() {
    println!("calc v{}", env!("CARGO_PKG_VERSION"));
    println!("Use !help to print help.");
    println!("Use Ctrl-D or !quit to exit.");
    println!();
}

fn main() -> Result<()> {
    let opts = Opt::parse();
    init_logging(opts.debug)?;

    let mut editor = init_editor()?;
    if editor.load_history(&opts.history).is_err() {
        info!("no history loaded from {}", opts.history);
    }

    let mut stdout = io::stdout();
    let mut rt = Runtime::new(&mut stdout);
    if !opts.import.is_empty() {
        if let EvalResult::Err(e) = rt.import(&opts.import) {
            bail!("{}", e);
        }
    }
    welcome();

    loop {
        match editor.readline(PROMPT) {
            Ok(line) => {
                info!("read: {}", &line);

                match rt.eval(&join_lines(&line)) {
                    EvalResult::Ok => (),
                    EvalResult::Quit => break,
                    EvalResult::Err(e) => {
                        eprintln!("{}", e);
                        continue;
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                eprintln!("Press Ctrl-D or type '!quit' to quit");
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

    save_history(&mut editor, &opts.history)?;

    Ok(())
}
