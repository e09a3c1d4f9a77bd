//! The `calico` command line: run scripts, dump token streams, or start
//! an interactive session.

use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::IntoDiagnostic;
use serde::Serialize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use calico::{lexer, Interpreter, TokenKind};

#[derive(Parser)]
#[command(name = "calico", version, about = "The Calico scripting language")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a script
    Run {
        /// Path to the script
        path: PathBuf,
    },
    /// Lex a script and print its token stream as JSON
    Tokens {
        /// Path to the script
        path: PathBuf,
    },
    /// Start an interactive session
    Repl,
}

/// Flat token view for the JSON dump
#[derive(Serialize)]
struct TokenDump {
    kind: TokenKind,
    text: String,
    line: u32,
    column: u32,
    start: usize,
    end: usize,
}

fn main() -> miette::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run { path } => {
            let source = fs::read_to_string(&path).into_diagnostic()?;
            let file = path.display().to_string();
            let code = Interpreter::new().interpret_source(&file, &source);
            std::process::exit(code);
        }
        Command::Tokens { path } => {
            let source = fs::read_to_string(&path).into_diagnostic()?;
            let file = path.display().to_string();
            let dump: Vec<TokenDump> = lexer::lex(&file, &source)
                .into_iter()
                .map(|t| TokenDump {
                    kind: t.kind,
                    text: t.text,
                    line: t.line,
                    column: t.column,
                    start: t.span.start,
                    end: t.span.end,
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&dump).into_diagnostic()?);
            Ok(())
        }
        Command::Repl => repl(),
    }
}

fn repl() -> miette::Result<()> {
    let mut editor = rustyline::DefaultEditor::new().into_diagnostic()?;
    let mut interp = Interpreter::new();
    interp.preserve_globals(true);
    println!("calico {} (interactive); Ctrl-D to quit", calico::VERSION);
    loop {
        match editor.readline(">> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(&line);
                interp.interpret_source("<repl>", &line);
            }
            Err(rustyline::error::ReadlineError::Interrupted) => continue,
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => return Err(miette::miette!("readline failed: {}", e)),
        }
    }
    Ok(())
}
