//! Purpose: `meegbind` CLI entry point.
//! Role: Binary crate root; parses args, initializes tracing, delegates to
//! `command_dispatch`, and emits errors as JSON on stderr.
//! Invariants: Process exit code is derived from `core::error::to_exit_code`.
//! Invariants: stdout carries command output only; diagnostics go to stderr.
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::aot::Shell;
use serde_json::{Map, Value as Json, json};

use meegbind::core::error::{Error, to_exit_code};

mod command_dispatch;

#[derive(Parser)]
#[command(
    name = "meegbind",
    version,
    about = "Drive the EEG/MEG forward-modeling binding command surface"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a JSONL command script (stdin when no file is given).
    Run {
        script: Option<PathBuf>,
    },
    /// List the command table.
    Commands {
        /// Emit the table as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions.
    Completion { shell: Shell },
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match command_dispatch::dispatch_command(cli) {
        Ok(code) => code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn emit_error(err: &Error) {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    if let Some(message) = err.message() {
        inner.insert("message".to_string(), json!(message));
    }
    if let Some(command) = err.command() {
        inner.insert("command".to_string(), json!(command));
    }
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    let mut outer = Map::new();
    outer.insert("error".to_string(), Json::Object(inner));
    eprintln!("{}", Json::Object(outer));
}
