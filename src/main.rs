#[macro_use]
mod errors;
mod console;
mod engine;
mod history;
mod repl;
mod sql;
mod storage;

use clap::Parser;
use std::fs::OpenOptions;
use std::io;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(
    name = "rustbase",
    version = VERSION,
    about = "Tiny indexed table database."
)]
struct Cli {
    /// Directory holding the <table>.tbl and <table>.idx files.
    #[arg(long, env = "RUSTBASE_DATA_DIR", default_value = ".")]
    data_dir: String,
    /// Diagnostic log file; logging goes here so the terminal stays clean.
    #[arg(long, env = "RUSTBASE_LOG_FILE", default_value = "rustbase.log")]
    log_file: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let file = match OpenOptions::new()
        .append(true)
        .create(true)
        .open(&cli.log_file)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file '{}': {}", cli.log_file, e);
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_writer(file)
        .with_ansi(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let engine = engine::SqlEngine::new(&cli.data_dir);
    match repl::start(engine) {
        Ok(()) => ExitCode::SUCCESS,
        Err(errors::Error::Io(e)) if e.kind() == io::ErrorKind::Interrupted => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\nError: {}", e);
            ExitCode::FAILURE
        }
    }
}
