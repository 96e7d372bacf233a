/// The REPL (Read-Eval-Print-Loop) module.
use crate::console::{print_continue_prompt, print_prompt, ConsoleWriter};
use crate::engine::SqlEngine;
use crate::errors;
use crate::history;
use crate::sql;
use crate::{echo, echo_lines, error};
use crossterm::{
    cursor,
    event::{self, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute, terminal,
};
use std::io::{self, Write};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const HISTORY_FILE: &str = ".rustbase_history";

/// Column right after the `rustbase> ` prompt, for line redraws.
const PROMPT_WIDTH: u16 = 10;

const BANNER: &str = r#"
Commands end with ;. Type 'help;' or '\h' for help.
LOAD fills a table from a file, SELECT queries it.
"#;

const HELP: &str = r#"List of all rustbase commands:
Note that all SQL commands must end with ';'

?         (\?) Synonym for 'help'.
help      (\h) Show this help.
version   (\v) Show the rustbase version.
quit      (\q) Quit rustbase.

SQL statements:
LOAD <table> FROM '<file>' [WITH INDEX]
SELECT key|value|*|COUNT(*) FROM <table> [WHERE <cond> {AND <cond>}]
  where <cond> compares key or value using =, <>, <, <=, > or >=
"#;

/// Runs the REPL until quit, bracketing the terminal's raw mode.
pub fn start(engine: SqlEngine) -> Result<(), errors::Error> {
    terminal::enable_raw_mode()?;
    let result = repl_loop(&engine);
    terminal::disable_raw_mode()?;
    result
}

fn repl_loop(engine: &SqlEngine) -> Result<(), errors::Error> {
    echo!("Welcome to the rustbase {} REPL.\n", VERSION);
    echo_lines!("{}\n", BANNER);

    let history_path = history::home_file(HISTORY_FILE);
    let mut history = history::load_history(&history_path);
    let mut history_index = history.len();

    let mut input = String::new();
    let mut continue_prompt = false;

    loop {
        if continue_prompt {
            if !input.is_empty() {
                input.push(' ');
            }
            print_continue_prompt()?;
        } else {
            input.clear();
            print_prompt()?;
        }
        continue_prompt = false;

        if !read_input(&mut input, &mut history, &mut history_index)? {
            echo!("\nBye\n");
            break;
        }

        match input.trim() {
            "" => {}
            "exit" | "exit;" | "quit" | "quit;" | "\\q" => {
                echo!("\nBye\n");
                break;
            }
            "version" | "version;" | "\\v" => {
                echo!("\nrustbase version: {}\n", VERSION);
            }
            "help" | "help;" | "\\h" | "\\?" | "?" => {
                echo_lines!("\n{}\n", HELP);
            }
            line => {
                if line.starts_with('\\') {
                    echo!("\nUnrecognized command: {}\n", line);
                    echo_lines!("{}", HELP);
                } else if line.ends_with(';') {
                    if let Err(e) = history::append_history(line, &history_path) {
                        tracing::warn!("Failed to append history: {}", e);
                    }
                    echo!("\n");
                    match sql::parse(line) {
                        Ok(cmd) => {
                            let mut out = ConsoleWriter;
                            if let Err(e) = engine.execute(&cmd, &mut out) {
                                error!("Error: {}\n", e);
                            }
                        }
                        Err(e) => {
                            error!("{}\n", e);
                        }
                    }
                } else {
                    continue_prompt = true;
                }
            }
        }
    }
    Ok(())
}

/// Reads one line of raw-mode input into `input`. Returns `false` when
/// the user hit Ctrl-C or Ctrl-D.
fn read_input(
    input: &mut String,
    history: &mut Vec<String>,
    history_index: &mut usize,
) -> Result<bool, errors::Error> {
    loop {
        let event::Event::Key(KeyEvent {
            code,
            modifiers,
            kind,
            ..
        }) = event::read()?
        else {
            continue;
        };
        if kind == KeyEventKind::Release {
            continue;
        }

        match code {
            KeyCode::Enter => {
                if !input.trim().is_empty() {
                    history.push(input.clone());
                    *history_index = history.len();
                }
                return Ok(true);
            }
            KeyCode::Up => {
                if *history_index > 0 {
                    *history_index -= 1;
                    input.clear();
                    input.push_str(&history[*history_index]);
                    redraw_line(input)?;
                }
            }
            KeyCode::Down => {
                input.clear();
                if *history_index + 1 < history.len() {
                    *history_index += 1;
                    input.push_str(&history[*history_index]);
                } else {
                    *history_index = history.len();
                }
                redraw_line(input)?;
            }
            KeyCode::Backspace => {
                if !input.is_empty() {
                    input.pop();
                    redraw_line(input)?;
                }
            }
            KeyCode::Char('c') | KeyCode::Char('d')
                if modifiers.contains(KeyModifiers::CONTROL) =>
            {
                return Ok(false);
            }
            KeyCode::Char(c) => {
                input.push(c);
                write!(io::stdout(), "{}", c)?;
                io::stdout().flush()?;
            }
            _ => {}
        }
    }
}

fn redraw_line(input: &str) -> io::Result<()> {
    execute!(
        io::stdout(),
        cursor::MoveToColumn(PROMPT_WIDTH),
        terminal::Clear(terminal::ClearType::UntilNewLine)
    )?;
    write!(io::stdout(), "{}", input)?;
    io::stdout().flush()
}
