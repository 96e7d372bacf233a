/// The RAW console module.
///
/// The REPL runs the terminal in raw mode, so plain `println!` output
/// would stair-step. Everything user-facing goes through these helpers,
/// which reset the column after each line.
use crossterm::{cursor, execute, style, ExecutableCommand};
use std::io::{self, Write};

const NAME: &str = env!("CARGO_PKG_NAME");

pub fn print_prompt() -> io::Result<()> {
    execute!(io::stdout(), cursor::MoveToColumn(0))?;
    io::stdout()
        .execute(style::SetAttribute(style::Attribute::Bold))?
        .execute(style::Print(format!("{}> ", NAME)))?
        .execute(style::SetAttribute(style::Attribute::Reset))?;
    io::stdout().flush()
}

pub fn print_continue_prompt() -> io::Result<()> {
    execute!(io::stdout(), cursor::MoveToColumn(0))?;
    io::stdout()
        .execute(style::SetAttribute(style::Attribute::Bold))?
        .execute(style::Print("    -> ".to_string()))?
        .execute(style::SetAttribute(style::Attribute::Reset))?;
    io::stdout().flush()
}

pub fn echo(s: String) {
    let _ = io::stdout().execute(style::Print(s));
    let _ = io::stdout().flush();
    let _ = execute!(io::stdout(), cursor::MoveToNextLine(0));
}

/// Prints a multi-line string one line at a time so the column reset
/// lands after every line.
pub fn echo_lines(s: String) {
    for l in s.lines() {
        echo(format!("{}\n", l));
    }
}

pub fn error(s: String) {
    let _ = io::stderr().write_all(s.as_bytes());
    let _ = io::stderr().flush();
    let _ = execute!(io::stdout(), cursor::MoveToNextLine(0));
}

/// A stdout sink for query results that keeps raw-mode output aligned
/// by turning every bare `\n` into `\r\n`.
pub struct ConsoleWriter;

impl Write for ConsoleWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut out = io::stdout();
        for chunk in buf.split_inclusive(|&b| b == b'\n') {
            match chunk.strip_suffix(b"\n") {
                Some(line) => {
                    out.write_all(line)?;
                    out.write_all(b"\r\n")?;
                }
                None => out.write_all(chunk)?,
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()
    }
}

#[macro_export]
macro_rules! echo {
    ($($arg:tt)*) => {
        $crate::console::echo(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! echo_lines {
    ($($arg:tt)*) => {
        $crate::console::echo_lines(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::console::error(format!($($arg)*))
    };
}
