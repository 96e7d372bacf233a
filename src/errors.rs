use std::fmt;
use std::io;

/// All failure kinds the engine can report.
///
/// `NoSuchRecord` doubles as a control signal: during index searches it
/// means "no exact match / end of iteration" and callers are expected to
/// handle it rather than surface it.
#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    FileRead(String),
    FileWrite(String),
    NodeFull,
    NoSuchRecord,
    InvalidFileFormat(String),
    Syntax(String),
    Storage(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error. {}", e),
            Error::FileRead(msg) => write!(f, "File read failed. {}", msg),
            Error::FileWrite(msg) => write!(f, "File write failed. {}", msg),
            Error::NodeFull => write!(f, "Node is full."),
            Error::NoSuchRecord => write!(f, "No such record."),
            Error::InvalidFileFormat(msg) => write!(f, "Invalid file format. {}", msg),
            Error::Syntax(msg) => write!(f, "SQL Syntax Error. {}", msg),
            Error::Storage(msg) => write!(f, "Storage Error. {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

/// Build a message-carrying `Error` variant from a format string.
#[macro_export]
macro_rules! err {
    ($variant:ident, $($arg:tt)*) => {
        $crate::errors::Error::$variant(format!($($arg)*))
    };
}
