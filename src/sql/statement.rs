/// An SQL command with its parsed statement and original SQL string.
#[derive(Debug)]
pub struct SqlCommand {
    pub statement: Statement,
    pub sql: String,
}

/// Statement types supported by the parser.
#[derive(Debug, PartialEq)]
pub enum Statement {
    Select(SelectStatement),
    Load(LoadStatement),
}

/// The projected attribute of a `SELECT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectAttr {
    /// `SELECT key`
    Key,
    /// `SELECT value`
    Value,
    /// `SELECT *`
    All,
    /// `SELECT COUNT(*)`
    Count,
}

/// Which tuple attribute a predicate tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondAttr {
    Key,
    Value,
}

/// A comparison operator in a WHERE condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// One `<attr> <comp> <literal>` predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct SelCond {
    pub attr: CondAttr,
    pub comp: Comparator,
    pub value: String,
}

/// A `SELECT <attr> FROM <table> [WHERE <cond> {AND <cond>}]` statement.
#[derive(Debug, PartialEq)]
pub struct SelectStatement {
    pub attr: SelectAttr,
    pub table: String,
    pub conds: Vec<SelCond>,
}

/// A `LOAD <table> FROM '<file>' [WITH INDEX]` statement.
#[derive(Debug, PartialEq)]
pub struct LoadStatement {
    pub table: String,
    pub file: String,
    pub with_index: bool,
}
