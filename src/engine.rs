//! The SQL engine: SELECT planning/execution and LOAD.
//!
//! A table lives in two files under the engine's data directory:
//! `<table>.tbl` (the record heap) and optionally `<table>.idx` (the
//! B+Tree over the primary key). The planner folds the key predicates
//! of a SELECT into a single `(min, max, eql)` window and picks between
//! a sequential scan of the heap and an index scan; everything the
//! window cannot express is evaluated as a residual filter per tuple.

use crate::errors::Error;
use crate::sql::statement::{
    CondAttr, Comparator, LoadStatement, SelCond, SelectAttr, SelectStatement, SqlCommand,
    Statement,
};
use crate::storage::{BTreeIndex, Lookup, OpenMode, RecordFile, RecordId};
use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The key window a SELECT's predicates fold into.
struct KeyRange {
    min: i32,
    max: i32,
    eql: Option<i32>,
}

pub struct SqlEngine {
    dir: PathBuf,
}

impl SqlEngine {
    /// Creates an engine whose table files live under `dir`.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        SqlEngine {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{}.tbl", table))
    }

    fn index_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{}.idx", table))
    }

    /// Executes a parsed command, writing result rows to `out`.
    pub fn execute(&self, cmd: &SqlCommand, out: &mut dyn Write) -> Result<(), Error> {
        debug!(sql = %cmd.sql, "Executing");
        match &cmd.statement {
            Statement::Select(stmt) => self.select(stmt, out),
            Statement::Load(stmt) => self.load(stmt),
        }
    }

    /// Runs a SELECT. Row output goes to `out`; for `COUNT(*)` only the
    /// final count is printed.
    pub fn select(&self, stmt: &SelectStatement, out: &mut dyn Write) -> Result<(), Error> {
        let range = fold_key_conds(&stmt.conds);
        let need_read = matches!(stmt.attr, SelectAttr::Value | SelectAttr::All)
            || stmt.conds.iter().any(|c| c.attr == CondAttr::Value);
        let has_range = range.min != 0 || range.max != i32::MAX || range.eql.is_some();

        // An index scan pays off when the key window is bounded, and
        // also answers a whole-table COUNT(*) without touching the heap.
        let want_index = has_range || !need_read;

        let mut count: u64 = 0;
        if want_index {
            match BTreeIndex::open(self.index_path(&stmt.table), OpenMode::Read) {
                Ok(mut index) => {
                    debug!(table = %stmt.table, min = range.min, max = range.max, eql = ?range.eql, "Index scan");
                    self.index_select(stmt, &range, need_read, &mut index, &mut count, out)?
                }
                Err(_) => {
                    // No readable index; scan the heap instead.
                    debug!(table = %stmt.table, "No index, sequential scan");
                    self.seq_select(stmt, &mut count, out)?
                }
            }
        } else {
            self.seq_select(stmt, &mut count, out)?;
        }

        if stmt.attr == SelectAttr::Count {
            writeln!(out, "{}", count)?;
        }
        Ok(())
    }

    /// Scans the heap from `(0, 0)` to `end_rid`, evaluating every
    /// predicate against every tuple.
    fn seq_select(
        &self,
        stmt: &SelectStatement,
        count: &mut u64,
        out: &mut dyn Write,
    ) -> Result<(), Error> {
        let mut rf = RecordFile::open(self.table_path(&stmt.table), OpenMode::Read)
            .map_err(|_| err!(Storage, "Table {} does not exist", stmt.table))?;

        let mut rid = RecordId::default();
        while rid < rf.end_rid() {
            let (key, value) = rf.read(rid)?;
            if eval_conds(&stmt.conds, key, &value) {
                *count += 1;
                print_tuple(stmt.attr, key, &value, out)?;
            }
            rid = rid.next();
        }
        Ok(())
    }

    fn index_select(
        &self,
        stmt: &SelectStatement,
        range: &KeyRange,
        need_read: bool,
        index: &mut BTreeIndex,
        count: &mut u64,
        out: &mut dyn Write,
    ) -> Result<(), Error> {
        let mut rf = if need_read {
            Some(
                RecordFile::open(self.table_path(&stmt.table), OpenMode::Read)
                    .map_err(|_| err!(Storage, "Table {} does not exist", stmt.table))?,
            )
        } else {
            None
        };

        if let Some(eql) = range.eql {
            // Equality plan: a single leaf probe.
            if eql < range.min || eql > range.max {
                return Ok(());
            }
            let mut cursor = match index.locate(eql) {
                Ok(Lookup::Exact(cursor)) => cursor,
                Ok(Lookup::Nearest(_)) | Err(Error::NoSuchRecord) => return Ok(()),
                Err(e) => return Err(e),
            };
            let (key, rid) = match index.read_forward(&mut cursor)? {
                Some(pair) => pair,
                None => return Ok(()),
            };

            if let Some(rf) = rf.as_mut() {
                let (_, value) = rf.read(rid)?;
                if eval_value_conds(&stmt.conds, &value) {
                    *count += 1;
                    print_tuple(stmt.attr, key, &value, out)?;
                }
            } else {
                *count += 1;
            }
            return Ok(());
        }

        // Range plan: walk the leaf chain from min until past max.
        if range.min > range.max {
            return Ok(());
        }
        let mut cursor = match index.locate(range.min) {
            Ok(lookup) => lookup.cursor(),
            Err(Error::NoSuchRecord) => return Ok(()),
            Err(e) => return Err(e),
        };

        loop {
            let (key, rid) = match index.read_forward(&mut cursor)? {
                Some(pair) => pair,
                None => {
                    if index.advance_leaf(&mut cursor)? {
                        continue;
                    }
                    break;
                }
            };
            if key > range.max {
                break;
            }

            if let Some(rf) = rf.as_mut() {
                let (_, value) = rf.read(rid)?;
                if eval_conds(&stmt.conds, key, &value) {
                    *count += 1;
                    print_tuple(stmt.attr, key, &value, out)?;
                }
            } else if eval_conds(&stmt.conds, key, "") {
                *count += 1;
                print_tuple(stmt.attr, key, "", out)?;
            }
        }
        Ok(())
    }

    /// Runs a LOAD: appends every line of the source file to the table,
    /// optionally inserting each tuple into the index as it goes.
    pub fn load(&self, stmt: &LoadStatement) -> Result<(), Error> {
        let mut rf = RecordFile::open(self.table_path(&stmt.table), OpenMode::Write)?;
        let mut index = if stmt.with_index {
            Some(BTreeIndex::open(
                self.index_path(&stmt.table),
                OpenMode::Write,
            )?)
        } else {
            None
        };

        let file = File::open(&stmt.file)
            .map_err(|e| err!(FileRead, "Cannot open '{}': {}", stmt.file, e))?;
        let mut loaded = 0u64;
        for line in BufReader::new(file).lines() {
            let line = line?;
            let (key, value) = parse_load_line(&line)?;
            let rid = rf.append(key, &value)?;
            if let Some(index) = index.as_mut() {
                index.insert(key, rid)?;
            }
            loaded += 1;
        }

        rf.close()?;
        if let Some(index) = index {
            index.close()?;
        }
        info!(table = %stmt.table, loaded, with_index = stmt.with_index, "Loaded table");
        Ok(())
    }
}

/// Folds the key predicates into a `(min, max, eql)` window. `NE` has
/// no window effect and stays a residual filter.
fn fold_key_conds(conds: &[SelCond]) -> KeyRange {
    let mut range = KeyRange {
        min: 0,
        max: i32::MAX,
        eql: None,
    };
    for cond in conds {
        if cond.attr != CondAttr::Key {
            continue;
        }
        let v = atoi(&cond.value);
        match cond.comp {
            Comparator::Lt => range.max = range.max.min(v.saturating_sub(1)),
            Comparator::Le => range.max = range.max.min(v),
            Comparator::Gt => range.min = range.min.max(v.saturating_add(1)),
            Comparator::Ge => range.min = range.min.max(v),
            Comparator::Eq => range.eql = Some(v),
            Comparator::Ne => {}
        }
    }
    range
}

/// Evaluates every predicate against one tuple.
fn eval_conds(conds: &[SelCond], key: i32, value: &str) -> bool {
    conds.iter().all(|cond| {
        let ord = match cond.attr {
            CondAttr::Key => key.cmp(&atoi(&cond.value)),
            CondAttr::Value => value.cmp(cond.value.as_str()),
        };
        comp_matches(cond.comp, ord)
    })
}

/// Evaluates only the value-attribute predicates (the equality plan has
/// already pinned the key).
fn eval_value_conds(conds: &[SelCond], value: &str) -> bool {
    conds
        .iter()
        .filter(|cond| cond.attr == CondAttr::Value)
        .all(|cond| comp_matches(cond.comp, value.cmp(cond.value.as_str())))
}

fn comp_matches(comp: Comparator, ord: Ordering) -> bool {
    match comp {
        Comparator::Eq => ord == Ordering::Equal,
        Comparator::Ne => ord != Ordering::Equal,
        Comparator::Lt => ord == Ordering::Less,
        Comparator::Le => ord != Ordering::Greater,
        Comparator::Gt => ord == Ordering::Greater,
        Comparator::Ge => ord != Ordering::Less,
    }
}

fn print_tuple(
    attr: SelectAttr,
    key: i32,
    value: &str,
    out: &mut dyn Write,
) -> Result<(), Error> {
    match attr {
        SelectAttr::Key => writeln!(out, "{}", key)?,
        SelectAttr::Value => writeln!(out, "{}", value)?,
        SelectAttr::All => writeln!(out, "{} '{}'", key, value)?,
        SelectAttr::Count => {}
    }
    Ok(())
}

/// Parses the integer prefix of `s` the way `atoi` does: optional
/// leading whitespace and sign, then digits; anything else yields 0.
fn atoi(s: &str) -> i32 {
    let t = s.trim_start();
    let bytes = t.as_bytes();
    let mut end = 0;
    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    t[..end].parse::<i32>().unwrap_or(0)
}

/// Parses one load-file line of the form `<int>,<ws>[<quote>]<value>`.
/// The value may be wrapped in single or double quotes (an unterminated
/// quote runs to the end of the line); an unquoted value is the rest of
/// the line. A line without a comma is rejected.
fn parse_load_line(line: &str) -> Result<(i32, String), Error> {
    let rest = line.trim_start_matches([' ', '\t']);
    let key = atoi(rest);

    let tail = match rest.split_once(',') {
        Some((_, tail)) => tail.trim_start_matches([' ', '\t']),
        None => return Err(err!(InvalidFileFormat, "Bad load line: '{}'", line)),
    };

    let Some(first) = tail.chars().next() else {
        return Ok((key, String::new()));
    };
    if first == '\'' || first == '"' {
        let body = &tail[first.len_utf8()..];
        let value = match body.find(first) {
            Some(pos) => &body[..pos],
            None => body,
        };
        Ok((key, value.to_string()))
    } else {
        Ok((key, tail.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql;
    use std::io::Write as _;
    use tempfile::{tempdir, TempDir};

    /// Runs one SQL string against an engine rooted in `dir` and
    /// returns what it printed.
    fn run(engine: &SqlEngine, sql_text: &str) -> String {
        let cmd = sql::parse(sql_text).unwrap();
        let mut out = Vec::new();
        engine.execute(&cmd, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn write_load_file(dir: &TempDir, name: &str, lines: &[&str]) -> String {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        path.to_string_lossy().into_owned()
    }

    /// Keys 10..=50 step 10 with spelled-out values, loaded with index.
    fn tens_engine(dir: &TempDir) -> SqlEngine {
        let file = write_load_file(
            dir,
            "tens.del",
            &[
                "10,ten",
                "20,twenty",
                "30,thirty",
                "40,forty",
                "50,fifty",
            ],
        );
        let engine = SqlEngine::new(dir.path());
        run(&engine, &format!("LOAD t FROM '{}' WITH INDEX", file));
        engine
    }

    #[test]
    fn test_range_scan_prints_keys_in_order() {
        let dir = tempdir().unwrap();
        let engine = tens_engine(&dir);

        let out = run(&engine, "SELECT key FROM t WHERE key >= 20 AND key < 50");
        assert_eq!(out, "20\n30\n40\n");

        let out = run(&engine, "SELECT COUNT(*) FROM t WHERE key >= 20 AND key < 50");
        assert_eq!(out, "3\n");
    }

    #[test]
    fn test_equality_hit_and_miss() {
        let dir = tempdir().unwrap();
        let engine = tens_engine(&dir);

        assert_eq!(run(&engine, "SELECT * FROM t WHERE key = 30"), "30 'thirty'\n");
        assert_eq!(run(&engine, "SELECT * FROM t WHERE key = 25"), "");
        assert_eq!(run(&engine, "SELECT COUNT(*) FROM t WHERE key = 25"), "0\n");
    }

    #[test]
    fn test_equality_with_value_residual() {
        let dir = tempdir().unwrap();
        let engine = tens_engine(&dir);

        assert_eq!(
            run(&engine, "SELECT value FROM t WHERE key = 30 AND value = 'thirty'"),
            "thirty\n"
        );
        assert_eq!(
            run(&engine, "SELECT value FROM t WHERE key = 30 AND value = 'wrong'"),
            ""
        );
    }

    #[test]
    fn test_conflicting_range_returns_nothing() {
        let dir = tempdir().unwrap();
        let engine = tens_engine(&dir);

        assert_eq!(
            run(&engine, "SELECT COUNT(*) FROM t WHERE key > 100 AND key < 50"),
            "0\n"
        );
    }

    #[test]
    fn test_ne_is_a_residual_in_range_scans() {
        let dir = tempdir().unwrap();
        let engine = tens_engine(&dir);

        let out = run(&engine, "SELECT key FROM t WHERE key >= 10 AND key <> 30");
        assert_eq!(out, "10\n20\n40\n50\n");
    }

    #[test]
    fn test_whole_table_count_uses_index() {
        let dir = tempdir().unwrap();
        let engine = tens_engine(&dir);

        // No heap file needed for a bare COUNT(*): remove it to prove
        // the index alone answers the query.
        std::fs::remove_file(dir.path().join("t.tbl")).unwrap();
        assert_eq!(run(&engine, "SELECT COUNT(*) FROM t"), "5\n");
    }

    #[test]
    fn test_sequential_fallback_without_index() {
        let dir = tempdir().unwrap();
        let engine = tens_engine(&dir);
        std::fs::remove_file(dir.path().join("t.idx")).unwrap();

        assert_eq!(
            run(&engine, "SELECT value FROM t WHERE value = 'forty'"),
            "forty\n"
        );
        assert_eq!(run(&engine, "SELECT key FROM t WHERE key > 30"), "40\n50\n");
        assert_eq!(run(&engine, "SELECT COUNT(*) FROM t"), "5\n");
    }

    #[test]
    fn test_index_and_sequential_plans_agree() {
        let dir = tempdir().unwrap();
        let file = write_load_file(
            &dir,
            "data.del",
            &["7,seven", "3,three", "9,nine", "1,one", "5,five"],
        );
        let engine = SqlEngine::new(dir.path());
        run(&engine, &format!("LOAD indexed FROM '{}' WITH INDEX", file));
        run(&engine, &format!("LOAD plain FROM '{}'", file));

        for where_clause in [
            "WHERE key >= 3 AND key <= 7",
            "WHERE key = 5",
            "WHERE key > 2 AND key <> 7",
        ] {
            let via_index = run(&engine, &format!("SELECT key FROM indexed {}", where_clause));
            let via_scan = run(&engine, &format!("SELECT key FROM plain {}", where_clause));
            assert_eq!(via_index, via_scan, "plans disagree on {}", where_clause);
        }
    }

    #[test]
    fn test_range_scan_emits_heap_values_in_key_order() {
        let dir = tempdir().unwrap();
        let file = write_load_file(&dir, "data.del", &["2,two", "0,zero", "1,one"]);
        let engine = SqlEngine::new(dir.path());
        run(&engine, &format!("LOAD t FROM '{}' WITH INDEX", file));

        assert_eq!(
            run(&engine, "SELECT * FROM t WHERE key <= 2"),
            "0 'zero'\n1 'one'\n2 'two'\n"
        );
    }

    #[test]
    fn test_select_from_missing_table_fails() {
        let dir = tempdir().unwrap();
        let engine = SqlEngine::new(dir.path());
        let cmd = sql::parse("SELECT key FROM absent").unwrap();
        let mut out = Vec::new();
        assert!(engine.execute(&cmd, &mut out).is_err());
    }

    #[test]
    fn test_load_rejects_line_without_comma() {
        let dir = tempdir().unwrap();
        let file = write_load_file(&dir, "bad.del", &["1,one", "not a tuple"]);
        let engine = SqlEngine::new(dir.path());
        let cmd = sql::parse(&format!("LOAD t FROM '{}'", file)).unwrap();
        let mut out = Vec::new();
        assert!(matches!(
            engine.execute(&cmd, &mut out),
            Err(Error::InvalidFileFormat(_))
        ));
    }

    #[test]
    fn test_load_scales_past_leaf_splits() {
        let dir = tempdir().unwrap();
        let lines: Vec<String> = (0..300).map(|k| format!("{},row{}", k, k)).collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let file = write_load_file(&dir, "big.del", &refs);
        let engine = SqlEngine::new(dir.path());
        run(&engine, &format!("LOAD big FROM '{}' WITH INDEX", file));

        assert_eq!(run(&engine, "SELECT COUNT(*) FROM big"), "300\n");
        assert_eq!(
            run(&engine, "SELECT key FROM big WHERE key >= 297"),
            "297\n298\n299\n"
        );
        assert_eq!(
            run(&engine, "SELECT value FROM big WHERE key = 142"),
            "row142\n"
        );
    }

    #[test]
    fn test_parse_load_line_variants() {
        assert_eq!(parse_load_line("1,one").unwrap(), (1, "one".to_string()));
        assert_eq!(
            parse_load_line("  2,\ttwo words here").unwrap(),
            (2, "two words here".to_string())
        );
        assert_eq!(
            parse_load_line("3,'quoted, with comma'").unwrap(),
            (3, "quoted, with comma".to_string())
        );
        assert_eq!(
            parse_load_line("4,\"double quoted\"").unwrap(),
            (4, "double quoted".to_string())
        );
        assert_eq!(
            parse_load_line("5,'unterminated").unwrap(),
            (5, "unterminated".to_string())
        );
        assert_eq!(parse_load_line("6,").unwrap(), (6, String::new()));
        assert_eq!(parse_load_line("-7,negative").unwrap(), (-7, "negative".to_string()));
        assert!(parse_load_line("no comma here").is_err());
        assert!(parse_load_line("").is_err());
    }

    #[test]
    fn test_atoi_prefix_semantics() {
        assert_eq!(atoi("42"), 42);
        assert_eq!(atoi("  -13rest"), -13);
        assert_eq!(atoi("+7"), 7);
        assert_eq!(atoi("abc"), 0);
        assert_eq!(atoi(""), 0);
    }

    #[test]
    fn test_fold_key_conds_window() {
        let conds = vec![
            SelCond {
                attr: CondAttr::Key,
                comp: Comparator::Gt,
                value: "100".into(),
            },
            SelCond {
                attr: CondAttr::Key,
                comp: Comparator::Lt,
                value: "50".into(),
            },
        ];
        let range = fold_key_conds(&conds);
        assert_eq!((range.min, range.max), (101, 49));
        assert!(range.eql.is_none());

        let conds = vec![SelCond {
            attr: CondAttr::Key,
            comp: Comparator::Eq,
            value: "0".into(),
        }];
        assert_eq!(fold_key_conds(&conds).eql, Some(0));
    }
}
