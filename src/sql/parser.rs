use super::statement::*;
use super::tokenizer;
use super::validator;
use crate::errors;
use std::collections::VecDeque;

/// Helper function to expect and consume a specific token.
fn expect_token(
    tokens: &mut VecDeque<String>,
    expected: &str,
    error_msg: &str,
) -> Result<(), errors::Error> {
    match tokens.pop_front() {
        Some(token) if token.to_uppercase() == expected.to_uppercase() => Ok(()),
        _ => Err(errors::Error::Syntax(error_msg.to_owned())),
    }
}

/// Helper function to pop a token or return an error.
fn pop_token(tokens: &mut VecDeque<String>, error_msg: &str) -> Result<String, errors::Error> {
    tokens
        .pop_front()
        .ok_or_else(|| errors::Error::Syntax(error_msg.to_owned()))
}

/// Strips one pair of surrounding single quotes, if present.
fn unquote(token: &str) -> String {
    if token.len() >= 2 && token.starts_with('\'') && token.ends_with('\'') {
        token[1..token.len() - 1].to_string()
    } else {
        token.to_string()
    }
}

/// Parses the projected attribute of a `SELECT`.
fn parse_attr(tokens: &mut VecDeque<String>) -> Result<SelectAttr, errors::Error> {
    let token = pop_token(tokens, "'SELECT' must specify an attribute.")?;
    match token.to_uppercase().as_str() {
        "KEY" => Ok(SelectAttr::Key),
        "VALUE" => Ok(SelectAttr::Value),
        "*" => Ok(SelectAttr::All),
        "COUNT(*)" => Ok(SelectAttr::Count),
        "COUNT" => {
            expect_token(tokens, "(*)", "'COUNT' must be followed by '(*)'.")?;
            Ok(SelectAttr::Count)
        }
        _ => Err(errors::Error::Syntax(format!(
            "Unknown attribute: {}. Expected key, value, * or COUNT(*).",
            token
        ))),
    }
}

/// Parses one `<attr> <comp> <literal>` condition.
fn parse_cond(tokens: &mut VecDeque<String>) -> Result<SelCond, errors::Error> {
    let attr_token = pop_token(tokens, "Missing attribute in WHERE condition.")?;
    let attr = match attr_token.to_uppercase().as_str() {
        "KEY" => CondAttr::Key,
        "VALUE" => CondAttr::Value,
        _ => {
            return Err(errors::Error::Syntax(format!(
                "Conditions may compare key or value, not {}.",
                attr_token
            )))
        }
    };

    let comp_token = pop_token(tokens, "Missing comparator in WHERE condition.")?;
    let comp = match comp_token.as_str() {
        "=" => Comparator::Eq,
        "<>" => Comparator::Ne,
        "<" => Comparator::Lt,
        "<=" => Comparator::Le,
        ">" => Comparator::Gt,
        ">=" => Comparator::Ge,
        _ => {
            return Err(errors::Error::Syntax(format!(
                "Unknown comparator: {}.",
                comp_token
            )))
        }
    };

    let literal = pop_token(tokens, "Missing literal in WHERE condition.")?;
    Ok(SelCond {
        attr,
        comp,
        value: unquote(&literal),
    })
}

/// Parses a `SELECT` statement from tokenized SQL.
fn parse_select(tokens: &mut VecDeque<String>) -> Result<SelectStatement, errors::Error> {
    let attr = parse_attr(tokens)?;
    expect_token(tokens, "FROM", "'SELECT <attr>' must be followed by 'FROM'.")?;
    let table = validator::validate_table_name(&pop_token(
        tokens,
        "'SELECT ... FROM' must be followed by a table name.",
    )?)?;

    let mut conds = Vec::new();
    if !tokens.is_empty() {
        expect_token(tokens, "WHERE", "Expected 'WHERE' after the table name.")?;
        conds.push(parse_cond(tokens)?);
        while let Some(token) = tokens.front() {
            if token.to_uppercase() != "AND" {
                break;
            }
            tokens.pop_front();
            conds.push(parse_cond(tokens)?);
        }
    }

    Ok(SelectStatement { attr, table, conds })
}

/// Parses a `LOAD` statement from tokenized SQL.
fn parse_load(tokens: &mut VecDeque<String>) -> Result<LoadStatement, errors::Error> {
    let table = validator::validate_table_name(&pop_token(
        tokens,
        "'LOAD' must be followed by a table name.",
    )?)?;
    expect_token(tokens, "FROM", "'LOAD <table>' must be followed by 'FROM'.")?;
    let file = unquote(&pop_token(
        tokens,
        "'LOAD <table> FROM' must be followed by a file name.",
    )?);

    let mut with_index = false;
    if !tokens.is_empty() {
        expect_token(tokens, "WITH", "Expected 'WITH INDEX' after the file name.")?;
        expect_token(tokens, "INDEX", "Expected 'INDEX' after 'WITH'.")?;
        with_index = true;
    }

    Ok(LoadStatement {
        table,
        file,
        with_index,
    })
}

/// Parses a full SQL statement.
///
/// # Arguments
/// * `raw_sql` - The raw SQL string to parse, with or without the
///   terminating semicolon.
///
/// # Returns
/// A `Result` containing the parsed `SqlCommand` or an `errors::Error`.
pub fn parse(raw_sql: &str) -> Result<SqlCommand, errors::Error> {
    let trimmed = raw_sql.trim();
    let mut tokens = tokenizer::tokenize_sql(trimmed.strip_suffix(';').unwrap_or(trimmed))?;

    let first = pop_token(&mut tokens, "SQL statement cannot be empty.")?.to_uppercase();
    let statement = match first.as_str() {
        "SELECT" => Statement::Select(parse_select(&mut tokens)?),
        "LOAD" => Statement::Load(parse_load(&mut tokens)?),
        _ => {
            return Err(errors::Error::Syntax(format!(
                "Unrecognized statement: {}.",
                first
            )))
        }
    };
    if !tokens.is_empty() {
        return Err(errors::Error::Syntax(
            "Unexpected tokens after statement.".to_owned(),
        ));
    }
    Ok(SqlCommand {
        statement,
        sql: raw_sql.to_string(),
    })
}
