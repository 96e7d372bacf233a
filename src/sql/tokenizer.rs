use crate::errors;
use std::collections::VecDeque;

/// Splits an SQL statement into tokens, respecting spaces inside
/// parentheses and quotes. Comparison operators (`=`, `<>`, `<=`, `>=`,
/// `<`, `>`) become tokens of their own, so `key>=20` and `key >= 20`
/// tokenize identically. Quote characters stay attached to their token;
/// the parser strips them.
pub fn tokenize_sql(sql: &str) -> Result<VecDeque<String>, errors::Error> {
    let mut result = VecDeque::new();
    let mut current = String::new();
    let mut inside_parens = false;
    let mut inside_text = false;

    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                inside_text = !inside_text;
                current.push(c);
            }
            ')' => {
                if !inside_text {
                    if !inside_parens {
                        return Err(errors::Error::Syntax(
                            "Unmatched closing parenthesis.".to_owned(),
                        ));
                    }
                    inside_parens = false;
                }
                current.push(c);
            }
            '(' => {
                if !inside_text {
                    if inside_parens {
                        return Err(errors::Error::Syntax(
                            "Nested opening parenthesis.".to_owned(),
                        ));
                    }
                    inside_parens = true;
                }
                current.push(c);
            }
            '<' | '>' | '=' if !inside_text && !inside_parens => {
                if !current.is_empty() {
                    result.push_back(current);
                    current = String::new();
                }
                let mut op = String::from(c);
                if let Some(&next) = chars.peek() {
                    if (c == '<' && (next == '=' || next == '>')) || (c == '>' && next == '=') {
                        op.push(next);
                        chars.next();
                    }
                }
                result.push_back(op);
            }
            ' ' | '\t' if !inside_parens && !inside_text => {
                if !current.is_empty() {
                    result.push_back(current);
                    current = String::new();
                }
            }
            _ => current.push(c),
        }
    }

    if !current.is_empty() {
        result.push_back(current);
    }
    if inside_parens {
        return Err(errors::Error::Syntax(
            "Missing closing parenthesis.".to_owned(),
        ));
    }
    if inside_text {
        return Err(errors::Error::Syntax("Unclosed text literal.".to_owned()));
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(sql: &str) -> Vec<String> {
        tokenize_sql(sql).unwrap().into_iter().collect()
    }

    #[test]
    fn test_splits_on_whitespace() {
        assert_eq!(
            tokens("SELECT key FROM movie"),
            vec!["SELECT", "key", "FROM", "movie"]
        );
    }

    #[test]
    fn test_operators_become_their_own_tokens() {
        assert_eq!(
            tokens("WHERE key>=20 AND key<50"),
            vec!["WHERE", "key", ">=", "20", "AND", "key", "<", "50"]
        );
        assert_eq!(tokens("key <> 5"), vec!["key", "<>", "5"]);
        assert_eq!(tokens("value='x'"), vec!["value", "=", "'x'"]);
    }

    #[test]
    fn test_quoted_literal_keeps_spaces_and_operators() {
        assert_eq!(
            tokens("value = 'war > peace'"),
            vec!["value", "=", "'war > peace'"]
        );
    }

    #[test]
    fn test_count_star_stays_one_token() {
        assert_eq!(tokens("SELECT COUNT(*) FROM t"), vec!["SELECT", "COUNT(*)", "FROM", "t"]);
    }

    #[test]
    fn test_unclosed_quote_is_an_error() {
        assert!(tokenize_sql("value = 'oops").is_err());
    }

    #[test]
    fn test_unmatched_parens_are_errors() {
        assert!(tokenize_sql("COUNT(*").is_err());
        assert!(tokenize_sql("COUNT*)").is_err());
    }
}
