use crate::errors;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref TABLE_REGEX: Regex = Regex::new(r#"^[A-Za-z_][A-Za-z0-9_]*$"#).unwrap();
}

/// Validates a table name against the identifier regex.
///
/// # Returns
/// A `Result` containing the validated name or an `errors::Error`.
pub fn validate_table_name(name: &str) -> Result<String, errors::Error> {
    if name.is_empty() {
        return Err(errors::Error::Syntax(
            "Table name cannot be empty.".to_owned(),
        ));
    }
    if TABLE_REGEX.is_match(name) {
        Ok(name.to_string())
    } else {
        Err(errors::Error::Syntax(format!(
            "Table name ({}) must match regex {}.",
            name,
            TABLE_REGEX.as_str()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_identifiers() {
        assert_eq!(validate_table_name("movie").unwrap(), "movie");
        assert_eq!(validate_table_name("_t2").unwrap(), "_t2");
    }

    #[test]
    fn test_rejects_non_identifiers() {
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("2fast").is_err());
        assert!(validate_table_name("a.b").is_err());
        assert!(validate_table_name("../etc").is_err());
    }
}
