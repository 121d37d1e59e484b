//! Table identifier rules.

use crate::error::SchemaError;

/// Longest accepted table name.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Words that cannot be used as bare table names. Sorted for binary search.
pub const RESERVED_WORDS: &[&str] = &[
    "ALL", "ALTER", "AND", "ANTI", "ANY", "AS", "ASC", "ASOF", "ATTACH",
    "BETWEEN", "BY", "CASE", "CAST", "CHECK", "COLUMN", "CONSTRAINT", "COPY", "CREATE",
    "CROSS", "CURRENT_DATE", "CURRENT_TIME", "CURRENT_TIMESTAMP", "DEFAULT", "DELETE",
    "DESC", "DETACH", "DISTINCT", "DROP", "ELSE", "END", "EXCEPT", "EXISTS", "EXPORT",
    "FALSE", "FETCH", "FOR", "FOREIGN", "FROM", "FULL", "GROUP", "HAVING", "IMPORT", "IN",
    "INNER", "INSERT", "INSTALL", "INTERSECT", "INTO", "IS", "JOIN", "LEFT", "LIKE",
    "LIMIT", "LOAD", "NATURAL", "NOT", "NULL", "OFFSET", "ON", "OR", "ORDER", "OUTER",
    "POSITIONAL", "PRAGMA", "PRIMARY", "QUALIFY", "REFERENCES", "RETURNING", "RIGHT",
    "SELECT", "SEMI", "SET", "TABLE", "THEN", "TO", "TRUE", "TRUNCATE", "UNION", "UNIQUE",
    "UPDATE", "USING", "VALUES", "WHEN", "WHERE", "WINDOW", "WITH",
];

/// Whether `word` is reserved, ignoring case.
pub fn is_reserved_word(word: &str) -> bool {
    let upper = word.to_ascii_uppercase();
    RESERVED_WORDS.binary_search(&upper.as_str()).is_ok()
}

/// Check that `name` can be used unquoted as a table name.
pub fn validate_table_name(name: &str) -> Result<(), SchemaError> {
    let invalid = |reason: &str| SchemaError::InvalidIdentifier {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let first = name.chars().next().ok_or_else(|| invalid("name is empty"))?;
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(invalid(&format!(
            "longer than {} characters",
            MAX_IDENTIFIER_LEN
        )));
    }
    if first.is_ascii_digit() {
        return Err(invalid("starts with a digit"));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_'))
    {
        return Err(invalid(&format!(
            "contains '{}' (only letters, digits and underscores are allowed)",
            bad
        )));
    }
    if is_reserved_word(name) {
        return Err(invalid("is a reserved SQL word"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_words_are_sorted() {
        let mut sorted = RESERVED_WORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, RESERVED_WORDS);
    }

    #[test]
    fn accepts_plain_names() {
        for name in ["people", "People_2024", "_staging", "t1"] {
            assert!(validate_table_name(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn rejects_illegal_names() {
        for name in [
            "",
            "1people",
            "people;drop",
            "my table",
            "select",
            "Order",
            "naïve",
        ] {
            let err = validate_table_name(name).unwrap_err();
            assert!(err.is_identifier_error(), "{name}");
        }
        assert!(validate_table_name(&"x".repeat(63)).is_ok());
        assert!(validate_table_name(&"x".repeat(64)).is_err());
    }
}
