use crate::constants::GENERATED_COLUMNS;
use crate::error::Error;
use crate::error::ErrorKind;
use crate::error::Result;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

/// Check that a table or column name can be used as an SQL identifier.
///
/// The name is still quoted whenever it ends up in a statement,
/// this check keeps names portable and readable in introspection results.
pub fn validate_identifier(what: &str, name: &str) -> Result<()> {
    lazy_static! {
        static ref REGEXP: Regex =
            Regex::new(r"^[_a-zA-Z][_a-zA-Z0-9]{0,63}$").expect("Cannot create regex");
    }
    if !REGEXP.is_match(name) {
        Err(Error {
            kind: ErrorKind::InvalidRequest,
            msg: format!(
                "{} name {} does not satisfy the format {}",
                what,
                name,
                REGEXP.as_str()
            ),
        })
    } else if BLOCKLIST_NAMES.contains(&name.to_lowercase()) {
        Err(Error {
            kind: ErrorKind::InvalidRequest,
            msg: format!("Blocklisted {} name {}", what.to_lowercase(), name),
        })
    } else if name.to_lowercase().starts_with("sqlite_") {
        Err(Error {
            kind: ErrorKind::InvalidRequest,
            msg: format!("{} name {} uses the reserved prefix sqlite_", what, name),
        })
    } else {
        Ok(())
    }
}

/// Like `validate_identifier`, and additionally refuse the columns
/// that every table gets automatically (`id`, `created_at`, `updated_at`).
pub fn validate_user_column_name(name: &str) -> Result<()> {
    validate_identifier("Column", name)?;
    if is_generated_column(name) {
        Err(Error {
            kind: ErrorKind::InvalidRequest,
            msg: format!(
                "Column name {} is reserved, columns {} are added to every table automatically",
                name,
                GENERATED_COLUMNS.join(", ")
            ),
        })
    } else {
        Ok(())
    }
}

pub fn is_generated_column(name: &str) -> bool {
    GENERATED_COLUMNS
        .iter()
        .any(|generated| generated.eq_ignore_ascii_case(name))
}

// SQLite keywords taken from https://www.sqlite.org/lang_keywords.html
const BLOCKLIST_NAMES_ARRAY: &[&str] = &[
    "ABORT",
    "ACTION",
    "ADD",
    "AFTER",
    "ALL",
    "ALTER",
    "ALWAYS",
    "ANALYZE",
    "AND",
    "AS",
    "ASC",
    "ATTACH",
    "AUTOINCREMENT",
    "BEFORE",
    "BEGIN",
    "BETWEEN",
    "BY",
    "CASCADE",
    "CASE",
    "CAST",
    "CHECK",
    "COLLATE",
    "COLUMN",
    "COMMIT",
    "CONFLICT",
    "CONSTRAINT",
    "CREATE",
    "CROSS",
    "CURRENT",
    "CURRENT_DATE",
    "CURRENT_TIME",
    "CURRENT_TIMESTAMP",
    "DATABASE",
    "DEFAULT",
    "DEFERRABLE",
    "DEFERRED",
    "DELETE",
    "DESC",
    "DETACH",
    "DISTINCT",
    "DO",
    "DROP",
    "EACH",
    "ELSE",
    "END",
    "ESCAPE",
    "EXCEPT",
    "EXCLUDE",
    "EXCLUSIVE",
    "EXISTS",
    "EXPLAIN",
    "FAIL",
    "FILTER",
    "FIRST",
    "FOLLOWING",
    "FOR",
    "FOREIGN",
    "FROM",
    "FULL",
    "GENERATED",
    "GLOB",
    "GROUP",
    "GROUPS",
    "HAVING",
    "IF",
    "IGNORE",
    "IMMEDIATE",
    "IN",
    "INDEX",
    "INDEXED",
    "INITIALLY",
    "INNER",
    "INSERT",
    "INSTEAD",
    "INTERSECT",
    "INTO",
    "IS",
    "ISNULL",
    "JOIN",
    "KEY",
    "LAST",
    "LEFT",
    "LIKE",
    "LIMIT",
    "MATCH",
    "NATURAL",
    "NO",
    "NOT",
    "NOTHING",
    "NOTNULL",
    "NULL",
    "NULLS",
    "OF",
    "OFFSET",
    "ON",
    "OR",
    "ORDER",
    "OTHERS",
    "OUTER",
    "OVER",
    "PARTITION",
    "PLAN",
    "PRAGMA",
    "PRECEDING",
    "PRIMARY",
    "QUERY",
    "RAISE",
    "RANGE",
    "RECURSIVE",
    "REFERENCES",
    "REGEXP",
    "REINDEX",
    "RELEASE",
    "RENAME",
    "REPLACE",
    "RESTRICT",
    "RIGHT",
    "ROLLBACK",
    "ROW",
    "ROWS",
    "SAVEPOINT",
    "SELECT",
    "SET",
    "TABLE",
    "TEMP",
    "TEMPORARY",
    "THEN",
    "TIES",
    "TO",
    "TRANSACTION",
    "TRIGGER",
    "UNBOUNDED",
    "UNION",
    "UNIQUE",
    "UPDATE",
    "USING",
    "VACUUM",
    "VALUES",
    "VIEW",
    "VIRTUAL",
    "WHEN",
    "WHERE",
    "WINDOW",
    "WITH",
    "WITHOUT",
];

lazy_static! {
    static ref BLOCKLIST_NAMES: HashSet<String> = {
        BLOCKLIST_NAMES_ARRAY
            .iter()
            .map(|w| w.to_lowercase())
            .collect()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifiers() {
        assert_eq!(validate_identifier("Table", "sample_table"), Ok(()));
        assert_eq!(validate_identifier("Table", "t1"), Ok(()));
        assert_eq!(validate_identifier("Column", "_private"), Ok(()));
        assert_eq!(validate_identifier("Column", "x"), Ok(()));
    }

    #[test]
    fn test_invalid_identifiers() {
        assert!(validate_identifier("Table", "").is_err());
        assert!(validate_identifier("Table", "1table").is_err());
        assert!(validate_identifier("Table", "users; DROP TABLE users").is_err());
        assert!(validate_identifier("Table", "with space").is_err());
        assert!(validate_identifier("Table", "quo\"te").is_err());
        assert!(validate_identifier("Table", &"a".repeat(65)).is_err());
    }

    #[test]
    fn test_keywords_and_prefixes() {
        let err = validate_identifier("Table", "Select").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidRequest);
        assert!(validate_identifier("Table", "sqlite_master").is_err());
        assert!(validate_identifier("Table", "SQLITE_sequence").is_err());
    }

    #[test]
    fn test_reserved_column_names() {
        assert!(validate_user_column_name("id").is_err());
        assert!(validate_user_column_name("Created_At").is_err());
        assert!(validate_user_column_name("updated_at").is_err());
        assert_eq!(validate_user_column_name("user_id"), Ok(()));
        assert!(is_generated_column("ID"));
        assert!(!is_generated_column("identity"));
    }
}
