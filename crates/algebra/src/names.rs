//! Reserved column-name conventions shared by the compiler, the renderers,
//! and `materialize`.
//!
//! System columns use a `$`-based prefix because `$` is not expected in
//! user-chosen field names; every dialect we render quotes identifiers, so
//! the character itself is unproblematic.

/// Separator for nested prop paths flattened into a single column alias
/// (e.g. `author$$name`).
pub const PATH_SEPARATOR: &str = "$$";

/// Prefix shared by all internal helper columns.
pub const SYSTEM_PREFIX: &str = "$sys$";

/// Column alias used for the single column of a scalar projection.
pub const SCALAR_COLUMN: &str = "$sys$value";

/// Alias of the N-th propagated ordering helper column.
pub fn ordering_column(index: usize) -> String {
    format!("{}ord${}", SYSTEM_PREFIX, index)
}

/// True for aliases of internal ordering helpers that the final optimizer
/// pass strips from the outermost SELECT.
pub fn is_ordering_column(alias: &str) -> bool {
    alias.starts_with("$sys$ord$")
}

/// Join a prop path into a flat column alias.
pub fn column_alias(path: &[String]) -> String {
    path.join(PATH_SEPARATOR)
}

/// Split a flat column alias back into a prop path.
pub fn split_alias(alias: &str) -> Vec<String> {
    alias.split(PATH_SEPARATOR).map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_round_trip() {
        let path = vec!["author".to_string(), "name".to_string()];
        assert_eq!(column_alias(&path), "author$$name");
        assert_eq!(split_alias("author$$name"), path);
    }

    #[test]
    fn test_ordering_column_recognized() {
        assert!(is_ordering_column(&ordering_column(0)));
        assert!(!is_ordering_column("title"));
        assert!(!is_ordering_column(SCALAR_COLUMN));
    }
}
