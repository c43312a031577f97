//! Whitespace-insensitive DDL fingerprints.
//!
//! A fingerprint is the SHA-256 hex digest of the normalized `CREATE`
//! statements of a set of objects, sorted by object name and joined with
//! `;\n`. Formatting differences vanish; column order, types and constraints
//! do not.

use sha2::{Digest, Sha256};
use snpdb_sql::Catalog;

use crate::error::Result;

/// Canonical form of one DDL statement.
///
/// Collapses whitespace runs to one space, removes spaces next to `(`, `)`
/// and `,`, trims, and strips a trailing `;`.
pub fn normalize_ddl(sql: &str) -> String {
    let collapsed = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut out = String::with_capacity(collapsed.len());
    let mut chars = collapsed.chars().peekable();
    while let Some(c) = chars.next() {
        if c == ' ' {
            let before_punct = chars.peek().is_some_and(|n| matches!(n, '(' | ')' | ','));
            let after_punct = out.ends_with(['(', ')', ',']);
            if before_punct || after_punct {
                continue;
            }
        }
        out.push(c);
    }
    let trimmed = out.trim();
    trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end().to_owned()
}

/// Fingerprint of `(name, ddl)` pairs.
pub fn fingerprint<N, S, I>(ddl: I) -> String
where
    N: AsRef<str>,
    S: AsRef<str>,
    I: IntoIterator<Item = (N, S)>,
{
    let mut entries: Vec<(N, S)> = ddl.into_iter().collect();
    entries.sort_by(|a, b| a.0.as_ref().cmp(b.0.as_ref()));
    let canonical = entries
        .iter()
        .map(|(_, sql)| normalize_ddl(sql.as_ref()))
        .collect::<Vec<_>>()
        .join(";\n");
    hex_sha256(&canonical)
}

fn hex_sha256(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Fingerprint of the catalog's `CREATE TABLE` statements.
pub fn catalog_tables_fingerprint(catalog: &Catalog) -> Result<String> {
    let ddl = catalog
        .tables()
        .iter()
        .map(|t| Ok((t.name().to_owned(), t.create_sql()?)))
        .collect::<Result<Vec<_>>>()?;
    Ok(fingerprint(ddl))
}

/// Fingerprint of the catalog's `CREATE INDEX` statements.
pub fn catalog_indexes_fingerprint(catalog: &Catalog) -> Result<String> {
    let ddl = catalog
        .indexes()
        .iter()
        .map(|i| Ok((i.name(), i.create_sql()?)))
        .collect::<Result<Vec<_>>>()?;
    Ok(fingerprint(ddl))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_and_tightens() {
        assert_eq!(
            normalize_ddl("CREATE TABLE  Tree (\n    parent INTEGER ,\n  name TEXT\n) ;"),
            "CREATE TABLE Tree(parent INTEGER,name TEXT)"
        );
    }

    #[test]
    fn normalize_keeps_inner_spacing() {
        assert_eq!(
            normalize_ddl("CREATE INDEX idx_Snp_node_id ON Snp (node_id)"),
            "CREATE INDEX idx_Snp_node_id ON Snp(node_id)"
        );
    }

    #[test]
    fn fingerprint_is_order_independent_by_name() {
        let a = fingerprint([("b", "CREATE TABLE b (x INTEGER)"), ("a", "CREATE TABLE a (y TEXT)")]);
        let b = fingerprint([("a", "CREATE TABLE a (y TEXT)"), ("b", "CREATE TABLE b (x INTEGER)")]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn fingerprint_sees_type_changes() {
        let a = fingerprint([("t", "CREATE TABLE t (x INTEGER)")]);
        let b = fingerprint([("t", "CREATE TABLE t (x TEXT)")]);
        assert_ne!(a, b);
    }

    #[test]
    fn empty_set_has_a_fingerprint() {
        assert_eq!(fingerprint(Vec::<(&str, &str)>::new()), hex_sha256(""));
    }
}
