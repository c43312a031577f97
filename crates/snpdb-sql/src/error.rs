//! Error types for query construction and join inference.
//!
//! Every [`SqlError`] is structural: it describes a programmer or catalog
//! mistake and is raised at build/serialize time, never retried.

use thiserror::Error;

/// Errors raised while building, serializing or planning a query.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SqlError {
    /// An operand cannot be rendered as an identifier or bound parameter.
    #[error("malformed expression: {0}")]
    MalformedExpression(String),

    /// The query does not start with a statement keyword.
    #[error("malformed query: {0}")]
    MalformedQuery(String),

    /// No table in the catalog provides these columns.
    #[error("columns not found in any table: {}", columns.join(", "))]
    ColumnNotFound {
        /// Unresolved column names, in request order.
        columns: Vec<String>,
    },

    /// No chain of shared columns links the source and destination tables.
    #[error("tables not related: [{}] -> [{}]", sources.join(", "), destinations.join(", "))]
    TablesNotRelated {
        /// Tables the search started from.
        sources: Vec<String>,
        /// Tables the search tried to reach.
        destinations: Vec<String>,
    },
}

/// Convenience type alias for query-layer results.
pub type Result<T> = std::result::Result<T, SqlError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_expression_display() {
        let err = SqlError::MalformedExpression("bad identifier: a b".into());
        assert_eq!(err.to_string(), "malformed expression: bad identifier: a b");
    }

    #[test]
    fn column_not_found_lists_columns() {
        let err = SqlError::ColumnNotFound {
            columns: vec!["foo".into(), "bar".into()],
        };
        assert_eq!(err.to_string(), "columns not found in any table: foo, bar");
    }

    #[test]
    fn tables_not_related_display() {
        let err = SqlError::TablesNotRelated {
            sources: vec!["Tree".into()],
            destinations: vec!["Island".into()],
        };
        assert_eq!(err.to_string(), "tables not related: [Tree] -> [Island]");
    }
}
