//! The expected schema: tables, indexes and version, plus join planning.

use std::sync::Arc;

use crate::error::{Result, SqlError};
use crate::expr::{Comparison, Rhs};
use crate::join::{JoinPlan, JoinResolver};
use crate::query::Query;
use crate::schema::{Column, Index, Table};

/// Immutable description of the schema a database is expected to have.
///
/// Declaration order of tables is the tie-break order for join inference and
/// the order DDL is emitted in.
#[derive(Debug)]
pub struct Catalog {
    version: u32,
    tables: Vec<Table>,
    indexes: Vec<Index>,
    legacy_fingerprints: Vec<String>,
    resolver: JoinResolver,
}

impl Catalog {
    /// Start a catalog at schema `version`.
    pub fn builder(version: u32) -> CatalogBuilder {
        CatalogBuilder {
            version,
            tables: Vec::new(),
            indexes: Vec::new(),
            legacy_fingerprints: Vec::new(),
        }
    }

    /// Logical schema version stamped into the database.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Tables in declared order.
    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    /// Indexes in declared order.
    pub fn indexes(&self) -> &[Index] {
        &self.indexes
    }

    /// Tables-fingerprints of known obsolete on-disk layouts.
    pub fn legacy_fingerprints(&self) -> &[String] {
        &self.legacy_fingerprints
    }

    /// Table by name.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name() == name)
    }

    /// Table by name, or [`SqlError::ColumnNotFound`] naming the table.
    pub fn require_table(&self, name: &str) -> Result<&Table> {
        self.table(name).ok_or_else(|| SqlError::ColumnNotFound {
            columns: vec![format!("{name}.*")],
        })
    }

    /// Covering tables and join hops for `columns`, memoized.
    pub fn plan(&self, columns: &[Column]) -> Result<Arc<JoinPlan>> {
        self.resolver.plan(columns)
    }

    /// `SELECT columns FROM ... JOIN ... WHERE filters`, with the tables and
    /// join chain inferred from the catalog.
    pub fn select(&self, columns: &[Column], filters: Vec<Comparison>) -> Result<Query> {
        if columns.is_empty() {
            return Err(SqlError::MalformedExpression(
                "select needs at least one column".to_owned(),
            ));
        }
        let mut required = columns.to_vec();
        for filter in &filters {
            required.push(filter.column.clone());
            if let Rhs::Column(other) = &filter.rhs {
                required.push(other.clone());
            }
        }
        let plan = self.plan(&required)?;
        let Some(root) = plan.root() else {
            return Err(SqlError::MalformedExpression(
                "join plan has no root table".to_owned(),
            ));
        };

        let selected: Vec<Column> = columns.iter().map(|c| rebind(&plan, c)).collect();
        let filters = filters
            .into_iter()
            .map(|filter| Comparison {
                column: rebind(&plan, &filter.column),
                op: filter.op,
                rhs: match filter.rhs {
                    Rhs::Column(other) => Rhs::Column(rebind(&plan, &other)),
                    rhs => rhs,
                },
            })
            .collect::<Vec<_>>();

        Ok(Query::select(selected)
            .from([root])
            .join(&plan.hops)
            .filter(filters))
    }
}

/// Attach `column` to a table that is actually part of `plan`: its own
/// table when joined, otherwise the first joined table with that name.
fn rebind(plan: &JoinPlan, column: &Column) -> Column {
    if let Some(owner) = column.table() {
        if plan.joined_tables().any(|t| t.name() == owner) {
            return column.clone();
        }
    }
    plan.joined_tables()
        .find(|t| t.has_column(column.name()))
        .map_or_else(|| column.clone(), |t| column.in_table(t.name()))
}

/// Builder for [`Catalog`].
#[derive(Debug)]
pub struct CatalogBuilder {
    version: u32,
    tables: Vec<Table>,
    indexes: Vec<Index>,
    legacy_fingerprints: Vec<String>,
}

impl CatalogBuilder {
    /// Declare a table.
    #[must_use]
    pub fn table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    /// Declare an index.
    #[must_use]
    pub fn index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    /// Register a tables-fingerprint of an obsolete layout.
    #[must_use]
    pub fn legacy_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.legacy_fingerprints.push(fingerprint.into());
        self
    }

    /// Finish. Fails if an index names a table that was not declared.
    pub fn build(self) -> Result<Catalog> {
        if let Some(index) = self
            .indexes
            .iter()
            .find(|i| !self.tables.iter().any(|t| t.name() == i.table()))
        {
            return Err(SqlError::ColumnNotFound {
                columns: vec![format!("{}.*", index.table())],
            });
        }
        Ok(Catalog {
            version: self.version,
            resolver: JoinResolver::new(self.tables.clone()),
            tables: self.tables,
            indexes: self.indexes,
            legacy_fingerprints: self.legacy_fingerprints,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
