//! Schema objects: columns, tables, constraints and indexes.
//!
//! These are catalog values, built once at startup and shared immutably.
//! Column order inside a [`Table`] is load-bearing: it is the order of the
//! `CREATE TABLE` definition and the order rows decode in.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{Result, SqlError};

/// Declared column type tag, rendered verbatim into DDL.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// `INTEGER`
    Integer,
    /// `TEXT`
    Text,
    /// `VARCHAR(n)`
    Varchar(u32),
    /// `DATE`
    Date,
    /// `DATETIME`
    DateTime,
    /// `DECIMAL`
    Decimal,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "INTEGER"),
            Self::Text => write!(f, "TEXT"),
            Self::Varchar(n) => write!(f, "VARCHAR({n})"),
            Self::Date => write!(f, "DATE"),
            Self::DateTime => write!(f, "DATETIME"),
            Self::Decimal => write!(f, "DECIMAL"),
        }
    }
}

/// Reject anything that is not a plain SQL identifier.
///
/// Identifiers are spliced into SQL text, so this is the guard that keeps
/// names from carrying syntax.
pub fn check_identifier(name: &str) -> Result<&str> {
    let mut chars = name.chars();
    let valid_head = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_head && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(name)
    } else {
        Err(SqlError::MalformedExpression(format!(
            "invalid identifier: {name:?}"
        )))
    }
}

/// A column definition. Identity is `(table, name)`.
#[derive(Clone, Debug)]
pub struct Column {
    name: String,
    ty: ColumnType,
    table: Option<String>,
}

impl Column {
    /// A column not (yet) attached to a table.
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            table: None,
        }
    }

    /// On-disk column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared type.
    pub fn ty(&self) -> ColumnType {
        self.ty
    }

    /// Owning table name, if attached.
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// The same column re-attached to `table`.
    #[must_use]
    pub fn in_table(&self, table: &str) -> Self {
        Self {
            name: self.name.clone(),
            ty: self.ty,
            table: Some(table.to_owned()),
        }
    }

    /// `name TYPE`, as it appears inside `CREATE TABLE`.
    pub fn definition(&self) -> Result<String> {
        Ok(format!("{} {}", check_identifier(&self.name)?, self.ty))
    }
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table && self.name == other.name
    }
}

impl Eq for Column {}

impl Hash for Column {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.table.hash(state);
        self.name.hash(state);
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{table}.{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Table-level constraint.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Constraint {
    /// `PRIMARY KEY (cols)`
    PrimaryKey(Vec<String>),
    /// `UNIQUE (cols)`
    Unique(Vec<String>),
    /// `FOREIGN KEY (cols) REFERENCES table (cols)`
    ForeignKey {
        /// Referencing columns in this table.
        columns: Vec<String>,
        /// Referenced table.
        references: String,
        /// Referenced columns.
        referenced: Vec<String>,
    },
}

fn ident_list(names: &[String]) -> Result<String> {
    if names.is_empty() {
        return Err(SqlError::MalformedExpression(
            "empty column list".to_owned(),
        ));
    }
    let checked: Result<Vec<&str>> = names.iter().map(|n| check_identifier(n)).collect();
    Ok(format!("({})", checked?.join(", ")))
}

impl Constraint {
    /// DDL text of the constraint.
    pub fn definition(&self) -> Result<String> {
        match self {
            Self::PrimaryKey(cols) => Ok(format!("PRIMARY KEY {}", ident_list(cols)?)),
            Self::Unique(cols) => Ok(format!("UNIQUE {}", ident_list(cols)?)),
            Self::ForeignKey {
                columns,
                references,
                referenced,
            } => Ok(format!(
                "FOREIGN KEY {} REFERENCES {} {}",
                ident_list(columns)?,
                check_identifier(references)?,
                ident_list(referenced)?
            )),
        }
    }

    fn columns(&self) -> &[String] {
        match self {
            Self::PrimaryKey(cols) | Self::Unique(cols) => cols,
            Self::ForeignKey { columns, .. } => columns,
        }
    }
}

/// An ordered set of columns plus constraints under a stable name.
#[derive(Clone, Debug)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
    constraints: Vec<Constraint>,
}

impl Table {
    /// Start a table definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            constraints: Vec::new(),
        }
    }

    /// Append a column. Order of calls is CREATE order.
    #[must_use]
    pub fn column(mut self, name: impl Into<String>, ty: ColumnType) -> Self {
        let column = Column {
            name: name.into(),
            ty,
            table: Some(self.name.clone()),
        };
        self.columns.push(column);
        self
    }

    /// Add a `PRIMARY KEY` constraint.
    #[must_use]
    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.constraints
            .push(Constraint::PrimaryKey(to_owned_names(columns)));
        self
    }

    /// Add a `UNIQUE` constraint.
    #[must_use]
    pub fn unique(mut self, columns: &[&str]) -> Self {
        self.constraints.push(Constraint::Unique(to_owned_names(columns)));
        self
    }

    /// Add a `FOREIGN KEY` constraint.
    #[must_use]
    pub fn foreign_key(mut self, columns: &[&str], references: &str, referenced: &[&str]) -> Self {
        self.constraints.push(Constraint::ForeignKey {
            columns: to_owned_names(columns),
            references: references.to_owned(),
            referenced: to_owned_names(referenced),
        });
        self
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Columns in CREATE order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Constraints in declaration order.
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Look up a column by name.
    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Look up a column by name, failing with [`SqlError::ColumnNotFound`].
    pub fn col(&self, name: &str) -> Result<&Column> {
        self.get(name).ok_or_else(|| SqlError::ColumnNotFound {
            columns: vec![format!("{}.{name}", self.name)],
        })
    }

    /// Whether a column with this name exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// `name (col TYPE, ..., CONSTRAINT ...)`, the body of `CREATE TABLE`.
    pub fn definition(&self) -> Result<String> {
        if self.columns.is_empty() {
            return Err(SqlError::MalformedExpression(format!(
                "table {} has no columns",
                self.name
            )));
        }
        for constraint in &self.constraints {
            if let Some(missing) = constraint.columns().iter().find(|c| !self.has_column(c)) {
                return Err(SqlError::ColumnNotFound {
                    columns: vec![format!("{}.{missing}", self.name)],
                });
            }
        }
        let mut parts = self
            .columns
            .iter()
            .map(Column::definition)
            .collect::<Result<Vec<_>>>()?;
        for constraint in &self.constraints {
            parts.push(constraint.definition()?);
        }
        Ok(format!(
            "{} ({})",
            check_identifier(&self.name)?,
            parts.join(", ")
        ))
    }

    /// Full `CREATE TABLE` statement text.
    pub fn create_sql(&self) -> Result<String> {
        Ok(format!("CREATE TABLE {}", self.definition()?))
    }
}

fn to_owned_names(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| (*n).to_owned()).collect()
}

// Structural, type-aware equality: two tables are the same value only if they
// would produce the same DDL.
impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.constraints == other.constraints
            && self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|(a, b)| a.name == b.name && a.ty == b.ty)
    }
}

impl Eq for Table {}

impl Hash for Table {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        for column in &self.columns {
            column.name.hash(state);
            column.ty.hash(state);
        }
        self.constraints.hash(state);
    }
}

/// An index over an ordered subset of one table's columns.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Index {
    table: String,
    columns: Vec<Column>,
    unique: bool,
}

impl Index {
    /// Index `columns` of `table`. Every column must belong to the table.
    pub fn new(table: &Table, columns: &[&str]) -> Result<Self> {
        let missing: Vec<String> = columns
            .iter()
            .filter(|c| !table.has_column(c))
            .map(|c| format!("{}.{c}", table.name()))
            .collect();
        if !missing.is_empty() {
            return Err(SqlError::ColumnNotFound { columns: missing });
        }
        if columns.is_empty() {
            return Err(SqlError::MalformedExpression(format!(
                "index on {} has no columns",
                table.name()
            )));
        }
        Ok(Self {
            table: table.name().to_owned(),
            columns: columns
                .iter()
                .filter_map(|c| table.get(c).cloned())
                .collect(),
            unique: false,
        })
    }

    /// Make this a `UNIQUE` index.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Derived name: `idx_<table>_<col>_<col>...`.
    pub fn name(&self) -> String {
        let mut name = format!("idx_{}", self.table);
        for column in &self.columns {
            name.push('_');
            name.push_str(column.name());
        }
        name
    }

    /// Owning table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Indexed columns in order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Whether the index is unique.
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// `name ON table (cols)`, the body of `CREATE INDEX`.
    pub fn definition(&self) -> Result<String> {
        let names: Vec<String> = self.columns.iter().map(|c| c.name().to_owned()).collect();
        Ok(format!(
            "{} ON {} {}",
            check_identifier(&self.name())?,
            check_identifier(&self.table)?,
            ident_list(&names)?
        ))
    }

    /// Full `CREATE [UNIQUE] INDEX` statement text.
    pub fn create_sql(&self) -> Result<String> {
        let keyword = if self.unique {
            "CREATE UNIQUE INDEX"
        } else {
            "CREATE INDEX"
        };
        Ok(format!("{keyword} {}", self.definition()?))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn tree() -> Table {
        Table::new("Tree")
            .column("parent", ColumnType::Integer)
            .column("node_id", ColumnType::Integer)
            .column("name", ColumnType::Text)
            .primary_key(&["node_id"])
    }

    #[test]
    fn create_sql_keeps_column_order() {
        assert_eq!(
            tree().create_sql().unwrap(),
            "CREATE TABLE Tree (parent INTEGER, node_id INTEGER, name TEXT, PRIMARY KEY (node_id))"
        );
    }

    #[test]
    fn columns_know_their_table() {
        let table = tree();
        let col = table.col("name").unwrap();
        assert_eq!(col.table(), Some("Tree"));
        assert_eq!(col.to_string(), "Tree.name");
    }

    #[test]
    fn column_identity_ignores_type() {
        let a = Column::new("x", ColumnType::Integer).in_table("T");
        let b = Column::new("x", ColumnType::Text).in_table("T");
        assert_eq!(a, b);
        assert_ne!(a, Column::new("x", ColumnType::Integer));
    }

    #[test]
    fn table_equality_is_type_aware() {
        let a = Table::new("T").column("x", ColumnType::Integer);
        let b = Table::new("T").column("x", ColumnType::Text);
        assert_ne!(a, b);
    }

    #[test]
    fn missing_column_lookup() {
        assert_matches!(
            tree().col("nope"),
            Err(SqlError::ColumnNotFound { columns }) if columns == ["Tree.nope"]
        );
    }

    #[test]
    fn constraint_on_unknown_column_fails() {
        let table = Table::new("T")
            .column("a", ColumnType::Integer)
            .unique(&["b"]);
        assert_matches!(table.create_sql(), Err(SqlError::ColumnNotFound { .. }));
    }

    #[test]
    fn bad_identifier_rejected() {
        let table = Table::new("T; DROP TABLE x").column("a", ColumnType::Integer);
        assert_matches!(table.create_sql(), Err(SqlError::MalformedExpression(_)));
        assert!(check_identifier("_ok9").is_ok());
        assert!(check_identifier("9no").is_err());
        assert!(check_identifier("").is_err());
    }

    #[test]
    fn varchar_and_foreign_key_render() {
        let table = Table::new("Snp")
            .column("node_id", ColumnType::Integer)
            .column("name", ColumnType::Varchar(32))
            .foreign_key(&["node_id"], "Tree", &["node_id"]);
        assert_eq!(
            table.create_sql().unwrap(),
            "CREATE TABLE Snp (node_id INTEGER, name VARCHAR(32), FOREIGN KEY (node_id) REFERENCES Tree (node_id))"
        );
    }

    #[test]
    fn index_name_is_derived() {
        let index = Index::new(&tree(), &["parent", "name"]).unwrap();
        assert_eq!(index.name(), "idx_Tree_parent_name");
        assert_eq!(
            index.create_sql().unwrap(),
            "CREATE INDEX idx_Tree_parent_name ON Tree (parent, name)"
        );
        assert_eq!(
            index.unique().create_sql().unwrap(),
            "CREATE UNIQUE INDEX idx_Tree_parent_name ON Tree (parent, name)"
        );
    }

    #[test]
    fn index_on_unknown_column_fails() {
        assert_matches!(
            Index::new(&tree(), &["missing"]),
            Err(SqlError::ColumnNotFound { columns }) if columns == ["Tree.missing"]
        );
    }
}
