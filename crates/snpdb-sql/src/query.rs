//! Immutable, composable statements.
//!
//! A [`Query`] is a flat sequence of [`Word`]s. Builder methods consume and
//! return the query, and concatenation flattens, so `(a + b) + c` and
//! `a + (b + c)` are the same value and serialize to the same
//! `(sql, params)`.
//!
//! ```no_run
//! use snpdb_sql::{ColumnExt, ColumnType, Query, Table};
//!
//! let tree = Table::new("Tree")
//!     .column("node_id", ColumnType::Integer)
//!     .column("name", ColumnType::Text);
//! let stmt = Query::select([tree.col("node_id")?.clone()])
//!     .from([&tree])
//!     .filter([tree.col("name")?.equals("root")])
//!     .to_statement()?;
//! assert_eq!(stmt.sql, "SELECT Tree.node_id FROM Tree WHERE Tree.name = ?");
//! # Ok::<(), snpdb_sql::SqlError>(())
//! ```

use std::ops::Add;

use crate::error::{Result, SqlError};
use crate::expr::{Assignment, Comparison, Direction};
use crate::join::JoinHop;
use crate::schema::{Column, Index, Table};
use crate::value::SqlValue;
use crate::word::{Operand, SqlWriter, Word};

/// Keywords a query may start with.
pub const STATEMENT_KEYWORDS: &[&str] = &[
    "SELECT",
    "INSERT INTO",
    "UPDATE",
    "CREATE TABLE",
    "CREATE INDEX",
    "CREATE UNIQUE INDEX",
    "ALTER TABLE",
    "DROP TABLE",
    "DROP INDEX",
    "PRAGMA",
];

/// Serialized SQL plus its ordered parameters.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Statement {
    /// SQL text with `?` placeholders.
    pub sql: String,
    /// One value per placeholder, in order.
    pub params: Vec<SqlValue>,
}

impl Statement {
    /// A statement with no parameters.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }
}

/// An ordered sequence of clauses.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Query {
    words: Vec<Word>,
}

impl Query {
    /// The empty query. Serializing it fails; it exists as a fold seed.
    pub fn new() -> Self {
        Self::default()
    }

    /// A query made of a single word.
    pub fn word(word: Word) -> Self {
        Self { words: vec![word] }
    }

    /// Append a word.
    #[must_use]
    pub fn push(mut self, word: Word) -> Self {
        self.words.push(word);
        self
    }

    /// Append every word of `other`.
    #[must_use]
    pub fn then(mut self, other: Query) -> Self {
        self.words.extend(other.words);
        self
    }

    /// Words in order.
    pub fn words(&self) -> &[Word] {
        &self.words
    }

    /// Leading keyword, if any.
    pub fn leading_keyword(&self) -> Option<&'static str> {
        self.words.first().map(Word::keyword_text)
    }

    /// Serialize to SQL text and parameters.
    pub fn to_statement(&self) -> Result<Statement> {
        let Some(keyword) = self.leading_keyword() else {
            return Err(SqlError::MalformedQuery("empty query".to_owned()));
        };
        if !STATEMENT_KEYWORDS.contains(&keyword) {
            return Err(SqlError::MalformedQuery(format!(
                "query must start with a statement keyword, found {keyword:?}"
            )));
        }
        let mut out = SqlWriter::new();
        for word in &self.words {
            word.render(&mut out)?;
        }
        let (sql, params) = out.finish();
        Ok(Statement { sql, params })
    }

    // ── Statement starters ──────────────────────────────────────────────

    /// `SELECT col, col, ...`
    pub fn select<I: IntoIterator<Item = Column>>(columns: I) -> Self {
        Self::word(Word::new(
            "SELECT",
            ", ",
            columns.into_iter().map(Operand::Column).collect(),
        ))
    }

    /// `SELECT *`
    pub fn select_all() -> Self {
        Self::word(Word::new("SELECT", ", ", vec![Operand::Star]))
    }

    /// `SELECT COUNT(*)`
    pub fn count() -> Self {
        Self::word(Word::new("SELECT", ", ", vec![Operand::CountAll]))
    }

    /// `INSERT INTO table (cols)`; follow with [`Query::values`].
    pub fn insert_into(table: &Table) -> Self {
        Self::word(Word::new(
            "INSERT INTO",
            " ",
            vec![
                Operand::Table(table.clone()),
                Operand::ColumnList(table.columns().to_vec()),
            ],
        ))
    }

    /// `INSERT INTO name` with no column list; follow with a `SELECT`.
    pub fn insert_into_name(name: &str) -> Self {
        Self::word(Word::new(
            "INSERT INTO",
            " ",
            vec![Operand::Name(name.to_owned())],
        ))
    }

    /// `UPDATE table`; follow with [`Query::set`].
    pub fn update(table: &Table) -> Self {
        Self::word(Word::new(
            "UPDATE",
            ", ",
            vec![Operand::Table(table.clone())],
        ))
    }

    /// `CREATE TABLE name (...)`
    pub fn create_table(table: &Table) -> Self {
        Self::word(Word::new(
            "CREATE TABLE",
            ", ",
            vec![Operand::TableDef(table.clone())],
        ))
    }

    /// `CREATE [UNIQUE] INDEX name ON table (...)`
    pub fn create_index(index: &Index) -> Self {
        let keyword = if index.is_unique() {
            "CREATE UNIQUE INDEX"
        } else {
            "CREATE INDEX"
        };
        Self::word(Word::new(
            keyword,
            ", ",
            vec![Operand::IndexDef(index.clone())],
        ))
    }

    /// `ALTER TABLE from RENAME TO to`
    pub fn alter_table_rename(from: &str, to: &str) -> Self {
        Self::word(Word::new(
            "ALTER TABLE",
            ", ",
            vec![Operand::Name(from.to_owned())],
        ))
        .push(Word::new(
            "RENAME TO",
            ", ",
            vec![Operand::Name(to.to_owned())],
        ))
    }

    /// `DROP TABLE name`
    pub fn drop_table(name: &str) -> Self {
        Self::word(Word::new(
            "DROP TABLE",
            ", ",
            vec![Operand::Name(name.to_owned())],
        ))
    }

    /// `DROP INDEX name`
    pub fn drop_index(name: &str) -> Self {
        Self::word(Word::new(
            "DROP INDEX",
            ", ",
            vec![Operand::Name(name.to_owned())],
        ))
    }

    /// `PRAGMA name` (read)
    pub fn pragma(name: &str) -> Self {
        Self::word(Word::new(
            "PRAGMA",
            ", ",
            vec![Operand::Name(name.to_owned())],
        ))
    }

    /// `PRAGMA name = value` (write)
    pub fn pragma_set(name: &str, value: i64) -> Self {
        Self::word(Word::new(
            "PRAGMA",
            ", ",
            vec![Operand::PragmaValue(name.to_owned(), value)],
        ))
    }

    // ── Clauses ─────────────────────────────────────────────────────────

    /// `FROM table, table, ...`
    #[must_use]
    pub fn from<'a, I: IntoIterator<Item = &'a Table>>(self, tables: I) -> Self {
        self.push(Word::new(
            "FROM",
            ", ",
            tables.into_iter().cloned().map(Operand::Table).collect(),
        ))
    }

    /// `FROM name` for tables outside the catalog.
    #[must_use]
    pub fn from_name(self, name: &str) -> Self {
        self.push(Word::new(
            "FROM",
            ", ",
            vec![Operand::Name(name.to_owned())],
        ))
    }

    /// `JOIN table USING (col)` for each hop, in order.
    #[must_use]
    pub fn join<'a, I: IntoIterator<Item = &'a JoinHop>>(self, hops: I) -> Self {
        hops.into_iter().fold(self, |query, hop| {
            query.push(Word::new(
                "JOIN",
                ", ",
                vec![Operand::Using(hop.table.clone(), hop.column.clone())],
            ))
        })
    }

    /// `WHERE a AND b AND ...`; omitted entirely when there are no comparisons.
    #[must_use]
    pub fn filter<I: IntoIterator<Item = Comparison>>(self, comparisons: I) -> Self {
        let operands: Vec<Operand> = comparisons.into_iter().map(Operand::Comparison).collect();
        if operands.is_empty() {
            return self;
        }
        self.push(Word::new("WHERE", " AND ", operands))
    }

    /// `SET col = ?, ...`
    #[must_use]
    pub fn set<I: IntoIterator<Item = Assignment>>(self, assignments: I) -> Self {
        self.push(Word::new(
            "SET",
            ", ",
            assignments.into_iter().map(Operand::Assignment).collect(),
        ))
    }

    /// `VALUES (?, ?, ...)`
    #[must_use]
    pub fn values<I, V>(self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        self.push(Word::new(
            "VALUES",
            ", ",
            vec![Operand::Values(values.into_iter().map(Into::into).collect())],
        ))
    }

    /// `ORDER BY col DIR`. The direction is always explicit.
    #[must_use]
    pub fn order_by(self, column: &Column, direction: Direction) -> Self {
        self.push(Word::new(
            "ORDER BY",
            ", ",
            vec![Operand::Ordering(column.clone(), direction)],
        ))
    }

    /// `LIMIT ?`
    #[must_use]
    pub fn limit(self, limit: i64) -> Self {
        self.push(Word::new(
            "LIMIT",
            ", ",
            vec![Operand::Value(SqlValue::Integer(limit))],
        ))
    }
}

impl From<Word> for Query {
    fn from(word: Word) -> Self {
        Self::word(word)
    }
}

impl Add for Query {
    type Output = Query;

    fn add(self, rhs: Query) -> Query {
        self.then(rhs)
    }
}

impl Add<Word> for Query {
    type Output = Query;

    fn add(self, rhs: Word) -> Query {
        self.push(rhs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
