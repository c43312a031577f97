//! Clause-level building blocks.
//!
//! A [`Word`] is one SQL clause: a keyword, an ordered operand tuple and the
//! separator between operands. Its text is `"<KEYWORD> <op><sep><op>..."`.
//! Operands are a closed tagged union ([`Operand`]) and render exhaustively;
//! every literal becomes exactly one `?` placeholder, appended to the
//! parameter list in left-to-right order.

use crate::error::{Result, SqlError};
use crate::expr::{Assignment, CompareOp, Comparison, Direction, Rhs};
use crate::schema::{Column, Index, Table, check_identifier};
use crate::value::SqlValue;

/// Accumulates SQL text and bound parameters during serialization.
#[derive(Debug, Default)]
pub struct SqlWriter {
    sql: String,
    params: Vec<SqlValue>,
}

impl SqlWriter {
    /// Empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    fn bind(&mut self, value: &SqlValue) {
        self.sql.push('?');
        self.params.push(value.clone());
    }

    fn ident(&mut self, name: &str) -> Result<()> {
        self.push(check_identifier(name)?);
        Ok(())
    }

    fn qualified(&mut self, column: &Column) -> Result<()> {
        if let Some(table) = column.table() {
            self.ident(table)?;
            self.push(".");
        }
        self.ident(column.name())
    }

    fn bind_list(&mut self, values: &[SqlValue]) {
        self.push("(");
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.bind(value);
        }
        self.push(")");
    }

    fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    /// Finish, returning `(sql, params)`.
    pub fn finish(self) -> (String, Vec<SqlValue>) {
        (self.sql, self.params)
    }
}

/// One operand of a [`Word`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operand {
    /// Column reference, table-qualified when the column has an owner.
    Column(Column),
    /// Column name only (INSERT lists, `SET`, `USING`).
    BareColumn(Column),
    /// Table name.
    Table(Table),
    /// Raw identifier (temp tables, live objects read from the schema).
    Name(String),
    /// `name (col TYPE, ..., constraints)`.
    TableDef(Table),
    /// `name ON table (cols)`.
    IndexDef(Index),
    /// `(a, b, c)`, bare column names.
    ColumnList(Vec<Column>),
    /// `(?, ?, ?)`.
    Values(Vec<SqlValue>),
    /// `?`.
    Value(SqlValue),
    /// `col <op> rhs`.
    Comparison(Comparison),
    /// `col = ?`.
    Assignment(Assignment),
    /// `col ASC|DESC`.
    Ordering(Column, Direction),
    /// `table USING (col)`.
    Using(Table, Column),
    /// `*`.
    Star,
    /// `COUNT(*)`.
    CountAll,
    /// `name = <integer literal>` for PRAGMA assignment (pragmas cannot bind).
    PragmaValue(String, i64),
}

impl Operand {
    fn render(&self, out: &mut SqlWriter) -> Result<()> {
        match self {
            Self::Column(column) => out.qualified(column),
            Self::BareColumn(column) => out.ident(column.name()),
            Self::Table(table) => out.ident(table.name()),
            Self::Name(name) => out.ident(name),
            Self::TableDef(table) => {
                out.push(&table.definition()?);
                Ok(())
            }
            Self::IndexDef(index) => {
                out.push(&index.definition()?);
                Ok(())
            }
            Self::ColumnList(columns) => {
                if columns.is_empty() {
                    return Err(SqlError::MalformedExpression(
                        "empty column list".to_owned(),
                    ));
                }
                out.push("(");
                for (i, column) in columns.iter().enumerate() {
                    if i > 0 {
                        out.push(", ");
                    }
                    out.ident(column.name())?;
                }
                out.push(")");
                Ok(())
            }
            Self::Values(values) => {
                if values.is_empty() {
                    return Err(SqlError::MalformedExpression(
                        "empty value tuple".to_owned(),
                    ));
                }
                out.bind_list(values);
                Ok(())
            }
            Self::Value(value) => {
                out.bind(value);
                Ok(())
            }
            Self::Comparison(comparison) => render_comparison(comparison, out),
            Self::Assignment(assignment) => {
                out.ident(assignment.column.name())?;
                out.push(" = ");
                out.bind(&assignment.value);
                Ok(())
            }
            Self::Ordering(column, direction) => {
                out.qualified(column)?;
                out.push(" ");
                out.push(direction.as_sql());
                Ok(())
            }
            Self::Using(table, column) => {
                out.ident(table.name())?;
                out.push(" USING (");
                out.ident(column.name())?;
                out.push(")");
                Ok(())
            }
            Self::Star => {
                out.push("*");
                Ok(())
            }
            Self::CountAll => {
                out.push("COUNT(*)");
                Ok(())
            }
            Self::PragmaValue(name, value) => {
                out.ident(name)?;
                out.push(&format!(" = {value}"));
                Ok(())
            }
        }
    }
}

fn render_comparison(comparison: &Comparison, out: &mut SqlWriter) -> Result<()> {
    let Comparison { column, op, rhs } = comparison;
    out.qualified(column)?;
    out.push(" ");
    out.push(op.as_sql());
    match (op, rhs) {
        (CompareOp::IsNull | CompareOp::IsNotNull, Rhs::None) => Ok(()),
        (CompareOp::In, Rhs::List(values)) if !values.is_empty() => {
            out.push(" ");
            out.bind_list(values);
            Ok(())
        }
        (CompareOp::In, Rhs::List(_)) => Err(SqlError::MalformedExpression(format!(
            "{column} IN with an empty list"
        ))),
        (
            CompareOp::Eq
            | CompareOp::Ne
            | CompareOp::Lt
            | CompareOp::Le
            | CompareOp::Gt
            | CompareOp::Ge
            | CompareOp::Like,
            Rhs::Value(value),
        ) => {
            out.push(" ");
            out.bind(value);
            Ok(())
        }
        (
            CompareOp::Eq
            | CompareOp::Ne
            | CompareOp::Lt
            | CompareOp::Le
            | CompareOp::Gt
            | CompareOp::Ge,
            Rhs::Column(other),
        ) => {
            out.push(" ");
            out.qualified(other)
        }
        (op, rhs) => Err(SqlError::MalformedExpression(format!(
            "{column} {} cannot take {rhs:?}",
            op.as_sql()
        ))),
    }
}

/// A named clause: keyword, ordered operands, separator.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Word {
    keyword: &'static str,
    operands: Vec<Operand>,
    separator: &'static str,
}

impl Word {
    /// Clause `keyword` with `operands` joined by `separator`.
    pub fn new(keyword: &'static str, separator: &'static str, operands: Vec<Operand>) -> Self {
        Self {
            keyword,
            operands,
            separator,
        }
    }

    /// Expand `(column, value)` pairs into `=` comparisons joined by `AND`.
    pub fn equals<I, V>(keyword: &'static str, pairs: I) -> Self
    where
        I: IntoIterator<Item = (Column, V)>,
        V: Into<SqlValue>,
    {
        let operands = pairs
            .into_iter()
            .map(|(column, value)| {
                Operand::Comparison(Comparison::new(&column, CompareOp::Eq, value))
            })
            .collect();
        Self::new(keyword, " AND ", operands)
    }

    /// Append one more operand.
    #[must_use]
    pub fn with(mut self, operand: Operand) -> Self {
        self.operands.push(operand);
        self
    }

    /// Leading keyword text.
    pub fn keyword_text(&self) -> &'static str {
        self.keyword
    }

    /// Operands in order.
    pub fn operands(&self) -> &[Operand] {
        &self.operands
    }

    /// Render into `out`, preceded by a space when `out` already has text.
    pub fn render(&self, out: &mut SqlWriter) -> Result<()> {
        if !out.is_empty() {
            out.push(" ");
        }
        out.push(self.keyword);
        for (i, operand) in self.operands.iter().enumerate() {
            out.push(if i == 0 { " " } else { self.separator });
            operand.render(out)?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
