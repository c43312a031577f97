//! Predicates and assignments.
//!
//! Right-hand sides are a closed set ([`Rhs`]); literal values only ever
//! render as `?` placeholders.

use crate::schema::Column;
use crate::value::SqlValue;

/// Comparison operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `LIKE`
    Like,
    /// `IN (...)`
    In,
    /// `IS NULL`
    IsNull,
    /// `IS NOT NULL`
    IsNotNull,
}

impl CompareOp {
    /// SQL operator text.
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Like => "LIKE",
            Self::In => "IN",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
        }
    }
}

/// Right-hand side of a comparison.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Rhs {
    /// A single bound value.
    Value(SqlValue),
    /// Another column.
    Column(Column),
    /// A list of bound values, for `IN`.
    List(Vec<SqlValue>),
    /// No operand (`IS NULL` / `IS NOT NULL`).
    None,
}

/// `(column, operator, rhs)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Comparison {
    /// Left-hand column.
    pub column: Column,
    /// Operator.
    pub op: CompareOp,
    /// Right-hand operand.
    pub rhs: Rhs,
}

impl Comparison {
    /// Build a comparison against a bound value.
    pub fn new(column: &Column, op: CompareOp, value: impl Into<SqlValue>) -> Self {
        Self {
            column: column.clone(),
            op,
            rhs: Rhs::Value(value.into()),
        }
    }
}

/// Comparison builders hanging off a column.
pub trait ColumnExt {
    /// `col = ?`
    fn equals(&self, value: impl Into<SqlValue>) -> Comparison;
    /// `col != ?`
    fn not_equals(&self, value: impl Into<SqlValue>) -> Comparison;
    /// `col < ?`
    fn lt(&self, value: impl Into<SqlValue>) -> Comparison;
    /// `col <= ?`
    fn le(&self, value: impl Into<SqlValue>) -> Comparison;
    /// `col > ?`
    fn gt(&self, value: impl Into<SqlValue>) -> Comparison;
    /// `col >= ?`
    fn ge(&self, value: impl Into<SqlValue>) -> Comparison;
    /// `col LIKE ?`
    fn like(&self, pattern: impl Into<SqlValue>) -> Comparison;
    /// `col IN (?, ?, ...)`
    fn is_in<I, V>(&self, values: I) -> Comparison
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>;
    /// `col IS NULL`
    fn is_null(&self) -> Comparison;
    /// `col IS NOT NULL`
    fn is_not_null(&self) -> Comparison;
    /// `col = other`
    fn eq_col(&self, other: &Column) -> Comparison;
    /// `col = ?` in a `SET` clause.
    fn set(&self, value: impl Into<SqlValue>) -> Assignment;
}

impl ColumnExt for Column {
    fn equals(&self, value: impl Into<SqlValue>) -> Comparison {
        Comparison::new(self, CompareOp::Eq, value)
    }

    fn not_equals(&self, value: impl Into<SqlValue>) -> Comparison {
        Comparison::new(self, CompareOp::Ne, value)
    }

    fn lt(&self, value: impl Into<SqlValue>) -> Comparison {
        Comparison::new(self, CompareOp::Lt, value)
    }

    fn le(&self, value: impl Into<SqlValue>) -> Comparison {
        Comparison::new(self, CompareOp::Le, value)
    }

    fn gt(&self, value: impl Into<SqlValue>) -> Comparison {
        Comparison::new(self, CompareOp::Gt, value)
    }

    fn ge(&self, value: impl Into<SqlValue>) -> Comparison {
        Comparison::new(self, CompareOp::Ge, value)
    }

    fn like(&self, pattern: impl Into<SqlValue>) -> Comparison {
        Comparison::new(self, CompareOp::Like, pattern)
    }

    fn is_in<I, V>(&self, values: I) -> Comparison
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        Comparison {
            column: self.clone(),
            op: CompareOp::In,
            rhs: Rhs::List(values.into_iter().map(Into::into).collect()),
        }
    }

    fn is_null(&self) -> Comparison {
        Comparison {
            column: self.clone(),
            op: CompareOp::IsNull,
            rhs: Rhs::None,
        }
    }

    fn is_not_null(&self) -> Comparison {
        Comparison {
            column: self.clone(),
            op: CompareOp::IsNotNull,
            rhs: Rhs::None,
        }
    }

    fn eq_col(&self, other: &Column) -> Comparison {
        Comparison {
            column: self.clone(),
            op: CompareOp::Eq,
            rhs: Rhs::Column(other.clone()),
        }
    }

    fn set(&self, value: impl Into<SqlValue>) -> Assignment {
        Assignment {
            column: self.clone(),
            value: value.into(),
        }
    }
}

/// `column = ?` inside `SET`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Assignment {
    /// Target column.
    pub column: Column,
    /// Bound value.
    pub value: SqlValue,
}

/// `ORDER BY` direction. Always explicit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// `ASC`
    Asc,
    /// `DESC`
    Desc,
}

impl Direction {
    /// SQL keyword.
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}
