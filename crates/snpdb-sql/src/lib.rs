//! # snpdb-sql
//!
//! Schema primitives and a composable query DSL for the SNP database.
//!
//! - **Primitives**: [`Column`], [`Table`], [`Index`], [`Comparison`],
//!   [`Assignment`] and the literal wrapper [`SqlValue`]
//! - **DSL**: [`Word`] clauses composed into immutable [`Query`] values that
//!   serialize to a [`Statement`] (`?` placeholders plus ordered params)
//! - **Cache**: [`SqlCache`] memoizes serialization per structural value
//! - **Join inference**: greedy table cover and BFS join paths over a
//!   [`Catalog`] in declared order
//!
//! Nothing here performs I/O; the store crate executes the statements.

#![deny(unsafe_code)]

pub mod cache;
pub mod catalog;
pub mod error;
pub mod expr;
pub mod join;
pub mod query;
pub mod schema;
pub mod value;
pub mod word;

pub use cache::SqlCache;
pub use catalog::{Catalog, CatalogBuilder};
pub use error::{Result, SqlError};
pub use expr::{Assignment, ColumnExt, CompareOp, Comparison, Direction, Rhs};
pub use join::{JoinHop, JoinPlan, JoinResolver, covering_tables, join_plan, shortest_join_path};
pub use query::{Query, STATEMENT_KEYWORDS, Statement};
pub use schema::{Column, ColumnType, Constraint, Index, Table, check_identifier};
pub use value::SqlValue;
pub use word::{Operand, SqlWriter, Word};
