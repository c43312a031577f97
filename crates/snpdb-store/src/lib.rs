//! # snpdb-store
//!
//! Self-healing `SQLite` storage for the SNP database.
//!
//! - **Multiplexer**: one worker thread per canonical file path owns the
//!   connection; callers hold [`MuxHandle`]s and get FIFO execution
//! - **Schema**: live DDL is fingerprinted and checked by ordered
//!   [`Assertion`]s whose rectify plans migrate it to the [`Catalog`]
//! - **Façade**: [`Database`] binds a handle to its catalog; dependencies
//!   such as the shared [`SqlCache`] arrive through a [`StoreContext`]
//!
//! ```no_run
//! use std::sync::Arc;
//! use snpdb_store::{Database, OpenMode, StoreContext, phylo};
//!
//! let ctx = StoreContext::new(Arc::new(phylo::catalog()?));
//! let db = Database::open("snps.db", OpenMode::Write, ctx)?;
//! db.validate(true)?;
//! # Ok::<(), snpdb_store::StoreError>(())
//! ```
//!
//! [`Catalog`]: snpdb_sql::Catalog
//! [`SqlCache`]: snpdb_sql::SqlCache

#![deny(unsafe_code)]

pub mod config;
pub mod database;
pub mod error;
pub mod mux;
pub mod phylo;
pub mod schema;

pub use config::StoreConfig;
pub use database::{Database, StoreContext};
pub use error::{Result, SchemaError, StoreError};
pub use mux::{Multiplexer, MuxHandle, OpenMode, ResultSet};
pub use schema::{Assertion, AssertionEngine, SchemaSnapshot, SchemaState};
