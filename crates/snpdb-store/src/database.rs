//! Per-session façade over one database file.
//!
//! A [`Database`] binds a multiplexer handle to a catalog. Besides schema
//! checks and repair it offers the row-level helpers loaders use, so they
//! never build SQL text themselves.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use snpdb_sql::{Catalog, Column, Comparison, Operand, Query, SqlCache, SqlError, SqlValue, Statement};
use tracing::{Span, debug, info, info_span};

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::mux::{Multiplexer, MuxHandle, OpenMode, ResultSet};
use crate::schema::snapshot::user_version_query;
use crate::schema::{AssertionEngine, SchemaSnapshot, SchemaState};

/// Everything a [`Database`] depends on, passed explicitly.
#[derive(Clone, Debug)]
pub struct StoreContext {
    /// Expected schema.
    pub catalog: Arc<Catalog>,
    /// Shared serialization cache.
    pub cache: Arc<SqlCache>,
    /// Worker registry.
    pub mux: Arc<Multiplexer>,
    /// Connection settings.
    pub config: StoreConfig,
}

impl StoreContext {
    /// Context on the global multiplexer with environment-derived config.
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            cache: Arc::new(SqlCache::new()),
            mux: Multiplexer::global(),
            config: StoreConfig::from_env(),
        }
    }

    /// Replace the multiplexer.
    #[must_use]
    pub fn with_mux(mut self, mux: Arc<Multiplexer>) -> Self {
        self.mux = mux;
        self
    }

    /// Replace the serialization cache.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<SqlCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Replace the config.
    #[must_use]
    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }
}

/// An open database file governed by a catalog.
pub struct Database {
    handle: MuxHandle,
    ctx: StoreContext,
    engine: AssertionEngine,
    state: Mutex<SchemaState>,
    span: Span,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.handle.path())
            .field("mode", &self.handle.mode())
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Open `path` in `mode`.
    ///
    /// Read mode requires the file to exist; write mode creates it.
    pub fn open(path: impl AsRef<Path>, mode: OpenMode, ctx: StoreContext) -> Result<Self> {
        let path = path.as_ref();
        let engine = AssertionEngine::new(Arc::clone(&ctx.catalog))?;
        let handle = ctx.mux.open(path, mode, &ctx.config)?;
        let span = info_span!("snpdb.database", path = %handle.path().display(), mode = %mode);
        span.in_scope(|| info!(handle = %handle.id(), "database opened"));
        Ok(Self {
            handle,
            ctx,
            engine,
            state: Mutex::new(SchemaState::Unknown),
            span,
        })
    }

    /// Open with a textual mode, `"r"` or `"w"`.
    pub fn open_with(path: impl AsRef<Path>, mode: &str, ctx: StoreContext) -> Result<Self> {
        Self::open(path, mode.parse()?, ctx)
    }

    /// Canonical path of the file.
    pub fn path(&self) -> &Path {
        self.handle.path()
    }

    /// Mode the file was opened in.
    pub fn mode(&self) -> OpenMode {
        self.handle.mode()
    }

    /// Catalog the schema is checked against.
    pub fn catalog(&self) -> &Catalog {
        &self.ctx.catalog
    }

    /// State from the last check or fix, `Unknown` before either.
    pub fn state(&self) -> SchemaState {
        *self.state.lock()
    }

    fn remember(&self, state: SchemaState) -> SchemaState {
        *self.state.lock() = state;
        state
    }

    /// Live schema objects.
    pub fn snapshot(&self) -> Result<SchemaSnapshot> {
        let _enter = self.span.enter();
        SchemaSnapshot::read(&self.handle, &self.ctx.cache)
    }

    /// Classify the live schema.
    ///
    /// A `user_version` equal to a non-zero catalog version is trusted
    /// without reading the schema.
    pub fn check_schema_state(&self) -> Result<SchemaState> {
        let _enter = self.span.enter();
        let catalog_version = i64::from(self.ctx.catalog.version());
        let stamped = self
            .run(&*self.ctx.cache.statement(&user_version_query())?)?
            .scalar()
            .and_then(SqlValue::as_i64)
            .unwrap_or(0);
        let state = if catalog_version != 0 && stamped == catalog_version {
            debug!(version = stamped, "schema version matches, skipping full check");
            SchemaState::Valid
        } else {
            self.engine
                .evaluate(&SchemaSnapshot::read(&self.handle, &self.ctx.cache)?)
        };
        debug!(state = %state, "schema state checked");
        Ok(self.remember(state))
    }

    /// Rectify the schema until it matches the catalog.
    ///
    /// Read-only databases cannot be fixed; an invalid one yields
    /// [`StoreError::ReadOnly`].
    pub fn fix(&self) -> Result<SchemaState> {
        let _enter = self.span.enter();
        if self.mode() == OpenMode::Read {
            let state = self
                .engine
                .evaluate(&SchemaSnapshot::read(&self.handle, &self.ctx.cache)?);
            self.remember(state);
            return if state.is_valid() {
                Ok(state)
            } else {
                Err(StoreError::ReadOnly)
            };
        }
        let state = self.engine.fix(&self.handle, &self.ctx.cache)?;
        info!(state = %state, "schema fixed");
        Ok(self.remember(state))
    }

    /// Check the schema, rectifying when `rectify` is set.
    ///
    /// Without `rectify`, an invalid schema is reported as its
    /// [`SchemaError`](crate::SchemaError).
    pub fn validate(&self, rectify: bool) -> Result<SchemaState> {
        let state = self.check_schema_state()?;
        if state.is_valid() {
            return Ok(state);
        }
        if rectify {
            return self.fix();
        }
        let _enter = self.span.enter();
        self.engine.check(&SchemaSnapshot::read(&self.handle, &self.ctx.cache)?)?;
        Ok(self.remember(SchemaState::Valid))
    }

    /// Run `query` and return its rows.
    pub fn execute(&self, query: &Query) -> Result<ResultSet> {
        let _enter = self.span.enter();
        self.guard(query)?;
        self.run(&*self.ctx.cache.statement(query)?)
    }

    /// First column of every row of `query`.
    pub fn query_column(&self, query: &Query) -> Result<Vec<SqlValue>> {
        Ok(self.execute(query)?.first_column())
    }

    /// Select `columns` matching every filter, joining tables as needed.
    pub fn select(&self, columns: &[Column], filters: Vec<Comparison>) -> Result<ResultSet> {
        let query = self.ctx.catalog.select(columns, filters)?;
        self.execute(&query)
    }

    /// Insert one row into `table`, values in column order.
    pub fn add_row(&self, table: &str, values: Vec<SqlValue>) -> Result<()> {
        let _enter = self.span.enter();
        let statement = self.insert_statement(table, values)?;
        self.require_write()?;
        let _ = self.run(&statement)?;
        Ok(())
    }

    /// Insert many rows into `table` in one transaction.
    pub fn add_rows<I>(&self, table: &str, rows: I) -> Result<usize>
    where
        I: IntoIterator<Item = Vec<SqlValue>>,
    {
        let _enter = self.span.enter();
        let statements = rows
            .into_iter()
            .map(|values| self.insert_statement(table, values))
            .collect::<Result<Vec<_>>>()?;
        self.require_write()?;
        let count = statements.len();
        let _ = self.handle.transaction(statements)?;
        debug!(table, rows = count, "rows added");
        Ok(count)
    }

    /// Number of rows in `table`.
    pub fn count(&self, table: &str) -> Result<i64> {
        let table = self.ctx.catalog.require_table(table)?;
        let rows = self.execute(&Query::count().from([table]))?;
        Ok(rows.scalar().and_then(SqlValue::as_i64).unwrap_or(0))
    }

    /// Release this session's handle.
    pub fn close(self) {
        self.span
            .in_scope(|| info!(handle = %self.handle.id(), "database closed"));
        self.handle.close();
    }

    fn insert_statement(&self, table: &str, values: Vec<SqlValue>) -> Result<Statement> {
        let table = self.ctx.catalog.require_table(table)?;
        if values.len() != table.columns().len() {
            return Err(SqlError::MalformedExpression(format!(
                "{} has {} columns, got {} values",
                table.name(),
                table.columns().len(),
                values.len()
            ))
            .into());
        }
        Ok(Query::insert_into(table).values(values).to_statement()?)
    }

    fn run(&self, statement: &Statement) -> Result<ResultSet> {
        self.handle.execute(statement)
    }

    fn require_write(&self) -> Result<()> {
        match self.mode() {
            OpenMode::Write => Ok(()),
            OpenMode::Read => Err(StoreError::ReadOnly),
        }
    }

    fn guard(&self, query: &Query) -> Result<()> {
        if self.mode() == OpenMode::Read && !is_read_only(query) {
            return Err(StoreError::ReadOnly);
        }
        Ok(())
    }
}

/// `SELECT`, or a `PRAGMA` that reads rather than assigns.
fn is_read_only(query: &Query) -> bool {
    match query.leading_keyword() {
        Some("SELECT") => true,
        Some("PRAGMA") => query
            .words()
            .first()
            .is_some_and(|pragma| matches!(pragma.operands(), [Operand::Name(_)])),
        _ => false,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_only_classification() {
        assert!(is_read_only(&Query::select_all().from_name("Tree")));
        assert!(is_read_only(&Query::pragma("user_version")));
        assert!(!is_read_only(&Query::pragma_set("user_version", 2)));
        assert!(!is_read_only(&Query::drop_table("Tree")));
        assert!(!is_read_only(&Query::new()));
    }

    #[test]
    fn context_builders_replace_parts() {
        let catalog = Arc::new(Catalog::builder(1).build().unwrap());
        let mux = Arc::new(Multiplexer::new());
        let ctx = StoreContext::new(catalog)
            .with_mux(Arc::clone(&mux))
            .with_config(StoreConfig {
                thread_name: "custom".to_owned(),
                ..StoreConfig::default()
            });
        assert!(Arc::ptr_eq(&ctx.mux, &mux));
        let ctx = ctx.with_cache(Arc::new(SqlCache::with_capacity(4)));
        assert_eq!(ctx.cache.capacity(), 4);
        assert_eq!(ctx.config.thread_name, "custom");
    }
}
