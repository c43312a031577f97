//! Ordered schema assertions and the engine that evaluates and fixes them.
//!
//! Each [`Assertion`] is a condition on the live schema paired with the plan
//! that makes it hold and the error reported when it does not. The engine
//! walks them in order: the first one that fails decides the state.

use std::fmt;
use std::sync::Arc;

use snpdb_sql::{Catalog, Query, SqlCache, Statement};
use tracing::{debug, info, warn};

use crate::error::{Result, SchemaError, StoreError};
use crate::mux::MuxHandle;
use crate::schema::fingerprint::{catalog_indexes_fingerprint, catalog_tables_fingerprint};
use crate::schema::rectify;
use crate::schema::snapshot::SchemaSnapshot;

/// Where a live schema stands relative to its catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SchemaState {
    /// Not checked yet.
    Unknown,
    /// No schema objects.
    Empty,
    /// A known obsolete layout.
    Legacy,
    /// Tables differ from the catalog.
    TablesMismatch,
    /// Indexes differ from the catalog.
    IndexesMismatch,
    /// Matches the catalog.
    Valid,
}

impl SchemaState {
    /// Whether the schema matches its catalog.
    pub fn is_valid(self) -> bool {
        self == Self::Valid
    }

    /// Lowercase name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Empty => "empty",
            Self::Legacy => "legacy",
            Self::TablesMismatch => "tables_mismatch",
            Self::IndexesMismatch => "indexes_mismatch",
            Self::Valid => "valid",
        }
    }
}

impl fmt::Display for SchemaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The catalog plus its precomputed fingerprints.
#[derive(Debug)]
pub struct Expected {
    catalog: Arc<Catalog>,
    tables_fingerprint: String,
    indexes_fingerprint: String,
}

impl Expected {
    /// Fingerprint `catalog`.
    pub fn new(catalog: Arc<Catalog>) -> Result<Self> {
        Ok(Self {
            tables_fingerprint: catalog_tables_fingerprint(&catalog)?,
            indexes_fingerprint: catalog_indexes_fingerprint(&catalog)?,
            catalog,
        })
    }

    /// The catalog.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Fingerprint of the catalog tables.
    pub fn tables_fingerprint(&self) -> &str {
        &self.tables_fingerprint
    }

    /// Fingerprint of the catalog indexes.
    pub fn indexes_fingerprint(&self) -> &str {
        &self.indexes_fingerprint
    }
}

/// A named condition on the live schema with its repair.
pub trait Assertion: Send + Sync {
    /// Name used in logs and migration errors.
    fn name(&self) -> &'static str;

    /// State reported while this assertion fails.
    fn state(&self) -> SchemaState;

    /// Whether the condition holds for `snapshot`.
    fn holds(&self, snapshot: &SchemaSnapshot, expected: &Expected) -> bool;

    /// Statements that make the condition hold, run as one transaction.
    fn rectify(&self, snapshot: &SchemaSnapshot, expected: &Expected) -> Result<Vec<Query>>;

    /// Error describing the failure.
    fn error(&self, snapshot: &SchemaSnapshot, expected: &Expected) -> SchemaError;
}

/// Live tables match a known obsolete layout. Fixed by dropping them all.
#[derive(Debug, Default)]
pub struct LegacyFormat;

impl Assertion for LegacyFormat {
    fn name(&self) -> &'static str {
        "legacy_format"
    }

    fn state(&self) -> SchemaState {
        SchemaState::Legacy
    }

    fn holds(&self, snapshot: &SchemaSnapshot, expected: &Expected) -> bool {
        let live = snapshot.tables_fingerprint();
        !expected
            .catalog()
            .legacy_fingerprints()
            .iter()
            .any(|legacy| *legacy == live)
    }

    fn rectify(&self, snapshot: &SchemaSnapshot, _expected: &Expected) -> Result<Vec<Query>> {
        Ok(rectify::drop_all_tables(snapshot))
    }

    fn error(&self, snapshot: &SchemaSnapshot, _expected: &Expected) -> SchemaError {
        SchemaError::Legacy {
            fingerprint: snapshot.tables_fingerprint(),
        }
    }
}

/// The database holds at least one schema object.
#[derive(Debug, Default)]
pub struct SchemaNotEmpty;

impl Assertion for SchemaNotEmpty {
    fn name(&self) -> &'static str {
        "schema_not_empty"
    }

    fn state(&self) -> SchemaState {
        SchemaState::Empty
    }

    fn holds(&self, snapshot: &SchemaSnapshot, _expected: &Expected) -> bool {
        !snapshot.is_empty()
    }

    fn rectify(&self, _snapshot: &SchemaSnapshot, expected: &Expected) -> Result<Vec<Query>> {
        Ok(rectify::create_all(expected.catalog()))
    }

    fn error(&self, _snapshot: &SchemaSnapshot, _expected: &Expected) -> SchemaError {
        SchemaError::Empty
    }
}

/// Live tables fingerprint equals the catalog's.
#[derive(Debug, Default)]
pub struct ValidTablesSchema;

impl Assertion for ValidTablesSchema {
    fn name(&self) -> &'static str {
        "valid_tables_schema"
    }

    fn state(&self) -> SchemaState {
        SchemaState::TablesMismatch
    }

    fn holds(&self, snapshot: &SchemaSnapshot, expected: &Expected) -> bool {
        snapshot.tables_fingerprint() == expected.tables_fingerprint()
    }

    fn rectify(&self, snapshot: &SchemaSnapshot, expected: &Expected) -> Result<Vec<Query>> {
        rectify::rebuild_tables(snapshot, expected.catalog())
    }

    fn error(&self, snapshot: &SchemaSnapshot, expected: &Expected) -> SchemaError {
        SchemaError::TablesMismatch {
            expected: expected.tables_fingerprint().to_owned(),
            found: snapshot.tables_fingerprint(),
        }
    }
}

/// Live indexes fingerprint equals the catalog's.
#[derive(Debug, Default)]
pub struct ValidIndexesSchema;

impl Assertion for ValidIndexesSchema {
    fn name(&self) -> &'static str {
        "valid_indexes_schema"
    }

    fn state(&self) -> SchemaState {
        SchemaState::IndexesMismatch
    }

    fn holds(&self, snapshot: &SchemaSnapshot, expected: &Expected) -> bool {
        snapshot.indexes_fingerprint() == expected.indexes_fingerprint()
    }

    fn rectify(&self, snapshot: &SchemaSnapshot, expected: &Expected) -> Result<Vec<Query>> {
        Ok(rectify::rebuild_indexes(snapshot, expected.catalog()))
    }

    fn error(&self, snapshot: &SchemaSnapshot, expected: &Expected) -> SchemaError {
        SchemaError::IndexesMismatch {
            expected: expected.indexes_fingerprint().to_owned(),
            found: snapshot.indexes_fingerprint(),
        }
    }
}

/// The default assertion list for `catalog`, in evaluation order.
///
/// The legacy check is only present when the catalog names legacy layouts.
pub fn default_assertions(catalog: &Catalog) -> Vec<Box<dyn Assertion>> {
    let mut assertions: Vec<Box<dyn Assertion>> = Vec::new();
    if !catalog.legacy_fingerprints().is_empty() {
        assertions.push(Box::new(LegacyFormat));
    }
    assertions.push(Box::new(SchemaNotEmpty));
    assertions.push(Box::new(ValidTablesSchema));
    assertions.push(Box::new(ValidIndexesSchema));
    assertions
}

/// Evaluates assertions against snapshots and drives them to convergence.
pub struct AssertionEngine {
    expected: Expected,
    assertions: Vec<Box<dyn Assertion>>,
}

impl fmt::Debug for AssertionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssertionEngine")
            .field("assertions", &self.names())
            .finish_non_exhaustive()
    }
}

impl AssertionEngine {
    /// Engine with the default assertions for `catalog`.
    pub fn new(catalog: Arc<Catalog>) -> Result<Self> {
        let assertions = default_assertions(&catalog);
        Self::with_assertions(catalog, assertions)
    }

    /// Engine with a custom assertion list.
    pub fn with_assertions(catalog: Arc<Catalog>, assertions: Vec<Box<dyn Assertion>>) -> Result<Self> {
        Ok(Self {
            expected: Expected::new(catalog)?,
            assertions,
        })
    }

    /// Catalog and fingerprints checked against.
    pub fn expected(&self) -> &Expected {
        &self.expected
    }

    /// Assertion names in evaluation order.
    pub fn names(&self) -> Vec<&'static str> {
        self.assertions.iter().map(|a| a.name()).collect()
    }

    /// First assertion that does not hold.
    pub fn first_failing(&self, snapshot: &SchemaSnapshot) -> Option<&dyn Assertion> {
        self.assertions
            .iter()
            .map(Box::as_ref)
            .find(|a| !a.holds(snapshot, &self.expected))
    }

    /// State of `snapshot`: the first failing assertion's, else `Valid`.
    pub fn evaluate(&self, snapshot: &SchemaSnapshot) -> SchemaState {
        self.first_failing(snapshot)
            .map_or(SchemaState::Valid, |a| a.state())
    }

    /// Typed error for the first failing assertion.
    pub fn check(&self, snapshot: &SchemaSnapshot) -> std::result::Result<(), SchemaError> {
        match self.first_failing(snapshot) {
            Some(assertion) => Err(assertion.error(snapshot, &self.expected)),
            None => Ok(()),
        }
    }

    /// Rectify until every assertion holds, then stamp the catalog version.
    ///
    /// Runs at most one rectify plan per assertion. A failure that survives
    /// the bound is returned as that assertion's [`SchemaError`]; a plan that
    /// `SQLite` rejects is rolled back and returned as
    /// [`StoreError::Migration`].
    pub fn fix(&self, handle: &MuxHandle, cache: &SqlCache) -> Result<SchemaState> {
        for iteration in 0..self.assertions.len() {
            let snapshot = SchemaSnapshot::read(handle, cache)?;
            let Some(assertion) = self.first_failing(&snapshot) else {
                return self.stamp(handle, &snapshot);
            };
            warn!(
                assertion = assertion.name(),
                state = %assertion.state(),
                iteration,
                "assertion failed, rectifying"
            );
            let statements = assertion
                .rectify(&snapshot, &self.expected)?
                .iter()
                .map(Query::to_statement)
                .collect::<snpdb_sql::Result<Vec<Statement>>>()?;
            let count = statements.len();
            let _ = handle.transaction(statements).map_err(|err| match err {
                StoreError::Sqlite(err) => StoreError::Migration {
                    message: format!("{} rectify failed: {err}", assertion.name()),
                },
                other => other,
            })?;
            info!(assertion = assertion.name(), statements = count, "rectify applied");
        }

        let snapshot = SchemaSnapshot::read(handle, cache)?;
        self.check(&snapshot)?;
        self.stamp(handle, &snapshot)
    }

    fn stamp(&self, handle: &MuxHandle, snapshot: &SchemaSnapshot) -> Result<SchemaState> {
        let version = i64::from(self.expected.catalog().version());
        if snapshot.user_version() == version {
            debug!(version, "schema version already stamped");
        } else {
            let _ = handle.execute(&Query::pragma_set("user_version", version).to_statement()?)?;
            info!(version, "schema version stamped");
        }
        Ok(SchemaState::Valid)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
