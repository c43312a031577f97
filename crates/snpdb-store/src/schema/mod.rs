//! Schema fingerprinting, assertions and rectify plans.

pub mod assertions;
pub mod fingerprint;
pub mod rectify;
pub mod snapshot;

pub use assertions::{
    Assertion, AssertionEngine, Expected, LegacyFormat, SchemaNotEmpty, SchemaState,
    ValidIndexesSchema, ValidTablesSchema, default_assertions,
};
pub use fingerprint::{catalog_indexes_fingerprint, catalog_tables_fingerprint, fingerprint, normalize_ddl};
pub use snapshot::{ObjectKind, SchemaObject, SchemaSnapshot};
