#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use snpdb_sql::{Catalog, ColumnType, Index, Table};
use snpdb_store::{Multiplexer, StoreConfig, StoreContext};

pub fn tree() -> Table {
    Table::new("Tree")
        .column("parent", ColumnType::Integer)
        .column("node_id", ColumnType::Integer)
        .column("name", ColumnType::Text)
        .primary_key(&["node_id"])
}

pub fn tree_catalog() -> Arc<Catalog> {
    Arc::new(Catalog::builder(1).table(tree()).build().unwrap())
}

pub fn indexed_tree_catalog() -> Arc<Catalog> {
    Arc::new(
        Catalog::builder(1)
            .table(tree())
            .index(Index::new(&tree(), &["name"]).unwrap())
            .build()
            .unwrap(),
    )
}

pub fn context(catalog: Arc<Catalog>) -> StoreContext {
    StoreContext::new(catalog)
        .with_mux(Arc::new(Multiplexer::new()))
        .with_config(StoreConfig {
            poll_interval_ms: 10,
            ..StoreConfig::default()
        })
}

pub fn temp_db(name: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    (dir, path)
}

/// Prepare a file with raw DDL before the store ever sees it.
pub fn seed(path: &Path, sql: &str) {
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.execute_batch(sql).unwrap();
}

/// Context using a rollback journal, for tests that reopen files read-only.
pub fn rollback_context(catalog: Arc<Catalog>) -> StoreContext {
    let ctx = context(catalog);
    let config = StoreConfig {
        journal_mode: "DELETE".to_owned(),
        ..ctx.config.clone()
    };
    ctx.with_config(config)
}
