#![allow(missing_docs, unused_results)]

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use snpdb_logging::capture_logs;
use snpdb_sql::{Query, SqlValue};
use snpdb_store::{Database, OpenMode, SchemaState, StoreError, phylo};
use tracing::Level;

use common::{context, indexed_tree_catalog, seed, temp_db, tree};

fn names<'a>(objects: impl Iterator<Item = &'a snpdb_store::schema::SchemaObject>) -> Vec<String> {
    objects.map(|o| o.name.clone()).collect()
}

#[test]
fn tables_mismatch_rebuilds_and_keeps_rows() {
    let (_dir, path) = temp_db("tables.db");
    seed(
        &path,
        "CREATE TABLE Tree (parent INTEGER, node_id INTEGER, name VARCHAR(10));
         INSERT INTO Tree VALUES (0, 1, 'root'), (1, 2, 'leaf');",
    );
    let db = Database::open(&path, OpenMode::Write, context(indexed_tree_catalog())).unwrap();
    assert_eq!(db.check_schema_state().unwrap(), SchemaState::TablesMismatch);

    assert_eq!(db.fix().unwrap(), SchemaState::Valid);
    assert_eq!(db.count("Tree").unwrap(), 2);

    let snapshot = db.snapshot().unwrap();
    assert_eq!(names(snapshot.tables()), ["Tree"]);
    assert_eq!(names(snapshot.indexes()), ["idx_Tree_name"]);
    assert_eq!(snapshot.tables().next().unwrap().sql, tree().create_sql().unwrap());
}

#[test]
fn unknown_tables_are_dropped() {
    let (_dir, path) = temp_db("extra.db");
    seed(
        &path,
        &format!("{};\nCREATE TABLE Scratch (x INTEGER);", tree().create_sql().unwrap()),
    );
    let db = Database::open(&path, OpenMode::Write, context(common::tree_catalog())).unwrap();
    assert_eq!(db.check_schema_state().unwrap(), SchemaState::TablesMismatch);
    db.fix().unwrap();
    assert_eq!(names(db.snapshot().unwrap().tables()), ["Tree"]);
}

#[test]
fn indexes_mismatch_recreates_indexes() {
    let (_dir, path) = temp_db("indexes.db");
    seed(
        &path,
        &format!(
            "{};\nCREATE INDEX idx_old ON Tree (parent);",
            tree().create_sql().unwrap()
        ),
    );
    let db = Database::open(&path, OpenMode::Write, context(indexed_tree_catalog())).unwrap();
    assert_eq!(db.check_schema_state().unwrap(), SchemaState::IndexesMismatch);
    db.fix().unwrap();
    assert_eq!(names(db.snapshot().unwrap().indexes()), ["idx_Tree_name"]);
}

#[test]
fn legacy_layout_is_replaced() {
    let (_dir, path) = temp_db("legacy.db");
    let ddl: Vec<String> = phylo::legacy_tables()
        .iter()
        .map(|t| t.create_sql().unwrap())
        .collect();
    seed(&path, &format!("{};", ddl.join(";\n")));

    let catalog = Arc::new(phylo::catalog().unwrap());
    let db = Database::open(&path, OpenMode::Write, context(catalog)).unwrap();
    assert_eq!(db.check_schema_state().unwrap(), SchemaState::Legacy);
    assert_eq!(db.fix().unwrap(), SchemaState::Valid);

    let snapshot = db.snapshot().unwrap();
    assert_eq!(names(snapshot.tables()), ["Position", "Snp", "Tree"]);
    assert_eq!(snapshot.indexes().count(), 4);
    assert_eq!(db.count("Tree").unwrap(), 0);
}

#[test]
fn fix_on_valid_schema_changes_nothing() {
    let (_dir, path) = temp_db("idempotent.db");
    let db = Database::open(&path, OpenMode::Write, context(indexed_tree_catalog())).unwrap();
    db.fix().unwrap();
    let before = db.snapshot().unwrap();

    let (logs, _guard) = capture_logs();
    assert_eq!(db.fix().unwrap(), SchemaState::Valid);
    assert_eq!(db.snapshot().unwrap(), before);
    assert_eq!(logs.count_at_level(Level::WARN), 0);
}

#[test]
fn fix_logs_each_failed_assertion() {
    let (logs, _guard) = capture_logs();
    let (_dir, path) = temp_db("logged.db");
    let db = Database::open(&path, OpenMode::Write, context(indexed_tree_catalog())).unwrap();
    db.fix().unwrap();

    let warned: Vec<_> = logs
        .events_for_target("snpdb_store::schema")
        .into_iter()
        .filter(|e| e.level == Level::WARN)
        .filter_map(|e| e.field("assertion").map(str::to_owned))
        .collect();
    assert_eq!(warned, ["schema_not_empty"]);
    assert!(logs.has_event(Level::INFO, "schema version stamped"));
}

#[test]
fn failed_migration_leaves_schema_intact() {
    let (_dir, path) = temp_db("failed.db");
    seed(
        &path,
        "CREATE TABLE Tree (parent INTEGER, node_id INTEGER);
         INSERT INTO Tree VALUES (0, 1);",
    );
    let db = Database::open(&path, OpenMode::Write, context(indexed_tree_catalog())).unwrap();
    let before = db.snapshot().unwrap();

    assert_matches!(
        db.fix(),
        Err(StoreError::Migration { message }) if message.starts_with("valid_tables_schema")
    );
    assert_eq!(db.snapshot().unwrap(), before);
    assert_eq!(
        db.query_column(&Query::count().from_name("Tree")).unwrap(),
        vec![SqlValue::Integer(1)]
    );
}
