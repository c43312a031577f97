//! Rectify plans: the statements that move a live schema one state closer to
//! its catalog. Each plan is executed as a single transaction.

use snpdb_sql::{Catalog, Query};
use tracing::debug;

use crate::error::Result;
use crate::schema::fingerprint::normalize_ddl;
use crate::schema::snapshot::SchemaSnapshot;

/// Name a table is parked under while it is rebuilt.
pub fn rebuild_name(table: &str) -> String {
    format!("_snpdb_rebuild_{table}")
}

/// Drop every live table. Their indexes go with them.
pub fn drop_all_tables(snapshot: &SchemaSnapshot) -> Vec<Query> {
    snapshot
        .tables()
        .map(|t| Query::drop_table(&t.name))
        .collect()
}

/// Create every catalog table, then every catalog index.
pub fn create_all(catalog: &Catalog) -> Vec<Query> {
    let tables = catalog.tables().iter().map(Query::create_table);
    let indexes = catalog.indexes().iter().map(Query::create_index);
    tables.chain(indexes).collect()
}

/// Bring live tables to the catalog shape while keeping their rows.
///
/// A live table whose DDL differs is renamed aside, recreated, refilled with
/// `INSERT INTO t SELECT * FROM aside` and the aside copy dropped. The copy
/// fails when the column counts differ, which aborts the whole plan. Missing
/// tables are created; live tables the catalog does not know are dropped.
pub fn rebuild_tables(snapshot: &SchemaSnapshot, catalog: &Catalog) -> Result<Vec<Query>> {
    let mut plan = Vec::new();
    for table in catalog.tables() {
        let Some(live) = snapshot.table(table.name()) else {
            plan.push(Query::create_table(table));
            continue;
        };
        if normalize_ddl(&live.sql) == normalize_ddl(&table.create_sql()?) {
            debug!(table = table.name(), "table matches, skipping rebuild");
            continue;
        }
        let aside = rebuild_name(table.name());
        plan.push(Query::alter_table_rename(table.name(), &aside));
        plan.push(Query::create_table(table));
        plan.push(Query::insert_into_name(table.name()).then(Query::select_all().from_name(&aside)));
        plan.push(Query::drop_table(&aside));
    }
    for live in snapshot.tables() {
        if catalog.table(&live.name).is_none() {
            plan.push(Query::drop_table(&live.name));
        }
    }
    Ok(plan)
}

/// Drop every live index and create the catalog's.
pub fn rebuild_indexes(snapshot: &SchemaSnapshot, catalog: &Catalog) -> Vec<Query> {
    let drops = snapshot.indexes().map(|i| Query::drop_index(&i.name));
    drops
        .chain(catalog.indexes().iter().map(Query::create_index))
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::snapshot::{ObjectKind, SchemaObject};
    use snpdb_sql::{ColumnType, Index, Table};

    fn tree() -> Table {
        Table::new("Tree")
            .column("parent", ColumnType::Integer)
            .column("node_id", ColumnType::Integer)
            .column("name", ColumnType::Text)
            .primary_key(&["node_id"])
    }

    fn catalog() -> Catalog {
        Catalog::builder(1)
            .table(tree())
            .index(Index::new(&tree(), &["name"]).unwrap())
            .build()
            .unwrap()
    }

    fn table(name: &str, sql: &str) -> SchemaObject {
        SchemaObject {
            kind: ObjectKind::Table,
            name: name.to_owned(),
            table: name.to_owned(),
            sql: sql.to_owned(),
        }
    }

    fn sql(plan: &[Query]) -> Vec<String> {
        plan.iter().map(|q| q.to_statement().unwrap().sql).collect()
    }

    #[test]
    fn create_all_emits_tables_then_indexes() {
        assert_eq!(
            sql(&create_all(&catalog())),
            [
                "CREATE TABLE Tree (parent INTEGER, node_id INTEGER, name TEXT, PRIMARY KEY (node_id))",
                "CREATE INDEX idx_Tree_name ON Tree (name)",
            ]
        );
    }

    #[test]
    fn rebuild_renames_copies_and_drops() {
        let snapshot = SchemaSnapshot::from_objects(
            vec![
                table("Tree", "CREATE TABLE Tree (parent INTEGER, node_id INTEGER, name VARCHAR(8))"),
                table("Stale", "CREATE TABLE Stale (x INTEGER)"),
            ],
            0,
        );
        assert_eq!(
            sql(&rebuild_tables(&snapshot, &catalog()).unwrap()),
            [
                "ALTER TABLE Tree RENAME TO _snpdb_rebuild_Tree",
                "CREATE TABLE Tree (parent INTEGER, node_id INTEGER, name TEXT, PRIMARY KEY (node_id))",
                "INSERT INTO Tree SELECT * FROM _snpdb_rebuild_Tree",
                "DROP TABLE _snpdb_rebuild_Tree",
                "DROP TABLE Stale",
            ]
        );
    }

    #[test]
    fn rebuild_skips_matching_tables() {
        let snapshot = SchemaSnapshot::from_objects(
            vec![table(
                "Tree",
                "CREATE TABLE Tree(parent INTEGER,node_id INTEGER,name TEXT,PRIMARY KEY(node_id))",
            )],
            0,
        );
        assert!(rebuild_tables(&snapshot, &catalog()).unwrap().is_empty());
    }

    #[test]
    fn rebuild_indexes_drops_live_first() {
        let snapshot = SchemaSnapshot::from_objects(
            vec![SchemaObject {
                kind: ObjectKind::Index,
                name: "idx_old".to_owned(),
                table: "Tree".to_owned(),
                sql: "CREATE INDEX idx_old ON Tree (parent)".to_owned(),
            }],
            0,
        );
        assert_eq!(
            sql(&rebuild_indexes(&snapshot, &catalog())),
            ["DROP INDEX idx_old", "CREATE INDEX idx_Tree_name ON Tree (name)"]
        );
    }
}
