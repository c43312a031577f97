//! Live schema as recorded in `sqlite_master`.

use snpdb_sql::{Column, ColumnExt, ColumnType, Direction, Query, SqlCache, SqlValue};

use crate::error::Result;
use crate::mux::MuxHandle;
use crate::schema::fingerprint::fingerprint;

/// Kind of a schema object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// `CREATE TABLE`
    Table,
    /// `CREATE INDEX`
    Index,
    /// `CREATE VIEW`
    View,
    /// `CREATE TRIGGER`
    Trigger,
}

impl ObjectKind {
    /// Parse the `type` column of `sqlite_master`.
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "table" => Some(Self::Table),
            "index" => Some(Self::Index),
            "view" => Some(Self::View),
            "trigger" => Some(Self::Trigger),
            _ => None,
        }
    }
}

/// One row of `sqlite_master`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemaObject {
    /// Object kind.
    pub kind: ObjectKind,
    /// Object name.
    pub name: String,
    /// Table the object belongs to.
    pub table: String,
    /// Stored `CREATE` text.
    pub sql: String,
}

/// Every user-created schema object, in name order, plus `user_version`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SchemaSnapshot {
    objects: Vec<SchemaObject>,
    user_version: i64,
}

fn master_columns() -> [Column; 4] {
    ["type", "name", "tbl_name", "sql"].map(|name| Column::new(name, ColumnType::Text))
}

/// `SELECT type, name, tbl_name, sql FROM sqlite_master WHERE sql IS NOT NULL ORDER BY name ASC`
pub fn snapshot_query() -> Query {
    let [kind, name, table, sql] = master_columns();
    Query::select([kind, name.clone(), table, sql.clone()])
        .from_name("sqlite_master")
        .filter([sql.is_not_null()])
        .order_by(&name, Direction::Asc)
}

/// `PRAGMA user_version`
pub fn user_version_query() -> Query {
    Query::pragma("user_version")
}

impl SchemaSnapshot {
    /// Snapshot from already-decoded objects.
    pub fn from_objects(mut objects: Vec<SchemaObject>, user_version: i64) -> Self {
        objects.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            objects,
            user_version,
        }
    }

    /// Read the live schema through `handle`.
    ///
    /// Internal `sqlite_*` objects and auto-indexes (which have no SQL text)
    /// are skipped.
    pub fn read(handle: &MuxHandle, cache: &SqlCache) -> Result<Self> {
        let rows = handle.execute(&*cache.statement(&snapshot_query())?)?;
        let objects = rows
            .rows
            .into_iter()
            .filter_map(|row| {
                let [kind, name, table, sql]: [SqlValue; 4] = row.try_into().ok()?;
                let object = SchemaObject {
                    kind: ObjectKind::parse(kind.as_str()?)?,
                    name: name.as_str()?.to_owned(),
                    table: table.as_str()?.to_owned(),
                    sql: sql.as_str()?.to_owned(),
                };
                (!object.name.starts_with("sqlite_")).then_some(object)
            })
            .collect();

        let version = handle.execute(&*cache.statement(&user_version_query())?)?;
        let user_version = version.scalar().and_then(SqlValue::as_i64).unwrap_or(0);
        Ok(Self::from_objects(objects, user_version))
    }

    /// All objects in name order.
    pub fn objects(&self) -> &[SchemaObject] {
        &self.objects
    }

    /// Live tables in name order.
    pub fn tables(&self) -> impl Iterator<Item = &SchemaObject> {
        self.of_kind(ObjectKind::Table)
    }

    /// Live indexes in name order.
    pub fn indexes(&self) -> impl Iterator<Item = &SchemaObject> {
        self.of_kind(ObjectKind::Index)
    }

    fn of_kind(&self, kind: ObjectKind) -> impl Iterator<Item = &SchemaObject> {
        self.objects.iter().filter(move |o| o.kind == kind)
    }

    /// Live table by name.
    pub fn table(&self, name: &str) -> Option<&SchemaObject> {
        self.tables().find(|t| t.name == name)
    }

    /// Whether the database holds no schema objects at all.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// `PRAGMA user_version` at read time.
    pub fn user_version(&self) -> i64 {
        self.user_version
    }

    /// Fingerprint of the live tables.
    pub fn tables_fingerprint(&self) -> String {
        fingerprint(self.tables().map(|t| (t.name.as_str(), t.sql.as_str())))
    }

    /// Fingerprint of the live indexes.
    pub fn indexes_fingerprint(&self) -> String {
        fingerprint(self.indexes().map(|i| (i.name.as_str(), i.sql.as_str())))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn object(kind: ObjectKind, name: &str, sql: &str) -> SchemaObject {
        SchemaObject {
            kind,
            name: name.to_owned(),
            table: "Tree".to_owned(),
            sql: sql.to_owned(),
        }
    }

    #[test]
    fn snapshot_query_sql() {
        let stmt = snapshot_query().to_statement().unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT type, name, tbl_name, sql FROM sqlite_master WHERE sql IS NOT NULL ORDER BY name ASC"
        );
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn objects_split_by_kind() {
        let snapshot = SchemaSnapshot::from_objects(
            vec![
                object(ObjectKind::Index, "idx_Tree_name", "CREATE INDEX idx_Tree_name ON Tree (name)"),
                object(ObjectKind::Table, "Tree", "CREATE TABLE Tree (name TEXT)"),
            ],
            3,
        );
        assert_eq!(snapshot.objects()[0].name, "Tree");
        assert_eq!(snapshot.tables().count(), 1);
        assert_eq!(snapshot.indexes().count(), 1);
        assert!(snapshot.table("Tree").is_some());
        assert_eq!(snapshot.user_version(), 3);
        assert!(!snapshot.is_empty());
    }

    #[test]
    fn fingerprints_ignore_formatting() {
        let a = SchemaSnapshot::from_objects(
            vec![object(ObjectKind::Table, "Tree", "CREATE TABLE Tree (name TEXT)")],
            0,
        );
        let b = SchemaSnapshot::from_objects(
            vec![object(ObjectKind::Table, "Tree", "CREATE TABLE Tree(\n  name TEXT\n)")],
            0,
        );
        assert_eq!(a.tables_fingerprint(), b.tables_fingerprint());
    }
}
