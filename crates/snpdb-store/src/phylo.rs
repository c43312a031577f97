//! Built-in catalog for the phylogenetic SNP database.
//!
//! `Tree` holds the phylogeny (one row per node), `Snp` names the variants
//! defined on each node, and `Position` places each variant on a reference
//! build with its ancestral and derived alleles.

use snpdb_sql::{Catalog, ColumnType, Index, Table};

use crate::error::Result;
use crate::schema::fingerprint::fingerprint;

/// Schema version stamped into `user_version`.
pub const VERSION: u32 = 1;

/// `Tree(parent, node_id, name)`
pub fn tree() -> Table {
    Table::new("Tree")
        .column("parent", ColumnType::Integer)
        .column("node_id", ColumnType::Integer)
        .column("name", ColumnType::Text)
        .primary_key(&["node_id"])
}

/// `Snp(snp_id, node_id, name)`
pub fn snp() -> Table {
    Table::new("Snp")
        .column("snp_id", ColumnType::Integer)
        .column("node_id", ColumnType::Integer)
        .column("name", ColumnType::Varchar(32))
        .primary_key(&["snp_id"])
}

/// `Position(snp_id, build, position, ancestral, derived)`
pub fn position() -> Table {
    Table::new("Position")
        .column("snp_id", ColumnType::Integer)
        .column("build", ColumnType::Varchar(8))
        .column("position", ColumnType::Integer)
        .column("ancestral", ColumnType::Varchar(1))
        .column("derived", ColumnType::Varchar(1))
        .primary_key(&["snp_id", "build"])
}

/// The flat single-table layout used before `Snp` and `Position` were split.
pub fn legacy_tables() -> Vec<Table> {
    vec![
        Table::new("Tree")
            .column("parent", ColumnType::Integer)
            .column("child", ColumnType::Integer)
            .column("name", ColumnType::Text),
        Table::new("Snps")
            .column("name", ColumnType::Text)
            .column("node", ColumnType::Integer)
            .column("position", ColumnType::Integer)
            .column("mutation", ColumnType::Text),
    ]
}

/// Tables fingerprint of [`legacy_tables`].
pub fn legacy_fingerprint() -> Result<String> {
    let ddl = legacy_tables()
        .iter()
        .map(|t| Ok((t.name().to_owned(), t.create_sql()?)))
        .collect::<Result<Vec<_>>>()?;
    Ok(fingerprint(ddl))
}

/// The full catalog at [`VERSION`].
pub fn catalog() -> Result<Catalog> {
    let (tree, snp, position) = (tree(), snp(), position());
    let indexes = [
        Index::new(&tree, &["parent"])?,
        Index::new(&snp, &["node_id"])?,
        Index::new(&snp, &["name"])?.unique(),
        Index::new(&position, &["build", "position"])?,
    ];
    let builder = indexes.into_iter().fold(
        Catalog::builder(VERSION)
            .table(tree)
            .table(snp)
            .table(position)
            .legacy_fingerprint(legacy_fingerprint()?),
        snpdb_sql::CatalogBuilder::index,
    );
    Ok(builder.build()?)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
