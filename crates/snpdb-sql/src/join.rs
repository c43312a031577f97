//! Join-path inference over a fixed table list.
//!
//! Two tables are adjacent when they share a column name. Everything here
//! iterates tables and columns in declared order, so every tie-break is
//! reproducible across runs.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{Result, SqlError};
use crate::schema::{Column, Table};

/// One step of a join chain: join `table` on `column`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct JoinHop {
    /// Shared column, owned by `table`.
    pub column: Column,
    /// Table being joined in.
    pub table: Table,
}

/// Greedy set cover: tables that together provide every requested column.
///
/// Each round picks the not-yet-chosen table with the largest intersection
/// with the remaining names (earliest declared table wins ties). Not globally
/// minimal, which is fine for catalogs of a handful of tables.
pub fn covering_tables(columns: &[Column], tables: &[Table]) -> Result<Vec<Table>> {
    let mut remaining: Vec<&str> = Vec::new();
    for column in columns {
        if !remaining.contains(&column.name()) {
            remaining.push(column.name());
        }
    }

    let mut chosen: Vec<&Table> = Vec::new();
    while !remaining.is_empty() {
        let mut best: Option<(&Table, usize)> = None;
        for table in tables {
            if chosen.iter().any(|c| c.name() == table.name()) {
                continue;
            }
            let hits = remaining.iter().filter(|n| table.has_column(n)).count();
            if hits > best.map_or(0, |(_, h)| h) {
                best = Some((table, hits));
            }
        }
        let Some((table, _)) = best else {
            return Err(SqlError::ColumnNotFound {
                columns: remaining.iter().map(|n| (*n).to_owned()).collect(),
            });
        };
        remaining.retain(|n| !table.has_column(n));
        chosen.push(table);
    }
    Ok(chosen.into_iter().cloned().collect())
}

/// First column of `from` (declared order) that `to` also has.
fn shared_column<'a>(from: &Table, to: &'a Table) -> Option<&'a Column> {
    from.columns().iter().find_map(|c| to.get(c.name()))
}

fn names(tables: &[Table]) -> Vec<String> {
    tables.iter().map(|t| t.name().to_owned()).collect()
}

/// Breadth-first search from any source to the nearest destination.
///
/// Returns the hops to walk from the source set, empty when a source is
/// already a destination.
pub fn shortest_join_path(
    sources: &[Table],
    destinations: &[Table],
    all_tables: &[Table],
) -> Result<Vec<JoinHop>> {
    let is_destination = |table: &Table| destinations.iter().any(|d| d.name() == table.name());
    if sources.iter().any(is_destination) {
        return Ok(Vec::new());
    }

    let mut visited = vec![false; all_tables.len()];
    let mut parent: HashMap<usize, (usize, Column)> = HashMap::new();
    let mut queue = VecDeque::new();
    for source in sources {
        if let Some(i) = all_tables.iter().position(|t| t.name() == source.name()) {
            if !visited[i] {
                visited[i] = true;
                queue.push_back(i);
            }
        }
    }

    while let Some(current) = queue.pop_front() {
        for (next, table) in all_tables.iter().enumerate() {
            if visited[next] {
                continue;
            }
            let Some(column) = shared_column(&all_tables[current], table) else {
                continue;
            };
            visited[next] = true;
            let _ = parent.insert(next, (current, column.clone()));
            if is_destination(table) {
                let mut hops = Vec::new();
                let mut node = next;
                while let Some((prev, column)) = parent.get(&node) {
                    hops.push(JoinHop {
                        column: column.clone(),
                        table: all_tables[node].clone(),
                    });
                    node = *prev;
                }
                hops.reverse();
                return Ok(hops);
            }
            queue.push_back(next);
        }
    }

    Err(SqlError::TablesNotRelated {
        sources: names(sources),
        destinations: names(destinations),
    })
}

/// Connect `tables` into one chain rooted at the first of them.
pub fn join_plan(tables: &[Table], all_tables: &[Table]) -> Result<Vec<JoinHop>> {
    let Some((root, rest)) = tables.split_first() else {
        return Ok(Vec::new());
    };
    let mut joined = vec![root.clone()];
    let mut hops = Vec::new();
    for target in rest {
        if joined.iter().any(|t| t.name() == target.name()) {
            continue;
        }
        for hop in shortest_join_path(&joined, std::slice::from_ref(target), all_tables)? {
            if !joined.iter().any(|t| t.name() == hop.table.name()) {
                joined.push(hop.table.clone());
                hops.push(hop);
            }
        }
    }
    Ok(hops)
}

/// Tables and hops needed to read a set of columns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinPlan {
    /// Covering tables in selection order; the first is the `FROM` table.
    pub tables: Vec<Table>,
    /// Hops joining every other table (and any bridge tables) onto the root.
    pub hops: Vec<JoinHop>,
}

impl JoinPlan {
    /// Root table of the chain.
    pub fn root(&self) -> Option<&Table> {
        self.tables.first()
    }

    /// Every table reachable in the plan: root, then hop tables in order.
    pub fn joined_tables(&self) -> impl Iterator<Item = &Table> {
        self.tables
            .first()
            .into_iter()
            .chain(self.hops.iter().map(|h| &h.table))
    }
}

/// Memoizing planner bound to one immutable table list.
#[derive(Debug)]
pub struct JoinResolver {
    tables: Vec<Table>,
    plans: Mutex<HashMap<Vec<String>, Result<Arc<JoinPlan>>>>,
}

impl JoinResolver {
    /// Resolver over `tables` in declared order.
    pub fn new(tables: Vec<Table>) -> Self {
        Self {
            tables,
            plans: Mutex::new(HashMap::new()),
        }
    }

    /// Tables this resolver plans over.
    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    /// Cover `columns` and chain the covering tables together.
    pub fn plan(&self, columns: &[Column]) -> Result<Arc<JoinPlan>> {
        let key: Vec<String> = columns.iter().map(|c| c.name().to_owned()).collect();
        if let Some(cached) = self.plans.lock().get(&key) {
            return cached.clone();
        }

        let planned = covering_tables(columns, &self.tables).and_then(|tables| {
            let hops = join_plan(&tables, &self.tables)?;
            Ok(Arc::new(JoinPlan { tables, hops }))
        });
        debug!(columns = ?key, ok = planned.is_ok(), "join plan computed");
        let _ = self.plans.lock().insert(key, planned.clone());
        planned
    }

    /// Number of memoized plans.
    pub fn cached_plans(&self) -> usize {
        self.plans.lock().len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;
    use assert_matches::assert_matches;

    fn catalog() -> Vec<Table> {
        vec![
            Table::new("Tree")
                .column("parent", ColumnType::Integer)
                .column("node_id", ColumnType::Integer)
                .column("name", ColumnType::Text),
            Table::new("Snp")
                .column("snp_id", ColumnType::Integer)
                .column("node_id", ColumnType::Integer)
                .column("alias", ColumnType::Text),
            Table::new("Position")
                .column("snp_id", ColumnType::Integer)
                .column("build", ColumnType::Integer)
                .column("position", ColumnType::Integer),
            Table::new("Island").column("lonely", ColumnType::Text),
        ]
    }

    fn col(name: &str) -> Column {
        Column::new(name, ColumnType::Integer)
    }

    #[test]
    fn single_table_covers_its_columns() {
        let tables = covering_tables(&[col("parent"), col("name")], &catalog()).unwrap();
        assert_eq!(names(&tables), ["Tree"]);
    }

    #[test]
    fn cover_prefers_largest_intersection() {
        let tables =
            covering_tables(&[col("snp_id"), col("build"), col("position"), col("alias")], &catalog())
                .unwrap();
        assert_eq!(names(&tables), ["Position", "Snp"]);
    }

    #[test]
    fn cover_ties_break_in_declared_order() {
        let tables = covering_tables(&[col("node_id")], &catalog()).unwrap();
        assert_eq!(names(&tables), ["Tree"]);
        let tables = covering_tables(&[col("snp_id"), col("alias"), col("build")], &catalog())
            .unwrap();
        assert_eq!(names(&tables), ["Snp", "Position"]);
    }

    #[test]
    fn cover_reports_unresolved_columns() {
        assert_matches!(
            covering_tables(&[col("name"), col("ghost")], &catalog()),
            Err(SqlError::ColumnNotFound { columns }) if columns == ["ghost"]
        );
    }

    #[test]
    fn adjacent_tables_take_one_hop() {
        let all = catalog();
        let hops = shortest_join_path(&all[0..1], &all[1..2], &all).unwrap();
        assert_eq!(hops.len(), 1);
        assert_eq!(hops[0].table.name(), "Snp");
        assert_eq!(hops[0].column.name(), "node_id");
    }

    #[test]
    fn bridged_tables_take_exactly_two_hops() {
        let all = catalog();
        let hops = shortest_join_path(&all[0..1], &all[2..3], &all).unwrap();
        let path: Vec<(&str, &str)> = hops
            .iter()
            .map(|h| (h.table.name(), h.column.name()))
            .collect();
        assert_eq!(path, [("Snp", "node_id"), ("Position", "snp_id")]);
    }

    #[test]
    fn source_already_destination_is_empty_path() {
        let all = catalog();
        assert!(shortest_join_path(&all[0..1], &all[0..1], &all)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn disconnected_tables_are_not_related() {
        let all = catalog();
        assert_matches!(
            shortest_join_path(&all[0..1], &all[3..4], &all),
            Err(SqlError::TablesNotRelated { sources, destinations })
                if sources == ["Tree"] && destinations == ["Island"]
        );
    }

    #[test]
    fn join_plan_pulls_in_bridge_tables() {
        let all = catalog();
        let plan = join_plan(&[all[0].clone(), all[2].clone()], &all).unwrap();
        let tables: Vec<&str> = plan.iter().map(|h| h.table.name()).collect();
        assert_eq!(tables, ["Snp", "Position"]);
    }

    #[test]
    fn resolver_memoizes_plans() {
        let resolver = JoinResolver::new(catalog());
        let first = resolver.plan(&[col("name"), col("position")]).unwrap();
        let second = resolver.plan(&[col("name"), col("position")]).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(resolver.cached_plans(), 1);
        let joined: Vec<&str> = first.joined_tables().map(Table::name).collect();
        assert_eq!(joined, ["Tree", "Snp", "Position"]);
    }

    #[test]
    fn resolver_memoizes_failures() {
        let resolver = JoinResolver::new(catalog());
        assert!(resolver.plan(&[col("name"), col("lonely")]).is_err());
        assert!(resolver.plan(&[col("name"), col("lonely")]).is_err());
        assert_eq!(resolver.cached_plans(), 1);
    }
}
