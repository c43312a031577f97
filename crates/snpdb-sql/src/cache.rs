//! Content-addressed serialization cache.
//!
//! Queries are plain values, so the structural value itself is the key: two
//! call sites that build the same query share one serialized [`Statement`].
//! Bound parameters are part of that value, so per-row lookups produce a new
//! entry each; the cache keeps the most recently used ones up to a fixed
//! capacity.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::error::Result;
use crate::query::{Query, Statement};

/// Entries kept by [`SqlCache::new`].
pub const DEFAULT_CAPACITY: usize = 256;

/// Memoizes [`Query::to_statement`] per distinct query value, least
/// recently used first out.
#[derive(Debug)]
pub struct SqlCache {
    entries: Mutex<LruCache<Query, Arc<Statement>>>,
}

impl Default for SqlCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl SqlCache {
    /// Empty cache holding up to [`DEFAULT_CAPACITY`] statements.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty cache holding up to `capacity` statements (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Serialized form of `query`, computed once while it stays cached.
    pub fn statement(&self, query: &Query) -> Result<Arc<Statement>> {
        if let Some(hit) = self.entries.lock().get(query) {
            return Ok(Arc::clone(hit));
        }
        let statement = Arc::new(query.to_statement()?);
        let _ = self
            .entries
            .lock()
            .put(query.clone(), Arc::clone(&statement));
        Ok(statement)
    }

    /// Number of cached statements.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Maximum number of cached statements.
    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ColumnExt;
    use crate::schema::{ColumnType, Table};

    fn tree() -> Table {
        Table::new("Tree")
            .column("node_id", ColumnType::Integer)
            .column("name", ColumnType::Text)
    }

    fn by_name(t: &Table, name: &str) -> Query {
        Query::select([t.col("node_id").unwrap().clone()])
            .from([t])
            .filter([t.col("name").unwrap().equals(name)])
    }

    #[test]
    fn same_value_serializes_once() {
        let cache = SqlCache::new();
        let t = tree();
        let a = cache.statement(&by_name(&t, "root")).unwrap();
        let b = cache.statement(&by_name(&t, "root")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn different_params_are_different_entries() {
        let cache = SqlCache::new();
        let t = tree();
        let a = cache.statement(&by_name(&t, "a")).unwrap();
        let b = cache.statement(&by_name(&t, "b")).unwrap();
        assert_eq!(a.sql, b.sql);
        assert_ne!(a.params, b.params);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn distinct_lookups_stay_within_capacity() {
        let cache = SqlCache::with_capacity(8);
        let t = tree();
        for i in 0..1000 {
            let _ = cache.statement(&by_name(&t, &format!("node{i}"))).unwrap();
        }
        assert_eq!(cache.len(), 8);
        assert_eq!(cache.capacity(), 8);
    }

    #[test]
    fn least_recently_used_is_evicted_first() {
        let cache = SqlCache::with_capacity(2);
        let t = tree();
        let kept = cache.statement(&by_name(&t, "kept")).unwrap();
        let _ = cache.statement(&by_name(&t, "dropped")).unwrap();
        let _ = cache.statement(&by_name(&t, "kept")).unwrap();
        let _ = cache.statement(&by_name(&t, "new")).unwrap();
        assert!(Arc::ptr_eq(&kept, &cache.statement(&by_name(&t, "kept")).unwrap()));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn zero_capacity_keeps_one() {
        assert_eq!(SqlCache::with_capacity(0).capacity(), 1);
    }

    #[test]
    fn errors_are_not_cached() {
        let cache = SqlCache::new();
        assert!(cache.statement(&Query::new()).is_err());
        assert!(cache.is_empty());
    }
}
