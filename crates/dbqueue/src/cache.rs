use std::collections::HashMap;
use std::sync::RwLock;

use crate::types::QueryCacheEntry;

/// Query-Template Cache. Populated exactly once by the Lead during bootstrap;
/// the invariant "no entries inserted after `bootstrap_completed` signals
/// true" lets every other reader skip locking in practice, but the map itself
/// is still guarded by an `RwLock` so a stray late insert is rejected rather
/// than racing.
#[derive(Default)]
pub struct QueryTemplateCache {
    entries: RwLock<HashMap<i64, QueryCacheEntry>>,
}

impl QueryTemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` (and logs, at the call site) on a duplicate
    /// `query_ref` — the second insertion is rejected, the first wins.
    pub fn add_entry(&self, entry: QueryCacheEntry) -> bool {
        let mut map = self.entries.write().unwrap();
        if map.contains_key(&entry.query_ref) {
            return false;
        }
        map.insert(entry.query_ref, entry);
        true
    }

    pub fn lookup(&self, query_ref: i64) -> Option<QueryCacheEntry> {
        self.entries.read().unwrap().get(&query_ref).cloned()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.read().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::QueueClass;

    fn entry(query_ref: i64, sql: &str) -> QueryCacheEntry {
        QueryCacheEntry {
            query_ref,
            query_type: 0,
            sql_template: sql.to_string(),
            description: String::new(),
            queue_class: QueueClass::Medium,
            timeout_seconds: 30,
        }
    }

    #[test]
    fn rejects_duplicate_query_ref() {
        let qtc = QueryTemplateCache::new();
        assert!(qtc.add_entry(entry(1001, "SELECT 1")));
        assert!(!qtc.add_entry(entry(1001, "SELECT 2")));
        assert_eq!(qtc.entry_count(), 1);
        assert_eq!(qtc.lookup(1001).unwrap().sql_template, "SELECT 1");
    }

    #[test]
    fn lookup_of_missing_ref_is_none() {
        let qtc = QueryTemplateCache::new();
        assert!(qtc.lookup(9999).is_none());
    }
}
