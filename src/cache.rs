use crate::model::Paper;
use std::collections::HashMap;

// Memoizes the full result set of completed searches for the lifetime of the
// process. Queries differing only in case or surrounding whitespace share an
// entry. No eviction: scope is one interactive session.
#[derive(Debug, Default)]
pub struct QueryCache {
    entries: HashMap<String, Vec<Paper>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn normalize(query: &str) -> String {
        query.trim().to_lowercase()
    }

    pub fn get(&self, key: &str) -> Option<&Vec<Paper>> {
        self.entries.get(key)
    }

    /// Stores a completed session's records. Sessions that produced nothing
    /// leave no trace; a partial set from a failed stream is still worth
    /// serving on a repeat query.
    pub fn put(&mut self, key: String, records: Vec<Paper>) {
        if records.is_empty() {
            return;
        }
        self.entries.insert(key, records);
    }
}
