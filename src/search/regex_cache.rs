//! LRU-bounded compile cache keyed by `(pattern, case_sensitive)`, so a
//! repeated regex query across many `search()` calls doesn't pay
//! compilation cost twice (spec.md §4.7).

use std::collections::HashMap;
use std::sync::Arc;

use regex::{Regex, RegexBuilder};

use crate::error::{CodeloomError, Result};

pub struct RegexCache {
    entries: HashMap<(String, bool), Arc<Regex>>,
    order: Vec<(String, bool)>,
    capacity: usize,
}

impl RegexCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
            capacity,
        }
    }

    pub fn get_or_compile(&mut self, pattern: &str, case_sensitive: bool) -> Result<Arc<Regex>> {
        let key = (pattern.to_string(), case_sensitive);
        if let Some(regex) = self.entries.get(&key) {
            self.touch(&key);
            return Ok(Arc::clone(regex));
        }

        let compiled = RegexBuilder::new(pattern)
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|e| CodeloomError::InvalidRegex(e.to_string()))?;
        let compiled = Arc::new(compiled);

        if self.entries.len() >= self.capacity {
            if let Some(lru_key) = self.order.first().cloned() {
                self.entries.remove(&lru_key);
                self.order.remove(0);
            }
        }
        self.entries.insert(key.clone(), Arc::clone(&compiled));
        self.order.push(key);
        Ok(compiled)
    }

    fn touch(&mut self, key: &(String, bool)) {
        self.order.retain(|k| k != key);
        self.order.push(key.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used_entry_past_capacity() {
        let mut cache = RegexCache::new(2);
        cache.get_or_compile("a+", true).unwrap();
        cache.get_or_compile("b+", true).unwrap();
        cache.get_or_compile("a+", true).unwrap(); // touch a+
        cache.get_or_compile("c+", true).unwrap(); // evicts b+
        assert!(cache.entries.contains_key(&("a+".to_string(), true)));
        assert!(!cache.entries.contains_key(&("b+".to_string(), true)));
        assert!(cache.entries.contains_key(&("c+".to_string(), true)));
    }
}
