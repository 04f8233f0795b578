use std::sync::Mutex;

use rand::Rng;

use crate::sync_ext::MutexExt;

/// Least-used selection over a set of values (API base URLs, bot tokens).
/// Ties are broken uniformly at random so concurrent load spreads fairly;
/// under single-threaded get/increment cycles the policy degenerates to
/// round-robin.
pub struct EndpointPool {
    entries: Mutex<Vec<PoolEntry>>,
}

#[derive(Debug, Clone)]
struct PoolEntry {
    value: String,
    use_count: u64,
}

impl EndpointPool {
    pub fn new<I>(values: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut entries: Vec<PoolEntry> = Vec::new();
        for value in values {
            let value = value.trim().to_string();
            if value.is_empty() || entries.iter().any(|e| e.value == value) {
                continue;
            }
            entries.push(PoolEntry {
                value,
                use_count: 0,
            });
        }
        Self {
            entries: Mutex::new(entries),
        }
    }

    /// A value with the minimum use count, or None for an exhausted pool.
    pub fn get(&self) -> Option<String> {
        let entries = self.entries.lock_unpoisoned();
        let min = entries.iter().map(|e| e.use_count).min()?;
        let ties: Vec<&PoolEntry> = entries.iter().filter(|e| e.use_count == min).collect();
        let pick = if ties.len() == 1 {
            0
        } else {
            rand::thread_rng().gen_range(0..ties.len())
        };
        Some(ties[pick].value.clone())
    }

    /// Bump the use count. A no-op for the empty string or unknown values.
    pub fn increment(&self, value: &str) {
        if value.is_empty() {
            return;
        }
        let mut entries = self.entries.lock_unpoisoned();
        if let Some(entry) = entries.iter_mut().find(|e| e.value == value) {
            entry.use_count = entry.use_count.saturating_add(1);
        }
    }

    /// Quarantine a value until explicit reinstatement (there is none; a
    /// removed credential stays out for the process lifetime).
    pub fn remove(&self, value: &str) {
        let mut entries = self.entries.lock_unpoisoned();
        entries.retain(|e| e.value != value);
    }

    pub fn len(&self) -> usize {
        self.entries.lock_unpoisoned().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn get_returns_none_for_empty_pool() {
        let pool = EndpointPool::new(Vec::new());
        assert!(pool.get().is_none());
        assert!(pool.is_empty());
    }

    #[test]
    fn constructor_skips_blank_and_duplicate_values() {
        let pool = EndpointPool::new(vec![
            "a".to_string(),
            "  ".to_string(),
            "a".to_string(),
            "b".to_string(),
        ]);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn get_and_increment_cycle_behaves_like_round_robin() {
        let pool = EndpointPool::new(vec!["a".to_string(), "b".to_string()]);
        let mut counts = std::collections::HashMap::new();
        for _ in 0..10 {
            let picked = pool.get().expect("non-empty pool");
            pool.increment(&picked);
            *counts.entry(picked).or_insert(0u32) += 1;
        }
        // Least-used selection keeps the two values within one use of each
        // other, so ten cycles land exactly five on each.
        assert_eq!(counts.get("a"), Some(&5));
        assert_eq!(counts.get("b"), Some(&5));
    }

    #[test]
    fn tie_break_eventually_visits_every_value() {
        let pool = EndpointPool::new(vec!["a".to_string(), "b".to_string()]);
        let mut seen = HashSet::new();
        for _ in 0..256 {
            seen.insert(pool.get().expect("non-empty pool"));
            if seen.len() == 2 {
                break;
            }
        }
        assert_eq!(seen.len(), 2, "uniform tie-break must reach both values");
    }

    #[test]
    fn remove_quarantines_a_value_permanently() {
        let pool = EndpointPool::new(vec!["good".to_string(), "bad".to_string()]);
        pool.remove("bad");
        for _ in 0..8 {
            assert_eq!(pool.get().as_deref(), Some("good"));
            pool.increment("good");
        }
        pool.remove("good");
        assert!(pool.get().is_none());
    }

    #[test]
    fn increment_ignores_empty_and_unknown_values() {
        let pool = EndpointPool::new(vec!["a".to_string()]);
        pool.increment("");
        pool.increment("missing");
        assert_eq!(pool.get().as_deref(), Some("a"));
    }
}
