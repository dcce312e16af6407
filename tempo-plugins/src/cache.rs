//! Time-to-live cache for plugin data.

use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use tempo_core::Clock;

struct Entry<V> {
    stored_at: DateTime<Utc>,
    value: V,
}

/// Entries are fresh while `now - stored_at < ttl`. A lookup drops its own
/// stale entry and every insert sweeps all stale entries, so the map never
/// holds more than what was stored within one ttl.
pub struct TtlCache<K, V> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<K, Entry<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Entry<V>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.lock();
        match entries.get(key) {
            Some(e) if now - e.stored_at < self.ttl => Some(e.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: K, value: V) {
        let stored_at = self.clock.now();
        let ttl = self.ttl;
        let mut entries = self.lock();
        entries.retain(|_, e| stored_at - e.stored_at < ttl);
        entries.insert(key, Entry { stored_at, value });
    }

    /// Drop every stale entry.
    pub fn purge_expired(&self) {
        let now = self.clock.now();
        let ttl = self.ttl;
        self.lock().retain(|_, e| now - e.stored_at < ttl);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Stable cache key for a JSON context: object keys sorted at every level.
pub fn canonical_key(context: &Value) -> String {
    canonicalize(context).to_string()
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let sorted: Map<String, Value> = keys
                .into_iter()
                .map(|k| (k.clone(), canonicalize(&map[k])))
                .collect();
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use tempo_core::FixedClock;

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 2, 23, 9, 0, 0).unwrap()))
    }

    #[test]
    fn test_entries_expire_after_ttl() {
        let clock = clock();
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::minutes(5), clock.clone());
        cache.insert("k".into(), 7);

        clock.advance(Duration::minutes(4) + Duration::seconds(59));
        assert_eq!(cache.get(&"k".to_string()), Some(7));

        clock.advance(Duration::seconds(1));
        assert_eq!(cache.get(&"k".to_string()), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_purge_drops_only_stale_entries() {
        let clock = clock();
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::minutes(5), clock.clone());
        cache.insert("old", 1);
        clock.advance(Duration::minutes(3));
        cache.insert("new", 2);
        clock.advance(Duration::minutes(3));

        cache.purge_expired();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"new"), Some(2));
    }

    #[test]
    fn test_insert_sweeps_stale_entries() {
        let clock = clock();
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::minutes(5), clock.clone());
        for i in 0..100 {
            cache.insert(format!("u{i}"), i);
        }
        assert_eq!(cache.len(), 100);

        clock.advance(Duration::hours(24));
        cache.insert("fresh".into(), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_canonical_key_ignores_key_order() {
        let a = json!({"b": 1, "a": {"y": [1, 2], "x": null}});
        let b = json!({"a": {"x": null, "y": [1, 2]}, "b": 1});
        assert_eq!(canonical_key(&a), canonical_key(&b));
        assert_ne!(canonical_key(&a), canonical_key(&json!({"b": 2})));
    }
}
