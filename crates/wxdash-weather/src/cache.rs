//! In-memory TTL cache for validated records.
//!
//! Expiry is lazy: an entry is dropped the first time it is read at or
//! after its deadline. Each entry carries its own TTL so sun-time records
//! can expire at the next sunrise or sunset.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    inserted_at: DateTime<Utc>,
    ttl: Duration,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.inserted_at);
        // A clock stepping backwards leaves the entry alive
        match age.to_std() {
            Ok(age) => age >= self.ttl,
            Err(_) => false,
        }
    }
}

pub struct TtlCache<K, V> {
    default_ttl: Duration,
    capacity: Option<usize>,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<K, Entry<V>>>,
}

impl<K, V> std::fmt::Debug for TtlCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("default_ttl", &self.default_ttl)
            .field("capacity", &self.capacity)
            .field("len", &self.entries.lock().len())
            .finish()
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            default_ttl,
            capacity: None,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Bound the number of entries; inserting past it evicts the oldest.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity.max(1));
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Value for `key` if present and not expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    pub fn insert(&self, key: K, value: V) {
        self.put(key, value, self.default_ttl);
    }

    /// Store `value`, replacing any previous entry and restarting its TTL.
    pub fn put(&self, key: K, value: V, ttl: Duration) {
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        if let Some(capacity) = self.capacity {
            if !entries.contains_key(&key) && entries.len() >= capacity {
                entries.retain(|_, entry| !entry.is_expired(now));
                if entries.len() >= capacity {
                    let oldest = entries
                        .iter()
                        .min_by_key(|(_, entry)| entry.inserted_at)
                        .map(|(k, _)| k.clone());
                    if let Some(oldest) = oldest {
                        entries.remove(&oldest);
                    }
                }
            }
        }

        entries.insert(
            key,
            Entry {
                value,
                inserted_at: now,
                ttl,
            },
        );
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.lock().remove(key).map(|entry| entry.value)
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Entry count, including expired entries not yet read.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
