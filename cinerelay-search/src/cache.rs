//! Response cache for metadata lookups.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use cinerelay_core::config::CacheConfig;
use parking_lot::Mutex;
use serde_json::Value;

/// Storage for upstream JSON bodies keyed by upstream URL.
///
/// Implementations are shared across requests and must be internally
/// synchronized.
pub trait MetadataCache: Send + Sync {
    fn lookup(&self, key: &str) -> Option<Value>;

    fn store(&self, key: &str, value: Value);
}

/// Bounded in-memory cache whose entries expire after a fixed time to live.
///
/// Expired entries count as misses and are removed when next touched. When
/// the cache is full the oldest entry makes room for the new one.
#[derive(Debug)]
pub struct TtlCache {
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<String, (Instant, Value)>>,
}

impl TtlCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.ttl, config.max_entries)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn is_fresh(&self, inserted_at: Instant) -> bool {
        inserted_at.elapsed() < self.ttl
    }
}

impl MetadataCache for TtlCache {
    fn lookup(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock();
        let (inserted_at, value) = entries.get(key)?;
        if self.is_fresh(*inserted_at) {
            return Some(value.clone());
        }
        entries.remove(key);
        None
    }

    fn store(&self, key: &str, value: Value) {
        if self.max_entries == 0 {
            return;
        }

        let mut entries = self.entries.lock();
        if !entries.contains_key(key) && entries.len() >= self.max_entries {
            entries.retain(|_, (inserted_at, _)| inserted_at.elapsed() < self.ttl);
        }
        if !entries.contains_key(key) && entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, (inserted_at, _))| *inserted_at)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }
        entries.insert(key.to_string(), (Instant::now(), value));
    }
}
