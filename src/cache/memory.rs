//! In-process cache backend: a bounded LRU whose entries expire after their TTL.

use std::{sync::Mutex, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use metrics::counter;
use tokio::time::Instant;

use super::{
    backend::{CacheBackend, CacheError},
    config::CacheConfig,
    keys::KeyPattern,
    lock::lock_or_recover,
};

#[derive(Debug, Clone)]
struct Entry {
    value: Bytes,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

pub struct MemoryBackend {
    entries: Mutex<LruCache<String, Entry>>,
}

impl MemoryBackend {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(config.max_entries_non_zero())),
        }
    }

    pub fn len(&self) -> usize {
        lock_or_recover(&self.entries, "memory").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let now = Instant::now();
        let mut entries = lock_or_recover(&self.entries, "memory");
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.pop(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        let mut entries = lock_or_recover(&self.entries, "memory");
        if let Some((evicted, _)) = entries.push(key.to_string(), entry) {
            if evicted != key {
                counter!("icelog_cache_evict_total").increment(1);
            }
        }
        Ok(())
    }

    async fn keys(&self, pattern: &KeyPattern) -> Result<Vec<String>, CacheError> {
        let now = Instant::now();
        let entries = lock_or_recover(&self.entries, "memory");
        Ok(entries
            .iter()
            .filter(|(key, entry)| entry.is_live(now) && pattern.matches(key))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64, CacheError> {
        let mut entries = lock_or_recover(&self.entries, "memory");
        let removed = keys
            .iter()
            .filter(|key| entries.pop(key.as_str()).is_some())
            .count();
        Ok(removed as u64)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}
