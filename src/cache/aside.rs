//! Cache-aside orchestration for read endpoints.
//!
//! [`CacheAside::read`] wraps the computation that produces a response
//! payload: a hit within TTL skips the computation, a miss runs it and stores
//! the successful result. [`CacheAside::invalidate`] sweeps keys after
//! writes. Backend failures on either path are logged and otherwise ignored.

use std::{future::Future, sync::Arc};

use bytes::Bytes;
use metrics::counter;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, info, warn};

use crate::domain::readings::ReadingId;

use super::{
    backend::{CacheBackend, CacheError},
    config::CacheConfig,
    keys::{CacheKey, KeyPattern},
    memory::MemoryBackend,
    remote::RedisBackend,
    resilient::{ResilientBackend, RetryPolicy},
};

#[derive(Clone)]
pub struct CacheAside {
    backend: Arc<dyn CacheBackend>,
    config: Arc<CacheConfig>,
}

impl CacheAside {
    pub fn new(backend: Arc<dyn CacheBackend>, config: CacheConfig) -> Self {
        Self {
            backend,
            config: Arc::new(config),
        }
    }

    /// `backend` behind the retry/backoff guard.
    pub fn guarded<B: CacheBackend + 'static>(backend: B, config: CacheConfig) -> Self {
        let policy = RetryPolicy::from_config(&config);
        Self::new(Arc::new(ResilientBackend::new(backend, policy)), config)
    }

    pub fn in_memory(config: CacheConfig) -> Self {
        let backend = MemoryBackend::new(&config);
        Self::guarded(backend, config)
    }

    /// Redis when `url` is set and answers at startup, otherwise in-process.
    pub async fn connect(url: Option<&str>, config: CacheConfig) -> Self {
        let Some(url) = url.filter(|_| config.enabled) else {
            return Self::in_memory(config);
        };

        match RedisBackend::connect(url).await {
            Ok(backend) => {
                info!(target = "icelog::cache", "using redis cache backend");
                Self::guarded(backend, config)
            }
            Err(err) => {
                warn!(
                    target = "icelog::cache",
                    error = %err,
                    "redis unreachable; falling back to in-process cache"
                );
                Self::in_memory(config)
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Round-trip to the backend; always succeeds when caching is disabled.
    pub async fn ping(&self) -> Result<(), CacheError> {
        if !self.config.enabled {
            return Ok(());
        }
        self.backend.ping().await
    }

    pub fn key_for(&self, path: &str, query: Option<&str>) -> CacheKey {
        CacheKey::for_request(&self.config.key_prefix, path, query)
    }

    /// Patterns swept after a create or batch insert.
    pub fn collection_patterns(&self, collection_path: &str) -> Vec<KeyPattern> {
        vec![KeyPattern::collection(&self.config.key_prefix, collection_path)]
    }

    /// Patterns swept after an update or delete of `id`.
    pub fn item_patterns(&self, collection_path: &str, id: ReadingId) -> Vec<KeyPattern> {
        let mut patterns = self.collection_patterns(collection_path);
        patterns.extend(KeyPattern::item(&self.config.key_prefix, collection_path, id));
        patterns
    }

    pub async fn read<T, E, F, Fut>(&self, key: &CacheKey, compute: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.config.enabled {
            return compute().await;
        }

        if let Some(value) = self.lookup::<T>(key).await {
            counter!("icelog_cache_hit_total").increment(1);
            debug!(target = "icelog::cache", key = %key, "cache hit");
            return Ok(value);
        }

        counter!("icelog_cache_miss_total").increment(1);
        debug!(target = "icelog::cache", key = %key, "cache miss");

        let value = compute().await?;
        self.store(key, &value).await;
        Ok(value)
    }

    /// Remove every key matching any pattern; returns the number removed.
    pub async fn invalidate(&self, patterns: &[KeyPattern]) -> u64 {
        if !self.config.enabled {
            return 0;
        }

        let mut doomed = Vec::new();
        for pattern in patterns {
            match self.backend.keys(pattern).await {
                Ok(keys) => doomed.extend(keys),
                Err(err) => self.report("keys", &err),
            }
        }
        doomed.sort();
        doomed.dedup();

        if doomed.is_empty() {
            return 0;
        }

        match self.backend.delete_many(&doomed).await {
            Ok(removed) => {
                counter!("icelog_cache_invalidated_total").increment(removed);
                let swept: Vec<&str> = patterns.iter().map(KeyPattern::as_str).collect();
                debug!(
                    target = "icelog::cache",
                    removed,
                    patterns = ?swept,
                    "cache entries invalidated"
                );
                removed
            }
            Err(err) => {
                self.report("delete_many", &err);
                0
            }
        }
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let bytes = match self.backend.get(key.as_str()).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(err) => {
                self.report("get", &err);
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(err) => {
                self.report("decode", &CacheError::from(err));
                None
            }
        }
    }

    async fn store<T: Serialize>(&self, key: &CacheKey, value: &T) {
        let payload = match serde_json::to_vec(value) {
            Ok(payload) => Bytes::from(payload),
            Err(err) => {
                self.report("encode", &CacheError::from(err));
                return;
            }
        };

        match self
            .backend
            .set_ex(key.as_str(), payload, self.config.ttl())
            .await
        {
            Ok(()) => counter!("icelog_cache_store_total").increment(1),
            Err(err) => self.report("set_ex", &err),
        }
    }

    fn report(&self, op: &'static str, err: &CacheError) {
        counter!("icelog_cache_error_total").increment(1);
        warn!(
            target = "icelog::cache",
            op,
            error = %err,
            "cache operation failed; continuing without cache"
        );
    }
}
