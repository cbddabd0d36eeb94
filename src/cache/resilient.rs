//! Retry/backoff guard around a cache backend.
//!
//! After a backend failure every call short-circuits as unavailable until an
//! exponentially growing delay has passed. Once more than `max_retries`
//! consecutive failures have been seen the backend stays unavailable until
//! [`ResilientBackend::reset`] is called. A success clears the failure count.

use std::{future::Future, sync::Mutex, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::Instant;
use tracing::{info, warn};

use super::{
    backend::{CacheBackend, CacheError},
    config::CacheConfig,
    keys::KeyPattern,
    lock::lock_or_recover,
};

const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.retry_delay(),
            max_delay: MAX_BACKOFF.max(config.retry_delay()),
        }
    }

    /// Delay after the `failures`-th consecutive failure (1-based).
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        self.base_delay
            .checked_mul(1 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

#[derive(Debug, Default)]
struct GuardState {
    failures: u32,
    retry_at: Option<Instant>,
}

pub struct ResilientBackend<B> {
    inner: B,
    policy: RetryPolicy,
    state: Mutex<GuardState>,
}

impl<B: CacheBackend> ResilientBackend<B> {
    pub fn new(inner: B, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            state: Mutex::new(GuardState::default()),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        lock_or_recover(&self.state, "resilient").failures > self.policy.max_retries
    }

    /// Clear the failure history so the next call reaches the backend.
    pub fn reset(&self) {
        *lock_or_recover(&self.state, "resilient") = GuardState::default();
        info!(target = "icelog::cache::backend", "cache backend guard reset");
    }

    fn admit(&self) -> Result<(), CacheError> {
        let state = lock_or_recover(&self.state, "resilient");
        if state.failures > self.policy.max_retries {
            return Err(CacheError::unavailable("retry budget exhausted"));
        }
        match state.retry_at {
            Some(at) if Instant::now() < at => Err(CacheError::unavailable("backing off")),
            _ => Ok(()),
        }
    }

    fn record<T>(&self, op: &'static str, result: &Result<T, CacheError>) {
        let mut state = lock_or_recover(&self.state, "resilient");
        match result {
            Ok(_) => {
                if state.failures > 0 {
                    info!(
                        target = "icelog::cache::backend",
                        op,
                        previous_failures = state.failures,
                        "cache backend recovered"
                    );
                }
                *state = GuardState::default();
            }
            Err(CacheError::Unavailable(reason)) => {
                state.failures = state.failures.saturating_add(1);
                if state.failures > self.policy.max_retries {
                    state.retry_at = None;
                    warn!(
                        target = "icelog::cache::backend",
                        op,
                        failures = state.failures,
                        reason = %reason,
                        "cache backend retries exhausted; bypassing cache"
                    );
                } else {
                    let delay = self.policy.delay_for(state.failures);
                    state.retry_at = Some(Instant::now() + delay);
                    warn!(
                        target = "icelog::cache::backend",
                        op,
                        failures = state.failures,
                        retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        reason = %reason,
                        "cache backend call failed; backing off"
                    );
                }
            }
            Err(CacheError::Serialization(_)) => {}
        }
    }

    async fn guard<T, F>(&self, op: &'static str, call: F) -> Result<T, CacheError>
    where
        F: Future<Output = Result<T, CacheError>> + Send,
    {
        self.admit()?;
        let result = call.await;
        self.record(op, &result);
        result
    }
}

#[async_trait]
impl<B: CacheBackend> CacheBackend for ResilientBackend<B> {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        self.guard("get", self.inner.get(key)).await
    }

    async fn set_ex(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        self.guard("set_ex", self.inner.set_ex(key, value, ttl)).await
    }

    async fn keys(&self, pattern: &KeyPattern) -> Result<Vec<String>, CacheError> {
        self.guard("keys", self.inner.keys(pattern)).await
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64, CacheError> {
        self.guard("delete_many", self.inner.delete_many(keys)).await
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.guard("ping", self.inner.ping()).await
    }
}
