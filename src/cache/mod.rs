//! Read-through response cache.
//!
//! - [`CacheAside`] wraps read handlers and sweeps keys after writes.
//! - [`CacheBackend`] is the key-value contract (`get`, `set_ex`, `keys`,
//!   `delete_many`); [`MemoryBackend`] implements it in-process,
//!   [`RedisBackend`] over a shared Redis, and [`ResilientBackend`] adds
//!   retry/backoff around either.
//! - Setting `url` selects Redis; an unreachable server falls back to memory.
//!
//! ```toml
//! [cache]
//! enabled = true
//! ttl_seconds = 300
//! key_prefix = "cache:"
//! # url = "redis://localhost:6379/0"
//! # ... see config.rs for all options
//! ```

mod aside;
mod backend;
mod config;
mod keys;
mod lock;
mod memory;
mod remote;
mod resilient;

pub use aside::CacheAside;
pub use backend::{CacheBackend, CacheError};
pub use config::CacheConfig;
pub use keys::{CacheKey, KeyPattern, canonical_query};
pub use memory::MemoryBackend;
pub use remote::RedisBackend;
pub use resilient::{ResilientBackend, RetryPolicy};
