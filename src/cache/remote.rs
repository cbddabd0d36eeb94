//! Redis cache backend over a reconnecting connection manager.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::{Client, RedisError, aio::ConnectionManager, cmd};

use super::{
    backend::{CacheBackend, CacheError},
    keys::KeyPattern,
};

/// Keys requested per `SCAN` round trip.
const SCAN_COUNT: usize = 200;

#[derive(Clone)]
pub struct RedisBackend {
    connection: ConnectionManager,
}

impl RedisBackend {
    /// Open a managed connection; fails when the server cannot be reached.
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = Client::open(url).map_err(unavailable)?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(unavailable)?;
        Ok(Self { connection })
    }
}

fn unavailable(err: RedisError) -> CacheError {
    CacheError::unavailable(err.to_string())
}

/// `PX` argument for a TTL; Redis rejects zero.
fn expiry_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let mut conn = self.connection.clone();
        let value: Option<Vec<u8>> = cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(value.map(Bytes::from))
    }

    async fn set_ex(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let () = cmd("SET")
            .arg(key)
            .arg(value.to_vec())
            .arg("PX")
            .arg(expiry_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    /// Walks the keyspace with `SCAN MATCH`; never issues `KEYS`.
    async fn keys(&self, pattern: &KeyPattern) -> Result<Vec<String>, CacheError> {
        let mut conn = self.connection.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern.as_str())
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await
                .map_err(unavailable)?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        // SCAN may report a key more than once.
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut command = cmd("DEL");
        for key in keys {
            command.arg(key.as_str());
        }
        let mut conn = self.connection.clone();
        let removed: u64 = command
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(removed)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let _: String = cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn malformed_url_is_unavailable() {
        let result = RedisBackend::connect("definitely not a url").await;
        assert!(matches!(result, Err(CacheError::Unavailable(_))));
    }

    #[test]
    fn expiry_is_at_least_one_millisecond() {
        assert_eq!(expiry_millis(Duration::ZERO), 1);
        assert_eq!(expiry_millis(Duration::from_secs(300)), 300_000);
    }
}
