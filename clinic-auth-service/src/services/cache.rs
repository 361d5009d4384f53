use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{aio::ConnectionManager, Client};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

/// Lifetime of a presence entry.
pub const PRESENCE_TTL_SECONDS: i64 = 3600;

/// Key-value cache with expiry plus the access-token blacklist.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn set_cache(
        &self,
        key: &str,
        value: &str,
        expiry_seconds: i64,
    ) -> Result<(), anyhow::Error>;
    async fn get_cache(&self, key: &str) -> Result<Option<String>, anyhow::Error>;
    async fn blacklist_token(
        &self,
        token_jti: &str,
        expiry_seconds: i64,
    ) -> Result<(), anyhow::Error>;
    async fn is_blacklisted(&self, token_jti: &str) -> Result<bool, anyhow::Error>;
    async fn health_check(&self) -> Result<(), anyhow::Error>;
}

/// Presence snapshot cached per user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceEntry {
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
}

pub fn presence_key(user_id: Uuid) -> String {
    format!("user_status_{}", user_id)
}

fn blacklist_key(token_jti: &str) -> String {
    format!("blacklist:{}", token_jti)
}

#[derive(Clone)]
pub struct RedisService {
    _client: Client,
    manager: ConnectionManager,
}

impl RedisService {
    pub async fn new(config: &crate::config::RedisConfig) -> Result<Self, anyhow::Error> {
        tracing::info!(url = %config.url, "Connecting to Redis");
        let client = Client::open(config.url.clone())?;

        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            anyhow::anyhow!("Failed to connect to Redis: {}", e)
        })?;

        tracing::info!("Successfully connected to Redis");

        Ok(Self {
            _client: client,
            manager,
        })
    }
}

#[async_trait]
impl CacheStore for RedisService {
    async fn set_cache(
        &self,
        key: &str,
        value: &str,
        expiry_seconds: i64,
    ) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(expiry_seconds.max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to set cache: {}", e))
    }

    async fn get_cache(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to get cache: {}", e))
    }

    /// Revoke an access token until it would have expired anyway.
    async fn blacklist_token(
        &self,
        token_jti: &str,
        expiry_seconds: i64,
    ) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("SET")
            .arg(blacklist_key(token_jti))
            .arg("revoked")
            .arg("EX")
            .arg(expiry_seconds.max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to blacklist token: {}", e))
    }

    async fn is_blacklisted(&self, token_jti: &str) -> Result<bool, anyhow::Error> {
        let mut conn = self.manager.clone();
        let exists: bool = redis::cmd("EXISTS")
            .arg(blacklist_key(token_jti))
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to check blacklist: {}", e))?;

        Ok(exists)
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Redis health check failed: {}", e))
    }
}

/// In-process cache for tests; expiry is not modelled.
#[derive(Default)]
pub struct MockCache {
    blacklisted_tokens: Mutex<HashSet<String>>,
    entries: Mutex<HashMap<String, String>>,
    failing: AtomicBool,
}

impl MockCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail, as if the cache were unreachable.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), anyhow::Error> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("cache unavailable");
        }
        Ok(())
    }

    fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl CacheStore for MockCache {
    async fn set_cache(
        &self,
        key: &str,
        value: &str,
        _expiry_seconds: i64,
    ) -> Result<(), anyhow::Error> {
        self.check()?;
        Self::lock(&self.entries).insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_cache(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        self.check()?;
        Ok(Self::lock(&self.entries).get(key).cloned())
    }

    async fn blacklist_token(
        &self,
        token_jti: &str,
        _expiry_seconds: i64,
    ) -> Result<(), anyhow::Error> {
        self.check()?;
        Self::lock(&self.blacklisted_tokens).insert(token_jti.to_string());
        Ok(())
    }

    async fn is_blacklisted(&self, token_jti: &str) -> Result<bool, anyhow::Error> {
        self.check()?;
        Ok(Self::lock(&self.blacklisted_tokens).contains(token_jti))
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        self.check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_key_format() {
        let id = Uuid::nil();
        assert_eq!(
            presence_key(id),
            "user_status_00000000-0000-0000-0000-000000000000"
        );
    }

    #[tokio::test]
    async fn mock_cache_blacklists() {
        let cache = MockCache::new();
        assert!(!cache.is_blacklisted("jti-1").await.unwrap());
        cache.blacklist_token("jti-1", 60).await.unwrap();
        assert!(cache.is_blacklisted("jti-1").await.unwrap());
    }

    #[tokio::test]
    async fn failing_mock_cache_errors() {
        let cache = MockCache::new();
        cache.set_failing(true);
        assert!(cache.set_cache("k", "v", 10).await.is_err());
        assert!(cache.is_blacklisted("jti").await.is_err());
        assert!(cache.health_check().await.is_err());
    }
}
