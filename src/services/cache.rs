//! Redis read-through cache
//!
//! Values are stored as JSON with a TTL. Every failure is logged and
//! swallowed: a cache outage degrades to database reads, never to errors.

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Redis cache client with connection pooling.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    default_ttl: Duration,
}

impl RedisCache {
    pub async fn new(redis_url: &str, default_ttl_seconds: u64) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;

        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        tracing::info!("Redis cache connected");

        Ok(Self {
            conn,
            default_ttl: Duration::from_secs(default_ttl_seconds),
        })
    }

    #[instrument(skip(self), fields(cache_hit))]
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut conn = self.conn.clone();

        let hit = match conn.get::<_, Option<String>>(key).await {
            Ok(Some(data)) => match serde_json::from_str(&data) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(key = key, error = %e, "Discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key = key, error = %e, "Redis get failed");
                None
            }
        };

        tracing::Span::current().record("cache_hit", hit.is_some());
        hit
    }

    /// Store with the default TTL; errors are logged only.
    pub async fn put<T: Serialize>(&self, key: &str, value: &T) {
        self.put_with_ttl(key, value, self.default_ttl).await
    }

    async fn put_with_ttl<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        if let Err(e) = self.set_with_ttl(key, value, ttl).await {
            warn!(key = key, error = %e, "Cache write failed");
        }
    }

    #[instrument(skip(self, value))]
    async fn set_with_ttl<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();

        let data = serde_json::to_string(value).context("Failed to serialize value for cache")?;

        conn.set_ex::<_, _, ()>(key, data, ttl.as_secs())
            .await
            .context("Failed to set cache value")?;

        debug!(key = key, ttl_secs = ttl.as_secs(), "Cached value");
        Ok(())
    }

    /// Drop one key; errors are logged only.
    pub async fn invalidate(&self, key: &str) {
        let mut conn = self.conn.clone();
        if let Err(e) = conn.del::<_, i32>(key).await {
            warn!(key = key, error = %e, "Cache invalidation failed");
        }
    }

    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis health check failed")?;
        Ok(())
    }
}

/// Cache key builders
pub mod keys {
    use uuid::Uuid;

    /// Role and staff flag used by the auth extractors
    pub fn actor(user_id: Uuid) -> String {
        format!("actor:user:{}", user_id)
    }

    pub fn profile(user_id: Uuid) -> String {
        format!("profile:user:{}", user_id)
    }

    /// Public list of active subscription plans
    pub fn active_plans() -> String {
        "plans:active".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::keys;
    use uuid::Uuid;

    #[test]
    fn per_user_keys_are_distinct() {
        let id = Uuid::new_v4();
        assert_ne!(keys::actor(id), keys::profile(id));
        assert!(keys::actor(id).ends_with(&id.to_string()));
        assert_ne!(keys::actor(id), keys::actor(Uuid::new_v4()));
    }
}
