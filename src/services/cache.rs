//! Redis cache for carts and vendor menus.
//!
//! Values are stored as JSON with a TTL. `get` never fails the caller: a Redis
//! error or an undecodable value is logged and treated as a miss. Callers that
//! write back what they read use `try_get`, which surfaces Redis errors.

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

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

    #[instrument(skip(self))]
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.try_get(key).await {
            Ok(hit) => hit,
            Err(e) => {
                error!(key = key, error = %e, "Redis get error");
                None
            }
        }
    }

    /// Like `get`, but a Redis failure is returned instead of read as a miss.
    /// An undecodable value is still a miss.
    #[instrument(skip(self), fields(cache_hit))]
    pub async fn try_get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.conn.clone();

        let data = conn
            .get::<_, Option<String>>(key)
            .await
            .context("Failed to read cache value")?;

        let hit = data.and_then(|data| match serde_json::from_str(&data) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = key, error = %e, "Failed to deserialize cached value");
                None
            }
        });

        tracing::Span::current().record("cache_hit", hit.is_some());
        debug!(key = key, hit = hit.is_some(), "Cache lookup");
        Ok(hit)
    }

    /// Set a value with the default TTL.
    #[instrument(skip(self, value))]
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.set_with_ttl(key, value, self.default_ttl).await
    }

    #[instrument(skip(self, value))]
    pub async fn set_with_ttl<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<()> {
        let mut conn = self.conn.clone();

        let data = serde_json::to_string(value).context("Failed to serialize value for cache")?;

        conn.set_ex::<_, _, ()>(key, data, ttl.as_secs())
            .await
            .context("Failed to set cache value")?;

        debug!(key = key, ttl_secs = ttl.as_secs(), "Cached value");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();

        let deleted: i32 = conn.del(key).await.context("Failed to delete cache key")?;

        debug!(key = key, deleted = deleted > 0, "Cache delete");
        Ok(deleted > 0)
    }

    /// Delete all keys matching a glob pattern (e.g. "menu:vendor:<id>:*").
    #[instrument(skip(self))]
    pub async fn delete_pattern(&self, pattern: &str) -> Result<usize> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut deleted = 0usize;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .cursor_arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(500)
                .query_async(&mut conn)
                .await
                .context("Failed to scan cache keys")?;

            if !keys.is_empty() {
                let n: i32 = conn.del(&keys).await.context("Failed to delete cache keys")?;
                deleted += n.max(0) as usize;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(pattern = pattern, deleted = deleted, "Cache pattern delete");
        Ok(deleted)
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

/// Cache key builders.
pub mod keys {
    use uuid::Uuid;

    /// Server-side cart of a user
    pub fn cart(user_id: Uuid) -> String {
        format!("cart:user:{}", user_id)
    }

    /// Storefront menu of a vendor
    pub fn vendor_menu(vendor_id: Uuid, include_unavailable: bool) -> String {
        let scope = if include_unavailable { "all" } else { "available" };
        format!("menu:vendor:{}:{}", vendor_id, scope)
    }

    /// Every cached menu variant of a vendor
    pub fn vendor_menu_pattern(vendor_id: Uuid) -> String {
        format!("menu:vendor:{}:*", vendor_id)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn menu_keys_match_their_pattern() {
            let vendor = Uuid::new_v4();
            let prefix = vendor_menu_pattern(vendor);
            let prefix = prefix.trim_end_matches('*');
            assert!(vendor_menu(vendor, true).starts_with(prefix));
            assert!(vendor_menu(vendor, false).starts_with(prefix));
            assert_ne!(vendor_menu(vendor, true), vendor_menu(vendor, false));
        }

        #[test]
        fn cart_key_is_per_user() {
            let user = Uuid::new_v4();
            assert_eq!(cart(user), format!("cart:user:{}", user));
        }
    }
}
