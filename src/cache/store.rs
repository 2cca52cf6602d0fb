//! Cache store backends.
//!
//! Redis: shared remote store used in production.
//! Memory: process-local LRU store for development and tests.
//!
//! Both take un-namespaced keys and patterns and apply their [`Namespace`].

use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use tracing::debug;

use super::config::CacheConfig;
use super::error::CacheError;
use super::keys::{CacheKey, Namespace, glob_match};
use super::lock::{rw_read, rw_write};

const SCAN_BATCH: usize = 256;

/// Key-value store protocol required by the interceptor.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Point lookup.
    async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError>;

    /// Overwrite `key` with an expiring value.
    async fn set(&self, key: &CacheKey, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Every live key matching a glob `pattern`.
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<CacheKey>, CacheError>;

    /// Remove `keys`, returning how many existed.
    async fn bulk_delete(&self, keys: &[CacheKey]) -> Result<usize, CacheError>;
}

// ============================================================================
// Redis
// ============================================================================

/// Redis-backed store over a reconnecting connection manager.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    namespace: Namespace,
}

impl RedisStore {
    /// Connect to `url` (`redis://host:port/db`).
    pub async fn connect(url: &str, namespace: Namespace) -> Result<Self, CacheError> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        debug!(cache = "redis", namespace = namespace.as_str(), "connected");
        Ok(Self { conn, namespace })
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(self.namespace.qualify(key.as_str())).await?;
        Ok(value)
    }

    async fn set(&self, key: &CacheKey, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let seconds = ttl.as_secs().max(1);
        let _: () = conn
            .set_ex(self.namespace.qualify(key.as_str()), value, seconds)
            .await?;
        Ok(())
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<CacheKey>, CacheError> {
        let mut conn = self.conn.clone();
        let qualified = self.namespace.qualify(pattern);

        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&qualified)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            keys.extend(
                batch
                    .iter()
                    .filter_map(|raw| self.namespace.strip(raw))
                    .map(CacheKey::new),
            );

            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once while the keyspace rehashes.
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn bulk_delete(&self, keys: &[CacheKey]) -> Result<usize, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.clone();
        let qualified: Vec<String> = keys
            .iter()
            .map(|key| self.namespace.qualify(key.as_str()))
            .collect();
        let removed: usize = redis::cmd("UNLINK")
            .arg(&qualified)
            .query_async(&mut conn)
            .await?;
        Ok(removed)
    }
}

// ============================================================================
// Memory
// ============================================================================

#[derive(Clone)]
struct MemoryEntry {
    value: String,
    /// `None` when the ttl reaches past what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn new(value: &str, ttl: Duration) -> Self {
        Self {
            value: value.to_string(),
            expires_at: Instant::now().checked_add(ttl),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|expires_at| expires_at > now)
    }
}

/// In-process LRU store with per-entry expiry.
pub struct MemoryStore {
    entries: RwLock<LruCache<String, MemoryEntry>>,
    namespace: Namespace,
}

impl MemoryStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.memory_capacity_non_zero())),
            namespace: Namespace::new(config.namespace.clone()),
        }
    }

    /// Number of stored entries, expired ones included until touched.
    pub fn len(&self) -> usize {
        rw_read(&self.entries, "memory_len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError> {
        let qualified = self.namespace.qualify(key.as_str());
        let mut entries = rw_write(&self.entries, "memory_get");

        match entries.get(&qualified) {
            Some(entry) if entry.is_live(Instant::now()) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.pop(&qualified);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &CacheKey, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let entry = MemoryEntry::new(value, ttl);
        rw_write(&self.entries, "memory_set").put(self.namespace.qualify(key.as_str()), entry);
        Ok(())
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<CacheKey>, CacheError> {
        let qualified = self.namespace.qualify(pattern);
        let now = Instant::now();
        let entries = rw_read(&self.entries, "memory_scan");

        let mut keys: Vec<CacheKey> = entries
            .iter()
            .filter(|(raw, entry)| entry.is_live(now) && glob_match(&qualified, raw))
            .filter_map(|(raw, _)| self.namespace.strip(raw))
            .map(CacheKey::new)
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn bulk_delete(&self, keys: &[CacheKey]) -> Result<usize, CacheError> {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, "memory_bulk_delete");

        let removed = keys
            .iter()
            .filter_map(|key| entries.pop(&self.namespace.qualify(key.as_str())))
            .filter(|entry| entry.is_live(now))
            .count();
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    fn store() -> MemoryStore {
        MemoryStore::new(&CacheConfig {
            namespace: "test".to_string(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn memory_roundtrip() {
        let store = store();
        let key = CacheKey::single("Article", "1");

        assert!(store.get(&key).await.expect("get").is_none());

        store.set(&key, r#"{"id":1}"#, TTL).await.expect("set");
        assert_eq!(
            store.get(&key).await.expect("get").as_deref(),
            Some(r#"{"id":1}"#)
        );

        store.set(&key, r#"{"id":1,"v":2}"#, TTL).await.expect("overwrite");
        assert_eq!(
            store.get(&key).await.expect("get").as_deref(),
            Some(r#"{"id":1,"v":2}"#)
        );
    }

    #[tokio::test]
    async fn expired_entries_read_as_absent() {
        let store = store();
        let key = CacheKey::single("Article", "1");

        store.set(&key, "{}", Duration::ZERO).await.expect("set");

        assert!(store.get(&key).await.expect("get").is_none());
        assert!(store.is_empty());
        assert!(
            store
                .scan_keys("single:Article:*")
                .await
                .expect("scan")
                .is_empty()
        );
    }

    #[tokio::test]
    async fn unrepresentable_ttl_never_expires() {
        let store = store();
        let key = CacheKey::single("Article", "1");

        store
            .set(&key, "{}", Duration::from_secs(u64::MAX))
            .await
            .expect("set");

        assert_eq!(store.get(&key).await.expect("get").as_deref(), Some("{}"));
        assert_eq!(
            store.scan_keys("single:Article:*").await.expect("scan"),
            vec![key.clone()]
        );
        assert_eq!(store.bulk_delete(&[key]).await.expect("delete"), 1);
    }

    #[tokio::test]
    async fn scan_matches_within_namespace_only() {
        let config = CacheConfig {
            namespace: "test".to_string(),
            ..Default::default()
        };
        let store = MemoryStore::new(&config);
        let other = CacheKey::new("paginated:Article:page-9:limit-9");

        store
            .set(&CacheKey::new("paginated:Article:page-0:limit-10"), "[]", TTL)
            .await
            .expect("set");
        store
            .set(&CacheKey::new("paginated:Article:page-1:limit-10"), "[]", TTL)
            .await
            .expect("set");
        store
            .set(&CacheKey::new("paginated:Author:page-0:limit-10"), "[]", TTL)
            .await
            .expect("set");
        // Same logical key under a foreign namespace must stay invisible.
        rw_write(&store.entries, "test").put(
            format!("other:{other}"),
            MemoryEntry::new("[]", TTL),
        );

        let keys = store.scan_keys("paginated:Article:*").await.expect("scan");
        assert_eq!(
            keys,
            vec![
                CacheKey::new("paginated:Article:page-0:limit-10"),
                CacheKey::new("paginated:Article:page-1:limit-10"),
            ]
        );
    }

    #[tokio::test]
    async fn bulk_delete_counts_existing_keys() {
        let store = store();
        let a = CacheKey::single("Article", "1");
        let b = CacheKey::single("Article", "2");
        let missing = CacheKey::single("Article", "3");

        store.set(&a, "{}", TTL).await.expect("set");
        store.set(&b, "{}", TTL).await.expect("set");

        let removed = store
            .bulk_delete(&[a.clone(), b.clone(), missing])
            .await
            .expect("delete");
        assert_eq!(removed, 2);
        assert!(store.get(&a).await.expect("get").is_none());
        assert!(store.get(&b).await.expect("get").is_none());
        assert_eq!(store.bulk_delete(&[]).await.expect("noop"), 0);
    }

    #[tokio::test]
    async fn lru_eviction_respects_capacity() {
        let store = MemoryStore::new(&CacheConfig {
            memory_capacity: 2,
            ..Default::default()
        });
        let first = CacheKey::single("Article", "1");
        let second = CacheKey::single("Article", "2");
        let third = CacheKey::single("Article", "3");

        store.set(&first, "1", TTL).await.expect("set");
        store.set(&second, "2", TTL).await.expect("set");
        store.set(&third, "3", TTL).await.expect("set");

        assert!(store.get(&first).await.expect("get").is_none());
        assert!(store.get(&second).await.expect("get").is_some());
        assert!(store.get(&third).await.expect("get").is_some());
    }

    #[tokio::test]
    async fn memory_store_recovers_from_poisoned_lock() {
        let store = store();

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = store
                .entries
                .write()
                .expect("entries lock should be acquired");
            panic!("poison entries lock");
        }));

        let key = CacheKey::resource("Article");
        store.set(&key, "{}", TTL).await.expect("set");
        assert!(store.get(&key).await.expect("get").is_some());
    }
}
