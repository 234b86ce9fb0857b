//! The cache collaborator.
//!
//! [`CacheBackend`] stores JSON values under `(namespace, key)` with an
//! optional time-to-live. Extensions use the typed [`Cache`] handle, which is
//! bound to `<base namespace>_<extension>` so extensions never see each
//! other's keys.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Instant;

use crate::error::CacheResult;

/// Namespaced key/value storage.
#[async_trait]
pub trait CacheBackend: Send + Sync + 'static {
    async fn get(&self, namespace: &str, key: &str) -> CacheResult<Option<Value>>;

    async fn set(
        &self,
        namespace: &str,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> CacheResult<()>;

    /// Removes a key, returning whether it was present.
    async fn delete(&self, namespace: &str, key: &str) -> CacheResult<bool>;

    /// Removes every key in `namespace`.
    async fn clear(&self, namespace: &str) -> CacheResult<()>;
}

// =============================================================================
// MemoryCache
// =============================================================================

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Process-local [`CacheBackend`]. Expired entries are dropped lazily on read.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<(String, String), Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, namespace: &str, key: &str) -> CacheResult<Option<Value>> {
        let mut entries = self.entries.lock();
        let id = (namespace.to_string(), key.to_string());
        match entries.get(&id) {
            Some(entry) if entry.is_expired(Instant::now()) => {
                entries.remove(&id);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        namespace: &str,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries.lock().insert(
            (namespace.to_string(), key.to_string()),
            Entry { value, expires_at },
        );
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> CacheResult<bool> {
        Ok(self
            .entries
            .lock()
            .remove(&(namespace.to_string(), key.to_string()))
            .is_some())
    }

    async fn clear(&self, namespace: &str) -> CacheResult<()> {
        self.entries.lock().retain(|(ns, _), _| ns != namespace);
        Ok(())
    }
}

// =============================================================================
// Cache handle
// =============================================================================

/// A typed view of a [`CacheBackend`] bound to one namespace.
#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn CacheBackend>,
    namespace: String,
    default_ttl: Option<Duration>,
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("namespace", &self.namespace)
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

impl Cache {
    /// Creates a handle on `namespace`.
    pub fn new(backend: Arc<dyn CacheBackend>, namespace: impl Into<String>) -> Self {
        Self {
            backend,
            namespace: namespace.into(),
            default_ttl: None,
        }
    }

    /// Sets the TTL applied by [`set`](Self::set).
    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Derives a handle for a sub-namespace: `<namespace>_<name>`, or just
    /// `name` when this handle's namespace is empty.
    pub fn scoped(&self, name: &str) -> Cache {
        let namespace = if self.namespace.is_empty() {
            name.to_string()
        } else {
            format!("{}_{}", self.namespace, name)
        };
        Cache {
            backend: Arc::clone(&self.backend),
            namespace,
            default_ttl: self.default_ttl,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Reads and deserialises `key`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        match self.backend.get(&self.namespace, key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Stores `value` with the handle's default TTL.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> CacheResult<()> {
        self.set_with_ttl(key, value, self.default_ttl).await
    }

    /// Stores `value` with an explicit TTL (`None` never expires).
    pub async fn set_with_ttl<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let value = serde_json::to_value(value)?;
        self.backend.set(&self.namespace, key, value, ttl).await
    }

    pub async fn delete(&self, key: &str) -> CacheResult<bool> {
        self.backend.delete(&self.namespace, key).await
    }

    /// Removes every key in this namespace.
    pub async fn clear(&self) -> CacheResult<()> {
        self.backend.clear(&self.namespace).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> Cache {
        Cache::new(Arc::new(MemoryCache::new()), "hero")
    }

    #[tokio::test]
    async fn scoped_handles_join_with_underscore() {
        let cache = root();
        assert_eq!(cache.scoped("mod").namespace(), "hero_mod");
        let bare = Cache::new(Arc::new(MemoryCache::new()), "");
        assert_eq!(bare.scoped("mod").namespace(), "mod");
    }

    #[tokio::test]
    async fn namespaces_do_not_leak() {
        let cache = root();
        let a = cache.scoped("a");
        let b = cache.scoped("b");
        a.set("k", &1u32).await.unwrap();
        assert_eq!(a.get::<u32>("k").await.unwrap(), Some(1));
        assert_eq!(b.get::<u32>("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = root();
        cache
            .set_with_ttl("k", "v", Some(Duration::from_secs(5)))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(cache.get::<String>("k").await.unwrap().as_deref(), Some("v"));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get::<String>("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn clear_only_touches_one_namespace() {
        let cache = root();
        let a = cache.scoped("a");
        let b = cache.scoped("b");
        a.set("k", &1).await.unwrap();
        b.set("k", &2).await.unwrap();
        a.clear().await.unwrap();
        assert_eq!(a.get::<i32>("k").await.unwrap(), None);
        assert_eq!(b.get::<i32>("k").await.unwrap(), Some(2));
    }
}
