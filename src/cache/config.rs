//! Cache configuration.
//!
//! Resolved from the `[cache]` section of `rescache.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

const DEFAULT_NAMESPACE: &str = "rescache";
const DEFAULT_TTL_SECS: u64 = 60;
const DEFAULT_MEMORY_CAPACITY: usize = 1024;
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Which store backs the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Redis,
    Memory,
}

impl CacheBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Redis => "redis",
            Self::Memory => "memory",
        }
    }
}

impl std::fmt::Display for CacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Master switch; disabled caches pass every request through.
    pub enabled: bool,
    pub backend: CacheBackend,
    /// Prefix isolating this application's keys in a shared store.
    pub namespace: String,
    /// Expiration applied to every stored entry.
    pub ttl: Duration,
    /// Entry limit of the in-process store.
    pub memory_capacity: usize,
    /// Largest response body buffered for storage.
    pub max_body_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackend::Redis,
            namespace: DEFAULT_NAMESPACE.to_string(),
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            backend: settings.backend,
            namespace: settings.namespace.clone(),
            ttl: settings.ttl,
            memory_capacity: settings.memory_capacity.get(),
            max_body_bytes: settings.max_body_bytes.get(),
        }
    }
}

impl CacheConfig {
    /// Returns the memory capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn memory_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.memory_capacity).unwrap_or(NonZeroUsize::MIN)
    }

    /// TTL in whole seconds, never below one.
    pub fn ttl_seconds(&self) -> u64 {
        self.ttl.as_secs().max(1)
    }
}
