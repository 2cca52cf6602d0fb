//! Response cache.
//!
//! Caches JSON responses of REST handlers in a shared key-value store:
//!
//! - **Keys**: derived from the route's resource name, the HTTP method,
//!   path parameters and significant query parameters (see [`derive_key`]).
//! - **Interceptor**: serves `GET` hits, stores successful responses and
//!   invalidates on `DELETE` (see [`CacheInterceptor`]).
//! - **Stores**: Redis in production, an in-process LRU for development.
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `rescache.toml`:
//!
//! ```toml
//! [cache]
//! enabled = true
//! backend = "redis"
//! namespace = "rescache"
//! ttl_seconds = 60
//! ```

mod config;
mod error;
mod interceptor;
mod keys;
mod lock;
pub mod counters;
mod middleware;
mod route;
mod store;

use std::sync::Arc;

pub use config::{CacheBackend, CacheConfig};
pub use error::CacheError;
pub use interceptor::{CacheInterceptor, CacheableResponse, RequestMeta, is_cacheable_status};
pub use keys::{
    CacheKey, Namespace, Params, derive_key, glob_match, is_method, paginated_pattern,
    single_pattern,
};
pub use middleware::{CacheStatus, RouteCacheState, response_cache_layer};
pub use route::{CacheOptions, CacheRoute};
pub use store::{CacheStore, MemoryStore, RedisStore};

/// Open the store selected by `config`.
pub async fn connect_store(
    config: &CacheConfig,
    redis_url: &str,
) -> Result<Arc<dyn CacheStore>, CacheError> {
    match config.backend {
        CacheBackend::Redis => {
            let store = RedisStore::connect(redis_url, Namespace::new(&config.namespace)).await?;
            Ok(Arc::new(store))
        }
        CacheBackend::Memory => Ok(Arc::new(MemoryStore::new(config))),
    }
}
