//! Response cache interceptor.
//!
//! Wraps a downstream handler and decides per request whether to serve from
//! the store, populate it, or invalidate related entries:
//!
//! - `GET`: lookup; a hit short-circuits, a successful miss is stored.
//! - `DELETE`: unlink the item key and every paginated key of the resource,
//!   then always run the handler.
//! - `HEAD` / `OPTIONS`: pass through untouched.
//! - anything else: run the handler, then store a successful response. `POST`
//!   is re-keyed by the id of the created resource.
//!
//! Store failures are logged and swallowed; only handler errors propagate.

use std::future::Future;
use std::sync::Arc;

use axum::http::{Method, StatusCode};
use metrics::counter;
use tracing::{debug, warn};

use super::config::CacheConfig;
use super::error::CacheError;
use super::keys::{self, CacheKey, Params, derive_key, is_method};
use super::counters;
use super::route::CacheRoute;
use super::store::CacheStore;

/// A handler result the interceptor can store and replay.
///
/// Creatable resources must expose their identifier through
/// [`resource_id`](Self::resource_id) so `POST` responses can be re-keyed.
pub trait CacheableResponse: Sized {
    fn status(&self) -> StatusCode;

    /// Serialized form written to the store.
    fn cache_payload(&self) -> Result<String, CacheError>;

    /// Rebuild a response from a stored payload.
    fn from_cache_payload(payload: String) -> Result<Self, CacheError>;

    /// Identifier of the resource carried by this response, if any.
    fn resource_id(&self) -> Option<String>;

    /// Whether this response may be written to the store.
    fn is_cacheable(&self) -> bool {
        is_cacheable_status(self.status())
    }
}

/// Request metadata consumed by key derivation.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub method: Method,
    pub path_params: Params,
    pub query: Params,
}

impl RequestMeta {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            path_params: Params::new(),
            query: Params::new(),
        }
    }

    pub fn with_path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(name.into(), value.into());
        self
    }

    pub fn with_query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Parse an `application/x-www-form-urlencoded` query string. The last
    /// occurrence of a repeated name wins.
    pub fn with_query_string(mut self, query: Option<&str>) -> Self {
        if let Some(query) = query {
            self.query
                .extend(url::form_urlencoded::parse(query.as_bytes()).into_owned());
        }
        self
    }

    /// Key this request derives under `route`.
    pub fn cache_key(&self, route: &CacheRoute) -> CacheKey {
        derive_key(
            route.resource(),
            &self.method,
            &self.path_params,
            &self.query,
            route.query_params(),
        )
    }
}

/// Statuses whose responses are cached.
pub fn is_cacheable_status(status: StatusCode) -> bool {
    (200..400).contains(&status.as_u16())
}

/// Gates and populates the cache around downstream handlers.
#[derive(Clone)]
pub struct CacheInterceptor {
    store: Arc<dyn CacheStore>,
    config: CacheConfig,
}

impl CacheInterceptor {
    pub fn new(store: Arc<dyn CacheStore>, config: CacheConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Run `downstream` for `request` with caching around it.
    pub async fn intercept<R, E, F, Fut>(
        &self,
        route: &CacheRoute,
        request: &RequestMeta,
        downstream: F,
    ) -> Result<R, E>
    where
        R: CacheableResponse,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        if !self.config.enabled || !route.is_enabled() {
            return downstream().await;
        }

        let resource = route.resource();
        let key = request.cache_key(route);

        if is_method(&request.method, &Method::DELETE) {
            self.invalidate(resource, &key).await;
            return downstream().await;
        }

        // Bodiless probes would otherwise land under the bare resource key.
        if is_method(&request.method, &Method::HEAD)
            || is_method(&request.method, &Method::OPTIONS)
        {
            return downstream().await;
        }

        if is_method(&request.method, &Method::GET) {
            if let Some(hit) = self.lookup::<R>(resource, &key).await {
                return Ok(hit);
            }
            debug!(
                cache = "response",
                outcome = "miss",
                key = %key,
                "no cached response, executing handler"
            );
        }

        let response = downstream().await?;

        if response.is_cacheable() {
            let target = if is_method(&request.method, &Method::POST) {
                match response.resource_id() {
                    Some(id) => {
                        debug!(cache = "response", id = %id, "re-keying created resource");
                        Some(CacheKey::single(resource, &id))
                    }
                    None => {
                        debug!(
                            cache = "response",
                            resource,
                            "created resource has no id, skipping store"
                        );
                        None
                    }
                }
            } else {
                Some(key)
            };

            if let Some(target) = target {
                // Serialize before suspending: responses need not be `Sync`.
                let payload = response.cache_payload();
                self.write(resource, &target, payload).await;
            }
        }

        Ok(response)
    }

    /// Remove every cached entry of `resource`: single items, paginated
    /// lists and the bare resource key. Returns the number of keys removed.
    pub async fn purge(&self, resource: &str) -> Result<usize, CacheError> {
        let mut doomed = vec![CacheKey::resource(resource)];
        doomed.extend(self.store.scan_keys(&keys::single_pattern(resource)).await?);
        doomed.extend(
            self.store
                .scan_keys(&keys::paginated_pattern(resource))
                .await?,
        );

        let removed = self.store.bulk_delete(&doomed).await?;
        counter!(counters::INVALIDATED_KEYS_TOTAL, "resource" => resource.to_string())
            .increment(removed as u64);
        Ok(removed)
    }

    async fn lookup<R: CacheableResponse>(&self, resource: &str, key: &CacheKey) -> Option<R> {
        let payload = match self.store.get(key).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                counter!(counters::MISS_TOTAL, "resource" => resource.to_string()).increment(1);
                return None;
            }
            Err(error) => {
                warn!(
                    cache = "response",
                    op = "get",
                    key = %key,
                    error_kind = error.kind(),
                    error = %error,
                    "cache lookup failed, treating as miss"
                );
                counter!(counters::STORE_ERROR_TOTAL, "op" => "get").increment(1);
                counter!(counters::MISS_TOTAL, "resource" => resource.to_string()).increment(1);
                return None;
            }
        };

        match R::from_cache_payload(payload) {
            Ok(hit) => {
                debug!(cache = "response", outcome = "hit", key = %key, "serving cached response");
                counter!(counters::HIT_TOTAL, "resource" => resource.to_string()).increment(1);
                Some(hit)
            }
            Err(error) => {
                warn!(
                    cache = "response",
                    key = %key,
                    error = %error,
                    "cached payload unreadable, treating as miss"
                );
                counter!(counters::MISS_TOTAL, "resource" => resource.to_string()).increment(1);
                None
            }
        }
    }

    async fn write(&self, resource: &str, key: &CacheKey, payload: Result<String, CacheError>) {
        let result = match payload {
            Ok(payload) => self.store.set(key, &payload, self.config.ttl).await,
            Err(error) => Err(error),
        };

        match result {
            Ok(()) => {
                debug!(cache = "response", key = %key, "cached response");
                counter!(counters::STORE_TOTAL, "resource" => resource.to_string()).increment(1);
            }
            Err(error) => {
                warn!(
                    cache = "response",
                    op = "set",
                    key = %key,
                    error_kind = error.kind(),
                    error = %error,
                    "failed to cache response"
                );
                counter!(counters::STORE_ERROR_TOTAL, "op" => "set").increment(1);
            }
        }
    }

    async fn invalidate(&self, resource: &str, key: &CacheKey) {
        let mut doomed = vec![key.clone()];

        match self
            .store
            .scan_keys(&keys::paginated_pattern(resource))
            .await
        {
            Ok(paginated) => doomed.extend(paginated),
            Err(error) => {
                warn!(
                    cache = "response",
                    op = "scan",
                    resource,
                    error_kind = error.kind(),
                    error = %error,
                    "failed to scan paginated keys, invalidating item key only"
                );
                counter!(counters::STORE_ERROR_TOTAL, "op" => "scan").increment(1);
            }
        }

        match self.store.bulk_delete(&doomed).await {
            Ok(removed) => {
                debug!(
                    cache = "response",
                    resource,
                    requested = doomed.len(),
                    removed,
                    "invalidated cached responses"
                );
                counter!(counters::INVALIDATED_KEYS_TOTAL, "resource" => resource.to_string())
                    .increment(removed as u64);
            }
            Err(error) => {
                warn!(
                    cache = "response",
                    op = "delete",
                    resource,
                    error_kind = error.kind(),
                    error = %error,
                    "failed to invalidate cached responses"
                );
                counter!(counters::STORE_ERROR_TOTAL, "op" => "delete").increment(1);
            }
        }
    }
}
