//! Response cache middleware.
//!
//! Attached per route with [`axum::middleware::from_fn_with_state`] and a
//! [`RouteCacheState`] naming the route's resource. Only JSON bodies of known
//! size are buffered for storage; everything else passes through untouched.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::{Body, HttpBody},
    extract::{RawPathParams, State, rejection::RawPathParamsRejection},
    http::{HeaderValue, Method, Request, StatusCode, header, response::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use http_body_util::BodyExt;
use serde::de::IgnoredAny;
use serde_json::Value;
use tracing::{instrument, warn};

use super::error::CacheError;
use super::interceptor::{CacheInterceptor, CacheableResponse, RequestMeta, is_cacheable_status};
use super::keys::is_method;
use super::route::CacheRoute;

/// Cache state for one route.
#[derive(Clone)]
pub struct RouteCacheState {
    pub interceptor: CacheInterceptor,
    pub route: Arc<CacheRoute>,
}

impl RouteCacheState {
    pub fn new(interceptor: CacheInterceptor, route: CacheRoute) -> Self {
        Self {
            interceptor,
            route: Arc::new(route),
        }
    }
}

/// How the cache took part in a response.
///
/// Attached as a response extension for request logging. Clients never see it:
/// a hit and a bypassed store must look the same from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Replayed from the store without running the handler.
    Hit,
    /// Looked up, not found; the handler ran.
    Miss,
    /// No lookup: disabled cache or a non-`GET` method.
    Bypass,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::Bypass => "bypass",
        }
    }
}

/// Middleware applying the cache interceptor to the wrapped route.
#[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
pub async fn response_cache_layer(
    State(state): State<RouteCacheState>,
    path_params: Result<RawPathParams, RawPathParamsRejection>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let mut meta = RequestMeta::new(request.method().clone())
        .with_query_string(request.uri().query());
    if let Ok(params) = &path_params {
        for (name, value) in params {
            meta.path_params.insert(name.to_string(), value.to_string());
        }
    }

    let config = state.interceptor.config();
    let looked_up =
        config.enabled && state.route.is_enabled() && is_method(&meta.method, &Method::GET);
    let limit = config.max_body_bytes;
    let outcome = state
        .interceptor
        .intercept(&state.route, &meta, || async move {
            let response = next.run(request).await;
            Ok::<_, Infallible>(HandlerResponse::capture(response, limit).await)
        })
        .await;

    let response = match outcome {
        Ok(response) => response,
        Err(never) => match never {},
    };
    let status = match (&response, looked_up) {
        (HandlerResponse::Cached(_), _) => CacheStatus::Hit,
        (_, true) => CacheStatus::Miss,
        (_, false) => CacheStatus::Bypass,
    };

    let mut response = response.into_response();
    response.extensions_mut().insert(status);
    response
}

/// Downstream response as seen by the interceptor.
enum HandlerResponse {
    /// Successful JSON response with its body buffered.
    Buffered { parts: Parts, body: Bytes },
    /// Response that is never stored.
    Passthrough(Response),
    /// Payload replayed from the store.
    Cached(Bytes),
}

impl HandlerResponse {
    async fn capture(response: Response, limit: usize) -> Self {
        if !is_cacheable_status(response.status()) || !is_json(&response) {
            return Self::Passthrough(response);
        }

        let fits = response
            .body()
            .size_hint()
            .upper()
            .is_some_and(|upper| upper <= limit as u64);
        if !fits {
            return Self::Passthrough(response);
        }

        let (parts, body) = response.into_parts();
        match body.collect().await {
            Ok(collected) => Self::Buffered {
                parts,
                body: collected.to_bytes(),
            },
            Err(error) => {
                warn!(cache = "response", error = %error, "failed to read response body");
                Self::Passthrough(StatusCode::INTERNAL_SERVER_ERROR.into_response())
            }
        }
    }
}

impl CacheableResponse for HandlerResponse {
    fn status(&self) -> StatusCode {
        match self {
            Self::Buffered { parts, .. } => parts.status,
            Self::Passthrough(response) => response.status(),
            Self::Cached(_) => StatusCode::OK,
        }
    }

    fn cache_payload(&self) -> Result<String, CacheError> {
        match self {
            Self::Buffered { body, .. } | Self::Cached(body) => std::str::from_utf8(body)
                .map(str::to_string)
                .map_err(|error| CacheError::serialization(error.to_string())),
            Self::Passthrough(_) => Err(CacheError::serialization("response body not buffered")),
        }
    }

    fn from_cache_payload(payload: String) -> Result<Self, CacheError> {
        serde_json::from_str::<IgnoredAny>(&payload)?;
        Ok(Self::Cached(Bytes::from(payload)))
    }

    fn resource_id(&self) -> Option<String> {
        let Self::Buffered { body, .. } = self else {
            return None;
        };
        match serde_json::from_slice::<Value>(body).ok()?.get("id")? {
            Value::Number(id) => Some(id.to_string()),
            Value::String(id) if !id.is_empty() => Some(id.clone()),
            _ => None,
        }
    }

    fn is_cacheable(&self) -> bool {
        matches!(self, Self::Buffered { parts, .. } if is_cacheable_status(parts.status))
    }
}

impl IntoResponse for HandlerResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Buffered { parts, body } => Response::from_parts(parts, Body::from(body)),
            Self::Passthrough(response) => response,
            Self::Cached(body) => (
                [(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                )],
                body,
            )
                .into_response(),
        }
    }
}

fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|mime| {
            let mime = mime.trim();
            mime.eq_ignore_ascii_case("application/json") || mime.ends_with("+json")
        })
}
