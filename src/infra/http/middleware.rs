use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::{application::error::ErrorReport, cache::CacheStatus};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

const LOG_TARGET: &str = "rescache::http::response";
const MAX_REQUEST_ID_LEN: usize = 128;

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

/// Tag the request with an id and echo it on the response.
///
/// A caller-supplied `x-request-id` is kept when it is short printable ASCII,
/// so ids survive a proxy hop; otherwise a fresh v4 uuid is issued.
pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id =
        inbound_request_id(request.headers()).unwrap_or_else(|| Uuid::new_v4().to_string());
    request.extensions_mut().insert(RequestContext {
        request_id: request_id.clone(),
    });

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

fn inbound_request_id(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(REQUEST_ID_HEADER)?.to_str().ok()?.trim();
    let usable = !value.is_empty()
        && value.len() <= MAX_REQUEST_ID_LEN
        && value.bytes().all(|byte| byte.is_ascii_graphic());
    usable.then(|| value.to_string())
}

/// Log every response with its cache status; failures carry the error report.
pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();
    let start = Instant::now();

    let mut response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = start.elapsed().as_millis();
    let cache = response
        .extensions_mut()
        .remove::<CacheStatus>()
        .map_or("none", CacheStatus::as_str);

    if !status.is_client_error() && !status.is_server_error() {
        debug!(
            target: LOG_TARGET,
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            cache,
            elapsed_ms,
            request_id = %request_id,
            "request served",
        );
        return response;
    }

    let (source, chain) = match response.extensions_mut().remove::<ErrorReport>() {
        Some(report) => (report.source, report.messages),
        None => ("unknown", Vec::new()),
    };
    let detail = chain.first().map_or("no diagnostic available", String::as_str);

    if status.is_server_error() {
        error!(
            target: LOG_TARGET,
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            query = uri.query().unwrap_or(""),
            cache,
            elapsed_ms,
            source,
            detail,
            chain = ?chain,
            request_id = %request_id,
            "request failed",
        );
    } else {
        warn!(
            target: LOG_TARGET,
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            query = uri.query().unwrap_or(""),
            cache,
            elapsed_ms,
            source,
            detail,
            request_id = %request_id,
            "client request error",
        );
    }

    response
}
