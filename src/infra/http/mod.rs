//! HTTP surface: router, handlers and request middleware.

mod articles;
mod middleware;

use std::sync::Arc;

use axum::{
    Router,
    handler::Handler,
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    routing::get,
};

use crate::{
    application::{
        articles::ArticleService,
        error::{HttpError, codes},
    },
    cache::{CacheInterceptor, CacheRoute, RouteCacheState, response_cache_layer},
};

pub use middleware::{REQUEST_ID_HEADER, RequestContext, log_responses, set_request_context};

/// Cache resource name shared by every article route.
pub const ARTICLE_RESOURCE: &str = "ArticleController";

#[derive(Clone)]
pub struct HttpState {
    pub articles: Arc<ArticleService>,
}

pub fn build_router(state: HttpState, cache: CacheInterceptor) -> Router {
    let cached = |route: CacheRoute| {
        from_fn_with_state(
            RouteCacheState::new(cache.clone(), route),
            response_cache_layer,
        )
    };
    let article = || CacheRoute::new(ARTICLE_RESOURCE);

    Router::new()
        .route(
            "/articles",
            get(articles::list
                .layer(cached(article().with_query_params(["page", "limit", "search"]))))
            .post(articles::create.layer(cached(article()))),
        )
        .route(
            "/articles/{id}",
            get(articles::show.layer(cached(article())))
                .put(articles::replace.layer(cached(article())))
                .patch(articles::patch.layer(cached(article())))
                .delete(articles::delete.layer(cached(article()))),
        )
        .route("/_health", get(health))
        .fallback(not_found)
        .with_state(state)
        .layer(from_fn(log_responses))
        .layer(from_fn(set_request_context))
}

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn not_found() -> HttpError {
    HttpError::new(
        "infra::http::not_found",
        StatusCode::NOT_FOUND,
        codes::NOT_FOUND,
        "Route not found",
        "no route matched the request",
    )
}
