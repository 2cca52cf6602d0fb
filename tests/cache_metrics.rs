use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{
    Json, Router,
    body::Body,
    http::{Method, Request, StatusCode},
    middleware,
    routing::get,
};
use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use rescache::cache::{
    CacheConfig, CacheInterceptor, CacheRoute, MemoryStore, RouteCacheState,
    response_cache_layer,
};
use serde_json::json;
use tower::ServiceExt;

#[tokio::test]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let config = CacheConfig {
        namespace: "metrics".to_string(),
        ..Default::default()
    };
    let store = Arc::new(MemoryStore::new(&config));
    let interceptor = CacheInterceptor::new(store, config);
    let state = RouteCacheState::new(interceptor, CacheRoute::new("Tag"));

    let calls = Arc::new(AtomicUsize::new(0));
    let handler_calls = Arc::clone(&calls);
    let app = Router::new()
        .route(
            "/tags/{id}",
            get(move || {
                let calls = Arc::clone(&handler_calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Json(json!({"id": 1, "name": "rust"}))
                }
            })
            .delete(|| async { Json(json!({"id": 1})) }),
        )
        .layer(middleware::from_fn_with_state(state, response_cache_layer));

    for (method, uri) in [
        (Method::GET, "/tags/1"),
        (Method::GET, "/tags/1"),
        (Method::GET, "/tags/2"),
        (Method::DELETE, "/tags/1"),
    ] {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .expect("request should build");
        let response = app
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond");
        assert_eq!(response.status(), StatusCode::OK);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let mut counters: HashMap<String, u64> = HashMap::new();
    for (composite_key, _, _, value) in snapshotter.snapshot().into_vec() {
        if let DebugValue::Counter(count) = value {
            *counters
                .entry(composite_key.key().name().to_string())
                .or_default() += count;
        }
    }

    assert_eq!(counters.get("rescache_hit_total"), Some(&1));
    assert_eq!(counters.get("rescache_miss_total"), Some(&2));
    assert_eq!(counters.get("rescache_store_total"), Some(&2));
    assert_eq!(counters.get("rescache_invalidated_keys_total"), Some(&1));
    assert!(!counters.contains_key("rescache_store_error_total"));
}
