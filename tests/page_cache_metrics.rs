use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{
    Router,
    body::Body,
    extract::Path,
    http::{Method, Request, StatusCode},
    middleware,
    routing::get,
};
use metrics_util::debugging::DebuggingRecorder;
use tower::ServiceExt;

use blogers::application::identity::{IdentityService, SignInDecision};
use blogers::cache::{PageCacheConfig, PageCacheState, page_cache_layer};
use blogers::domain::identity::{AuthenticatedIdentity, ProviderAccount};
use blogers::domain::types::UnknownProviderPolicy;
use blogers::infra::memory::MemoryStore;

#[tokio::test]
async fn cache_and_sign_in_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let cache = PageCacheState::new(PageCacheConfig::default());
    let renders = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route(
            "/blog/{slug}",
            get({
                let renders = Arc::clone(&renders);
                move |Path(slug): Path<String>| {
                    let renders = Arc::clone(&renders);
                    async move {
                        renders.fetch_add(1, Ordering::SeqCst);
                        format!("<h1>{slug}</h1>")
                    }
                }
            }),
        )
        .layer(middleware::from_fn_with_state(cache.clone(), page_cache_layer));

    for uri in ["/blog/one", "/blog/one", "/blog/two"] {
        let request = Request::builder()
            .method(Method::GET)
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
    assert_eq!(renders.load(Ordering::SeqCst), 2);

    cache.invalidate_all("post_created");
    assert!(cache.pages.is_empty());

    let store = Arc::new(MemoryStore::new());
    let identity = IdentityService::new(store.clone(), store, UnknownProviderPolicy::Allow);
    let decision = identity
        .sign_in(
            Some(&AuthenticatedIdentity {
                name: Some("A".to_string()),
                email: Some("a@x.com".to_string()),
                image: None,
            }),
            Some(&ProviderAccount::github("1001")),
        )
        .await;
    assert_eq!(decision, SignInDecision::Allowed);

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "blogers_page_cache_hit_total",
        "blogers_page_cache_miss_total",
        "blogers_page_cache_entries",
        "blogers_page_cache_invalidation_total",
        "blogers_sign_in_total",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
