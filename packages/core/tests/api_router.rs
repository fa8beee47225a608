//! The assembled HTTP router, driven with `tower::ServiceExt::oneshot` after
//! a producer pass over a scripted upstream.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use http_body_util::BodyExt;
use tower::ServiceExt;

use actions_exporter::api;
use actions_exporter::cache::{ActionsCache, RecheckPolicy};
use actions_exporter::clock::ManualClock;
use actions_exporter::config::Scope;
use actions_exporter::metrics::AppMetrics;
use actions_exporter::producers::stats::record_cache_stats;
use actions_exporter::services::mock_github::{workflow, MockGithubClient};

async fn build_test_app() -> Router {
    let client = Arc::new(
        MockGithubClient::new()
            .with_org_repos("acme", &["api", "docs", "web"])
            .with_workflows("acme/api", vec![workflow(1, "CI")])
            .with_workflows("acme/web", vec![workflow(2, "Deploy"), workflow(3, "Lint")]),
    );
    client.set_rate_limit(4990, 5000);
    let cache = ActionsCache::new(
        client,
        Arc::new(ManualClock::new(Utc::now())),
        Scope::Organizations(vec!["acme".into()]),
        RecheckPolicy::default(),
    );
    cache.pre_seed().await;

    let fields = vec!["repo".to_string(), "workflow".to_string()];
    let metrics = Arc::new(AppMetrics::new(&fields).unwrap());
    record_cache_stats(&cache, &metrics).await;

    api::router(metrics)
}

async fn body_text(body: Body) -> String {
    let bytes = body.collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn health_returns_200_with_ok_body() {
    let app = build_test_app().await;
    let resp = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_text(resp.into_body()).await, "ok");
}

#[tokio::test]
async fn metrics_expose_cache_observability() {
    let app = build_test_app().await;
    let resp = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_text(resp.into_body()).await;
    assert!(body.contains("github_exporter_cached_repositories 3"));
    assert!(body.contains("github_exporter_cached_workflows 3"));
    assert!(body.contains("github_exporter_rate_limit_remaining 4990"));
    assert!(body.contains("github_exporter_rate_limit_limit 5000"));
}

#[tokio::test]
async fn unknown_route_is_404() {
    let app = build_test_app().await;
    let resp = app
        .oneshot(Request::builder().uri("/api/v3").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
