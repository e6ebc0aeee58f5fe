use std::collections::HashMap;
use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use relaygate::account::{AccountPoolHandle, ProviderTag, StaticAccountSource};
use relaygate::config::Config;
use relaygate::credential::{CredentialRefresher, CredentialValidator, NoRefresh};
use relaygate::server::router::gateway_router;
use relaygate::server::state::AppState;

const GATEWAY_KEY: &str = "test-key";

async fn empty_pool_app() -> axum::Router {
    let mut cfg = Config::default();
    cfg.basic.gateway_key = GATEWAY_KEY.to_string();

    let source = StaticAccountSource::new(Vec::new());
    let pool = AccountPoolHandle::spawn(&source)
        .await
        .expect("account pool actor failed to spawn");

    let refresher: Arc<dyn CredentialRefresher> = Arc::new(NoRefresh);
    let refreshers: HashMap<ProviderTag, Arc<dyn CredentialRefresher>> = [
        ProviderTag::OpenAi,
        ProviderTag::Claude,
        ProviderTag::Factory,
        ProviderTag::Gemini,
        ProviderTag::GeminiAntigravity,
        ProviderTag::GeminiBusiness,
        ProviderTag::Kiro,
    ]
    .into_iter()
    .map(|tag| (tag, refresher.clone()))
    .collect();

    let state = AppState::new(&cfg, pool, CredentialValidator::new(refreshers));
    gateway_router(state)
}

#[tokio::test]
async fn anthropic_route_requires_key_rejects_bad_json_and_maps_empty_pool_to_503() {
    let app = empty_pool_app().await;
    let valid_body = r#"{"model":"claude-sonnet-4-5","max_tokens":100,"messages":[{"role":"user","content":"hi"}]}"#;

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/messages")
                .header("content-type", "application/json")
                .body(Body::from(valid_body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/messages")
                .header("content-type", "application/json")
                .header("x-goog-api-key", GATEWAY_KEY)
                .body(Body::from("not-json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/messages")
                .header("content-type", "application/json")
                .header("x-goog-api-key", GATEWAY_KEY)
                .body(Body::from(valid_body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn openai_route_with_empty_pool_surfaces_openai_shaped_error_body() {
    let app = empty_pool_app().await;
    let valid_body = r#"{"model":"claude-sonnet-4-5","messages":[{"role":"user","content":"hi"}]}"#;

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/chat/completions")
                .header("content-type", "application/json")
                .header("authorization", format!("Bearer {GATEWAY_KEY}"))
                .body(Body::from(valid_body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed["error"]["code"], 503);
    assert_eq!(parsed["error"]["type"], "api_error");
}

#[tokio::test]
async fn kiro_route_with_empty_pool_returns_503() {
    let app = empty_pool_app().await;
    let valid_body = r#"{"model":"claude-sonnet-4-5","max_tokens":100,"messages":[{"role":"user","content":"hi"}]}"#;

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/kiro/v1/messages")
                .header("content-type", "application/json")
                .header("x-goog-api-key", GATEWAY_KEY)
                .body(Body::from(valid_body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn gemini_business_generate_content_route_is_wired_and_key_gated() {
    let app = empty_pool_app().await;
    let valid_body = r#"{"contents":[{"role":"user","parts":[{"text":"hi"}]}]}"#;

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/gemini-business/v1beta/models/gemini-2.5-pro:generateContent")
                .header("content-type", "application/json")
                .body(Body::from(valid_body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/gemini-business/v1beta/models/gemini-2.5-pro:generateContent")
                .header("content-type", "application/json")
                .header("x-goog-api-key", GATEWAY_KEY)
                .body(Body::from(valid_body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn unknown_route_falls_through_to_not_found() {
    let app = empty_pool_app().await;
    let resp = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/nope")
                .header("x-goog-api-key", GATEWAY_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
