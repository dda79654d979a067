//! HTTP-level tests for `MessagesProvider` and the fallback path of
//! `ClassifierService`, against local `wiremock` servers.

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use stockroom_classifier::{
    ClassificationCache, ClassifierError, ClassifierService, CompletionProvider,
    MessagesProvider, NameClassifier, RateLimited,
};
use stockroom_core::{ClassifierProviderConfig, ManualClock, ProductType};

fn provider(name: &str, server: &MockServer) -> MessagesProvider {
    MessagesProvider::new(
        name,
        &ClassifierProviderConfig {
            base_url: server.uri(),
            api_key: format!("{name}-key"),
            model: "test-model".to_string(),
        },
        5,
    )
    .expect("failed to build provider")
}

fn messages_body(text: &str) -> serde_json::Value {
    json!({"content": [{"type": "text", "text": text}]})
}

const GOOD: &str = r#"Here you go: {"cleanedName": "Adidas Samba OG", "brand": "Adidas", "model": "Adidas Samba OG", "productType": "sneaker", "size": "9", "condition": "new", "confidence": "medium"}"#;

#[tokio::test]
async fn sends_key_and_version_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "primary-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(messages_body("ok")))
        .expect(1)
        .mount(&server)
        .await;

    let text = provider("primary", &server)
        .complete("system", "Product name: x")
        .await
        .expect("completion");
    assert_eq!(text, "ok");
}

#[tokio::test]
async fn status_codes_map_to_error_kinds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(529))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({"error": {"type": "invalid_request_error", "message": "bad model"}})),
        )
        .mount(&server)
        .await;

    let p = provider("primary", &server);
    let first = p.complete("s", "u").await.unwrap_err();
    assert!(matches!(
        first,
        ClassifierError::RateLimited { retry_after_secs: Some(7), .. }
    ));
    let second = p.complete("s", "u").await.unwrap_err();
    assert!(matches!(second, ClassifierError::Unavailable { status: 529, .. }));
    let third = p.complete("s", "u").await.unwrap_err();
    match third {
        ClassifierError::Api { status, message, .. } => {
            assert_eq!(status, 400);
            assert_eq!(message, "bad model");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn classify_end_to_end_strips_brand_from_model() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(messages_body(GOOD)))
        .expect(1)
        .mount(&server)
        .await;

    let cache = ClassificationCache::with_ttl_days(28, Arc::new(ManualClock::default()));
    let svc = ClassifierService::new(Arc::new(provider("primary", &server)), None, cache)
        .with_retry_policy(0, 0);

    let c = svc
        .classify("ADIDAS SAMBA OG SZ 9 NEW")
        .await
        .expect("not rate limited")
        .expect("classified");
    assert_eq!(c.brand, "Adidas");
    assert_eq!(c.model, "Samba OG");
    assert_eq!(c.product_type, ProductType::Sneaker);
    assert_eq!(c.size.as_deref(), Some("9"));

    // Served from cache; the mock's expect(1) verifies no second call.
    assert!(svc.classify("adidas samba og sz 9 new").await.unwrap().is_some());
}

#[tokio::test]
async fn fallback_is_used_only_on_rate_limit() {
    let primary = MockServer::start().await;
    let fallback = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&primary)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(messages_body(GOOD)))
        .expect(1)
        .mount(&fallback)
        .await;

    let cache = ClassificationCache::with_ttl_days(28, Arc::new(ManualClock::default()));
    let svc = ClassifierService::new(
        Arc::new(provider("primary", &primary)),
        Some(Arc::new(provider("fallback", &fallback))),
        cache,
    )
    .with_retry_policy(0, 0);

    assert!(svc.classify("Adidas Samba OG").await.unwrap().is_some());
}

#[tokio::test]
async fn server_error_is_retried_then_gives_none() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let cache = ClassificationCache::with_ttl_days(28, Arc::new(ManualClock::default()));
    let svc = ClassifierService::new(Arc::new(provider("primary", &server)), None, cache)
        .with_retry_policy(2, 0);

    assert_eq!(svc.classify("Adidas Samba OG").await, Ok(None));
}

#[tokio::test]
async fn rate_limited_without_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&server)
        .await;

    let cache = ClassificationCache::with_ttl_days(28, Arc::new(ManualClock::default()));
    let svc = ClassifierService::new(Arc::new(provider("primary", &server)), None, cache)
        .with_retry_policy(3, 0);

    assert_eq!(svc.classify("Adidas Samba OG").await, Err(RateLimited));
}
