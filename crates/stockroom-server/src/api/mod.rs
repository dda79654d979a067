mod admin;
mod cart;
mod products;
mod webhook;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use stockroom_cart::{CartEngine, CartError};
use stockroom_catalog::{CatalogError, CatalogJobs, JobTracker};
use stockroom_core::{AppConfig, Environment};
use stockroom_db::{CatalogStore, JobRunStore};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::middleware::{
    enforce_rate_limit, request_id, require_bearer_auth, resolve_identity, AuthState, ProxyTrust,
    RateLimitState, RequestId,
};

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn CatalogStore>,
    pub runs: Arc<dyn JobRunStore>,
    pub carts: CartEngine,
    pub tracker: JobTracker,
    /// Absent when POS or classifier credentials are missing; sync and
    /// normalize routes then answer 503.
    pub jobs: Option<CatalogJobs>,
}

/// Who may reach which routes: admin bearer keys, the auth-proxy secret, and
/// the browser origins allowed to send the session cookie.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    pub auth: AuthState,
    pub proxy: ProxyTrust,
    pub cors_origins: Vec<HeaderValue>,
}

impl AccessPolicy {
    /// # Errors
    ///
    /// Fails when no API keys are configured outside development, or when an
    /// allowed origin is not a valid header value.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let auth = AuthState::from_keys(
            &config.api_keys,
            matches!(config.env, Environment::Development),
        )?;
        let cors_origins = config
            .cors_allowed_origins
            .iter()
            .map(|origin| {
                HeaderValue::from_str(origin).with_context(|| format!("invalid CORS origin {origin:?}"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let proxy = ProxyTrust::new(config.trusted_proxy_secret.clone());
        if !proxy.is_configured() {
            tracing::warn!(
                "STOCKROOM_TRUSTED_PROXY_SECRET not set; user header ignored and carts are per session"
            );
        }

        Ok(Self {
            auth,
            proxy,
            cors_origins,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub(super) fn ok(request_id: String, data: T) -> Json<Self> {
        Json(Self {
            data,
            meta: ResponseMeta::new(request_id),
        })
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "forbidden" => StatusCode::FORBIDDEN,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            "upstream_error" => StatusCode::BAD_GATEWAY,
            "unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            "timeout" => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn normalize_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(50).clamp(1, 200)
}

pub(super) fn map_db_error(request_id: String, error: &stockroom_db::DbError) -> ApiError {
    tracing::error!(error = %error, "database query failed");
    ApiError::new(request_id, "internal_error", "database query failed")
}

pub(super) fn map_cart_error(request_id: String, error: &CartError) -> ApiError {
    match error {
        CartError::Validation(_)
        | CartError::IdentityRequired
        | CartError::QuantityLimit { .. }
        | CartError::CartFull { .. } => {
            ApiError::new(request_id, "validation_error", error.to_string())
        }
        CartError::CartNotFound | CartError::ItemNotFound => {
            ApiError::new(request_id, "not_found", error.to_string())
        }
        CartError::Forbidden => ApiError::new(request_id, "forbidden", error.to_string()),
        CartError::Store(db) => map_db_error(request_id, db),
    }
}

pub(super) fn map_catalog_error(request_id: String, error: &CatalogError) -> ApiError {
    match error {
        CatalogError::Store(db) => map_db_error(request_id, db),
        CatalogError::Upstream { offset, .. } => {
            tracing::error!(error = %error, "inventory fetch failed");
            ApiError::new(
                request_id,
                "upstream_error",
                format!("inventory source failed at offset {offset}"),
            )
        }
        CatalogError::Timeout { .. } => ApiError::new(request_id, "timeout", error.to_string()),
    }
}

/// With no configured origins only same-origin callers get through.
fn build_cors(origins: &[HeaderValue]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ]);
    if origins.is_empty() {
        return cors;
    }
    cors.allow_origin(AllowOrigin::list(origins.iter().cloned()))
        .allow_credentials(true)
}

fn cart_router(proxy: ProxyTrust) -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/cart",
            get(cart::current_cart).post(cart::current_cart),
        )
        .route(
            "/api/v1/cart/{cart_id}",
            axum::routing::delete(cart::clear_cart),
        )
        .route("/api/v1/cart/{cart_id}/items", post(cart::add_item))
        .route(
            "/api/v1/cart/{cart_id}/items/{item_id}",
            put(cart::update_item).delete(cart::remove_item),
        )
        .layer(axum::middleware::from_fn_with_state(proxy, resolve_identity))
}

fn protected_router(auth: AuthState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/webhooks/inventory", post(webhook::receive_inventory))
        .route("/api/v1/admin/runs", get(admin::list_runs))
        .route("/api/v1/admin/sync", post(admin::trigger_sync))
        .route("/api/v1/admin/normalize", post(admin::trigger_normalize))
        .route(
            "/api/v1/admin/recompute-stock",
            post(admin::trigger_recompute),
        )
        .layer(axum::middleware::from_fn_with_state(
            auth,
            require_bearer_auth,
        ))
}

pub fn build_app(state: AppState, access: AccessPolicy, rate_limit: RateLimitState) -> Router {
    let public_routes = Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/products", get(products::list_products))
        .route("/api/v1/products/metadata", get(products::catalog_metadata))
        .route("/api/v1/products/{product_id}", get(products::get_product));

    Router::new()
        .merge(public_routes)
        .merge(cart_router(access.proxy))
        .merge(protected_router(access.auth))
        .layer(
            ServiceBuilder::new()
                .layer(build_cors(&access.cors_origins))
                .layer(axum::middleware::from_fn(request_id))
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                )),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match state.catalog.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

pub fn default_rate_limit_state() -> RateLimitState {
    RateLimitState::new(120, Duration::from_secs(60))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{HeaderValue, Request, Response};
    use axum::Router;
    use stockroom_cart::CartEngine;
    use stockroom_catalog::JobTracker;
    use stockroom_core::{CartLimits, ManualClock};
    use stockroom_db::MemoryStore;

    use super::{build_app, default_rate_limit_state, AccessPolicy, AppState};
    use crate::middleware::{AuthState, ProxyTrust};

    pub(crate) const TOKEN: &str = "test-admin-token";
    pub(crate) const PROXY_SECRET: &str = "test-proxy-secret";
    pub(crate) const SHOP_ORIGIN: &str = "https://shop.example.com";

    pub(crate) fn access() -> AccessPolicy {
        AccessPolicy {
            auth: AuthState::from_keys(&[TOKEN.to_string()], false).expect("auth"),
            proxy: ProxyTrust::new(Some(PROXY_SECRET.to_string())),
            cors_origins: vec![HeaderValue::from_static(SHOP_ORIGIN)],
        }
    }

    pub(crate) fn state(store: &Arc<MemoryStore>) -> AppState {
        AppState {
            catalog: store.clone(),
            runs: store.clone(),
            carts: CartEngine::new(
                store.clone(),
                Arc::new(ManualClock::default()),
                CartLimits::default(),
            ),
            tracker: JobTracker::new(store.clone(), Duration::from_secs(5)),
            jobs: None,
        }
    }

    pub(crate) fn app(state: AppState) -> Router {
        build_app(state, access(), default_rate_limit_state())
    }

    pub(crate) fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    pub(crate) async fn json_body(response: Response<Body>) -> serde_json::Value {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&body).expect("json parse")
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{access, app, get, json_body, state, SHOP_ORIGIN};
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use stockroom_db::MemoryStore;
    use tower::ServiceExt;

    #[test]
    fn normalize_limit_applies_defaults_and_bounds() {
        assert_eq!(normalize_limit(None), 50);
        assert_eq!(normalize_limit(Some(0)), 1);
        assert_eq!(normalize_limit(Some(1_000)), 200);
        assert_eq!(normalize_limit(Some(25)), 25);
    }

    #[test]
    fn api_error_validation_error_maps_to_bad_request() {
        let response = ApiError::new("req-1", "validation_error", "invalid input").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn cart_ownership_mismatch_is_forbidden_not_missing() {
        let forbidden = map_cart_error("r".into(), &CartError::Forbidden).into_response();
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
        let missing = map_cart_error("r".into(), &CartError::CartNotFound).into_response();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        let full = map_cart_error("r".into(), &CartError::CartFull { max: 50 }).into_response();
        assert_eq!(full.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_reports_ok_then_degraded() {
        let store = Arc::new(MemoryStore::new());
        let app = app(state(&store));

        let response = app
            .clone()
            .oneshot(get("/api/v1/health"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));

        store.set_unavailable(true);
        let response = app.oneshot(get("/api/v1/health")).await.expect("response");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = json_body(response).await;
        assert_eq!(json["data"]["status"], "degraded");
    }

    #[tokio::test]
    async fn admin_routes_require_bearer_token() {
        let store = Arc::new(MemoryStore::new());
        let app = app(state(&store));

        let response = app
            .clone()
            .oneshot(get("/api/v1/admin/runs"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/admin/runs")
                    .header("authorization", "Bearer wrong")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn rate_limit_rejects_requests_past_the_window_budget() {
        let store = Arc::new(MemoryStore::new());
        let app = build_app(
            state(&store),
            access(),
            RateLimitState::new(2, Duration::from_secs(60)),
        );

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(get("/api/v1/health"))
                .await
                .expect("response");
            assert_eq!(response.status(), StatusCode::OK);
        }
        let response = app.oneshot(get("/api/v1/health")).await.expect("response");
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn cors_echoes_only_configured_origins() {
        let store = Arc::new(MemoryStore::new());
        let app = app(state(&store));
        let from = |origin: &'static str| {
            Request::builder()
                .uri("/api/v1/health")
                .header(header::ORIGIN, origin)
                .body(Body::empty())
                .expect("request")
        };

        let response = app.clone().oneshot(from(SHOP_ORIGIN)).await.expect("response");
        let headers = response.headers();
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN),
            Some(&HeaderValue::from_static(SHOP_ORIGIN))
        );
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS),
            Some(&HeaderValue::from_static("true"))
        );

        let response = app
            .oneshot(from("https://elsewhere.example.net"))
            .await
            .expect("response");
        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
    }
}
