use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Serialize;
use stockroom_core::Identity;
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Opaque anonymous-session cookie.
pub const SESSION_COOKIE: &str = "stockroom_session";

/// Set by the upstream auth proxy once a visitor has logged in.
pub const USER_HEADER: &str = "x-authenticated-user";

/// Shared secret the auth proxy sends with [`USER_HEADER`].
pub const PROXY_SECRET_HEADER: &str = "x-proxy-secret";

/// Newtype wrapping a request ID string, stored as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// API key auth settings used by middleware.
#[derive(Debug, Clone)]
pub struct AuthState {
    api_keys: Arc<Vec<String>>,
    pub enabled: bool,
}

impl AuthState {
    /// Builds auth config from the configured bearer tokens.
    ///
    /// In development, an empty key list disables auth for local iteration.
    /// In other environments it fails startup.
    pub fn from_keys(keys: &[String], is_development: bool) -> anyhow::Result<Self> {
        let keys: Vec<String> = keys
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(ToOwned::to_owned)
            .collect();

        if keys.is_empty() {
            if is_development {
                tracing::warn!(
                    "STOCKROOM_API_KEYS not set; bearer auth disabled in development environment"
                );
                return Ok(Self {
                    api_keys: Arc::new(Vec::new()),
                    enabled: false,
                });
            }

            anyhow::bail!(
                "STOCKROOM_API_KEYS is required outside development; provide comma-separated bearer tokens"
            );
        }

        Ok(Self {
            api_keys: Arc::new(keys),
            enabled: true,
        })
    }

    fn allows(&self, token: &str) -> bool {
        // Every key is compared so timing does not reveal which one matched.
        self.api_keys
            .iter()
            .fold(false, |found, key| {
                found | bool::from(key.as_bytes().ct_eq(token.as_bytes()))
            })
    }
}

/// Decides whether [`USER_HEADER`] came from the auth proxy.
///
/// Without a configured secret the header is never trusted and every visitor
/// is an anonymous session.
#[derive(Clone, Default)]
pub struct ProxyTrust {
    secret: Option<Arc<str>>,
}

impl std::fmt::Debug for ProxyTrust {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyTrust")
            .field("secret", &self.secret.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

impl ProxyTrust {
    #[must_use]
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.map(Arc::from),
        }
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    fn vouches_for(&self, headers: &HeaderMap) -> bool {
        let Some(secret) = &self.secret else {
            return false;
        };
        headers
            .get(PROXY_SECRET_HEADER)
            .is_some_and(|v| bool::from(v.as_bytes().ct_eq(secret.as_bytes())))
    }
}

#[derive(Debug, Clone)]
struct RateLimitWindow {
    started_at: Instant,
    count: usize,
}

/// Fixed-window limiter shared by every route.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    max_requests: usize,
    window: Duration,
    state: Arc<Mutex<RateLimitWindow>>,
}

impl RateLimitState {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            state: Arc::new(Mutex::new(RateLimitWindow {
                started_at: Instant::now(),
                count: 0,
            })),
        }
    }
}

#[derive(Debug, Serialize)]
struct MiddlewareErrorBody {
    error: MiddlewareError,
}

#[derive(Debug, Serialize)]
struct MiddlewareError {
    code: &'static str,
    message: &'static str,
}

fn middleware_error(status: StatusCode, code: &'static str, message: &'static str) -> Response {
    (
        status,
        Json(MiddlewareErrorBody {
            error: MiddlewareError { code, message },
        }),
    )
        .into_response()
}

/// Axum middleware that extracts or generates a request ID.
///
/// If the incoming request has an `x-request-id` header, that value is used.
/// Otherwise a new `UUIDv4` is generated. The ID is:
/// - Inserted into request extensions as [`RequestId`]
/// - Set on the response as the `x-request-id` header
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;

    if let Ok(val) = HeaderValue::from_str(&id) {
        res.headers_mut().insert("x-request-id", val);
    }

    res
}

/// Middleware enforcing Bearer token auth when enabled.
pub async fn require_bearer_auth(
    State(auth): State<AuthState>,
    req: Request,
    next: Next,
) -> Response {
    if !auth.enabled {
        return next.run(req).await;
    }

    match extract_bearer_token(req.headers().get(AUTHORIZATION)) {
        Some(token) if auth.allows(token) => next.run(req).await,
        _ => middleware_error(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "missing or invalid bearer token",
        ),
    }
}

/// Middleware enforcing a fixed request-per-window limit.
pub async fn enforce_rate_limit(
    State(rate_limit): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    let mut window = rate_limit.state.lock().await;

    if window.started_at.elapsed() >= rate_limit.window {
        window.started_at = Instant::now();
        window.count = 0;
    }

    if window.count >= rate_limit.max_requests {
        return middleware_error(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limited",
            "rate limit exceeded",
        );
    }

    window.count += 1;
    drop(window);

    next.run(req).await
}

/// Resolves the caller's cart [`Identity`] and stores it as a request extension.
///
/// The session id comes from the [`SESSION_COOKIE`]; one is minted and set on
/// the response when absent. The user id comes from [`USER_HEADER`], and only
/// when the request carries the proxy secret.
pub async fn resolve_identity(
    State(trust): State<ProxyTrust>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let user_id = if trust.vouches_for(req.headers()) {
        user_from_headers(req.headers())
    } else {
        if req.headers().contains_key(USER_HEADER) {
            tracing::debug!("user header without a valid proxy secret ignored");
        }
        None
    };
    let existing = jar
        .get(SESSION_COOKIE)
        .map(|c| c.value().trim().to_owned())
        .filter(|v| !v.is_empty());

    let (session_id, minted) = match existing {
        Some(id) => (id, false),
        None => (Uuid::new_v4().to_string(), true),
    };

    req.extensions_mut().insert(Identity {
        user_id,
        session_id: Some(session_id.clone()),
    });

    let res = next.run(req).await;
    if !minted {
        return res;
    }

    let cookie = Cookie::build((SESSION_COOKIE, session_id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    (jar.add(cookie), res).into_response()
}

fn user_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
}

fn extract_bearer_token(value: Option<&HeaderValue>) -> Option<&str> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_bearer_token_accepts_valid_header() {
        let header = HeaderValue::from_static("Bearer test-token");
        assert_eq!(extract_bearer_token(Some(&header)), Some("test-token"));
    }

    #[test]
    fn extract_bearer_token_rejects_non_bearer_header() {
        let header = HeaderValue::from_static("Basic abc123");
        assert_eq!(extract_bearer_token(Some(&header)), None);
    }

    #[test]
    fn auth_state_disables_when_no_keys_in_dev() {
        let state = AuthState::from_keys(&[], true).expect("dev should allow missing keys");
        assert!(!state.enabled);
    }

    #[test]
    fn auth_state_requires_keys_outside_dev() {
        assert!(AuthState::from_keys(&[" ".to_string()], false).is_err());
    }

    #[test]
    fn auth_state_matches_any_configured_key() {
        let state =
            AuthState::from_keys(&["alpha".to_string(), "beta".to_string()], false).expect("auth");
        assert!(state.allows("beta"));
        assert!(!state.allows("bet"));
        assert!(!state.allows("gamma"));
    }

    #[test]
    fn proxy_trust_requires_matching_secret() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_HEADER, HeaderValue::from_static("user-7"));
        assert!(!ProxyTrust::default().vouches_for(&headers));

        let trust = ProxyTrust::new(Some("s3cret".to_string()));
        assert!(!trust.vouches_for(&headers));
        headers.insert(PROXY_SECRET_HEADER, HeaderValue::from_static("s3cre"));
        assert!(!trust.vouches_for(&headers));
        headers.insert(PROXY_SECRET_HEADER, HeaderValue::from_static("s3cret"));
        assert!(trust.vouches_for(&headers));
        assert!(!format!("{trust:?}").contains("s3cret"));
    }

    #[test]
    fn blank_user_header_is_anonymous() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_HEADER, HeaderValue::from_static("  "));
        assert_eq!(user_from_headers(&headers), None);
        headers.insert(USER_HEADER, HeaderValue::from_static("user-7"));
        assert_eq!(user_from_headers(&headers).as_deref(), Some("user-7"));
    }
}
