//! Cart handlers. The caller's [`Identity`] comes from the identity
//! middleware; every mutation re-checks ownership before touching the cart.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;
use stockroom_cart::Cart;
use stockroom_core::Identity;
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_cart_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct AddItemRequest {
    pub product_id: Uuid,
    pub quantity: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub(super) struct UpdateItemRequest {
    pub quantity: i32,
}

fn parse_id(req_id: &str, raw: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw)
        .map_err(|_| ApiError::new(req_id, "validation_error", format!("{what} must be a UUID")))
}

type CartResult = Result<Json<ApiResponse<Cart>>, ApiError>;

/// GET|POST /api/v1/cart: resolves the caller's cart, merging on first login.
pub(super) async fn current_cart(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
) -> CartResult {
    let cart = state
        .carts
        .get_or_create_cart(&identity)
        .await
        .map_err(|e| map_cart_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::ok(req_id.0, cart))
}

pub(super) async fn add_item(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Path(cart_id): Path<String>,
    Json(body): Json<AddItemRequest>,
) -> CartResult {
    let rid = &req_id.0;
    let cart_id = parse_id(rid, &cart_id, "cart id")?;

    let result = async {
        state.carts.authorize(cart_id, &identity).await?;
        state
            .carts
            .add_item(cart_id, body.product_id, body.quantity.unwrap_or(1))
            .await
    }
    .await;

    let cart = result.map_err(|e| map_cart_error(rid.clone(), &e))?;
    Ok(ApiResponse::ok(req_id.0, cart))
}

pub(super) async fn update_item(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Path((cart_id, item_id)): Path<(String, String)>,
    Json(body): Json<UpdateItemRequest>,
) -> CartResult {
    let rid = &req_id.0;
    let cart_id = parse_id(rid, &cart_id, "cart id")?;
    let item_id = parse_id(rid, &item_id, "item id")?;

    let result = async {
        state.carts.authorize(cart_id, &identity).await?;
        state
            .carts
            .update_item_quantity(cart_id, item_id, body.quantity)
            .await
    }
    .await;

    let cart = result.map_err(|e| map_cart_error(rid.clone(), &e))?;
    Ok(ApiResponse::ok(req_id.0, cart))
}

pub(super) async fn remove_item(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Path((cart_id, item_id)): Path<(String, String)>,
) -> CartResult {
    let rid = &req_id.0;
    let cart_id = parse_id(rid, &cart_id, "cart id")?;
    let item_id = parse_id(rid, &item_id, "item id")?;

    let result = async {
        state.carts.authorize(cart_id, &identity).await?;
        state.carts.remove_item(cart_id, item_id).await
    }
    .await;

    let cart = result.map_err(|e| map_cart_error(rid.clone(), &e))?;
    Ok(ApiResponse::ok(req_id.0, cart))
}

/// DELETE /api/v1/cart/{cart_id}: empties the cart; the cart itself stays.
pub(super) async fn clear_cart(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Path(cart_id): Path<String>,
) -> CartResult {
    let rid = &req_id.0;
    let cart_id = parse_id(rid, &cart_id, "cart id")?;

    let result = async {
        state.carts.authorize(cart_id, &identity).await?;
        state.carts.clear_cart(cart_id).await
    }
    .await;

    let cart = result.map_err(|e| map_cart_error(rid.clone(), &e))?;
    Ok(ApiResponse::ok(req_id.0, cart))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use stockroom_db::MemoryStore;
    use tower::ServiceExt;

    use super::super::test_support::{app, json_body, state, PROXY_SECRET};
    use super::Uuid;
    use crate::middleware::{PROXY_SECRET_HEADER, SESSION_COOKIE, USER_HEADER};

    struct Visitor {
        cookie: String,
        user: Option<&'static str>,
        proxy_secret: Option<&'static str>,
    }

    impl Visitor {
        fn anonymous(session: &str) -> Self {
            Self {
                cookie: format!("{SESSION_COOKIE}={session}"),
                user: None,
                proxy_secret: None,
            }
        }

        /// Arrives through the auth proxy.
        fn logged_in(session: &str, user: &'static str) -> Self {
            Self {
                user: Some(user),
                proxy_secret: Some(PROXY_SECRET),
                ..Self::anonymous(session)
            }
        }

        /// Sets the user header directly, bypassing the proxy.
        fn claiming(session: &str, user: &'static str, proxy_secret: Option<&'static str>) -> Self {
            Self {
                user: Some(user),
                proxy_secret,
                ..Self::anonymous(session)
            }
        }

        async fn send(
            &self,
            app: &Router,
            method: Method,
            uri: &str,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut builder = Request::builder()
                .method(method)
                .uri(uri)
                .header(header::COOKIE, &self.cookie);
            if let Some(user) = self.user {
                builder = builder.header(USER_HEADER, user);
            }
            if let Some(secret) = self.proxy_secret {
                builder = builder.header(PROXY_SECRET_HEADER, secret);
            }
            let request = match body {
                Some(body) => builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string())),
                None => builder.body(Body::empty()),
            }
            .expect("request");

            let response = app.clone().oneshot(request).await.expect("response");
            let status = response.status();
            (status, json_body(response).await)
        }
    }

    fn test_app() -> Router {
        app(state(&Arc::new(MemoryStore::new())))
    }

    #[tokio::test]
    async fn first_visit_mints_a_session_cookie() {
        let app = test_app();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/cart")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .expect("set-cookie");
        assert!(cookie.starts_with(&format!("{SESSION_COOKIE}=")));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
    }

    #[tokio::test]
    async fn add_update_remove_and_clear() {
        let app = test_app();
        let me = Visitor::anonymous("s-1");
        let (_, cart) = me.send(&app, Method::GET, "/api/v1/cart", None).await;
        let cart_id = cart["data"]["id"].as_str().unwrap().to_string();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let items = format!("/api/v1/cart/{cart_id}/items");
        me.send(&app, Method::POST, &items, Some(json!({"product_id": a, "quantity": 2})))
            .await;
        let (status, cart) = me
            .send(&app, Method::POST, &items, Some(json!({"product_id": b})))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cart["data"]["items"].as_array().unwrap().len(), 2);

        let item_id = cart["data"]["items"][0]["id"].as_str().unwrap().to_string();
        let (status, cart) = me
            .send(
                &app,
                Method::PUT,
                &format!("{items}/{item_id}"),
                Some(json!({"quantity": 7})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cart["data"]["items"][0]["quantity"], 7);

        let (status, cart) = me
            .send(&app, Method::DELETE, &format!("{items}/{item_id}"), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cart["data"]["items"].as_array().unwrap().len(), 1);

        let (status, cart) = me
            .send(&app, Method::DELETE, &format!("/api/v1/cart/{cart_id}"), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cart["data"]["id"], cart_id.as_str());
        assert!(cart["data"]["items"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn someone_elses_cart_is_forbidden_and_untouched() {
        let app = test_app();
        let owner = Visitor::anonymous("owner");
        let (_, cart) = owner.send(&app, Method::GET, "/api/v1/cart", None).await;
        let cart_id = cart["data"]["id"].as_str().unwrap().to_string();

        let intruder = Visitor::anonymous("intruder");
        let (status, body) = intruder
            .send(
                &app,
                Method::POST,
                &format!("/api/v1/cart/{cart_id}/items"),
                Some(json!({"product_id": Uuid::new_v4()})),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "forbidden");

        let (_, cart) = owner.send(&app, Method::GET, "/api/v1/cart", None).await;
        assert!(cart["data"]["items"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_cart_and_bad_quantity() {
        let app = test_app();
        let me = Visitor::anonymous("s-2");

        let (status, _) = me
            .send(
                &app,
                Method::POST,
                &format!("/api/v1/cart/{}/items", Uuid::new_v4()),
                Some(json!({"product_id": Uuid::new_v4()})),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, cart) = me.send(&app, Method::GET, "/api/v1/cart", None).await;
        let cart_id = cart["data"]["id"].as_str().unwrap().to_string();
        let (status, body) = me
            .send(
                &app,
                Method::POST,
                &format!("/api/v1/cart/{cart_id}/items"),
                Some(json!({"product_id": Uuid::new_v4(), "quantity": 11})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "validation_error");
    }

    #[tokio::test]
    async fn login_merges_the_session_cart_into_the_user_cart() {
        let app = test_app();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let earlier = Visitor::logged_in("old-device", "user-1");
        let (_, user_cart) = earlier.send(&app, Method::GET, "/api/v1/cart", None).await;
        let user_cart_id = user_cart["data"]["id"].as_str().unwrap().to_string();
        let items = format!("/api/v1/cart/{user_cart_id}/items");
        earlier
            .send(&app, Method::POST, &items, Some(json!({"product_id": a, "quantity": 1})))
            .await;
        earlier
            .send(&app, Method::POST, &items, Some(json!({"product_id": b, "quantity": 3})))
            .await;

        let anon = Visitor::anonymous("new-device");
        let (_, session_cart) = anon.send(&app, Method::GET, "/api/v1/cart", None).await;
        let session_cart_id = session_cart["data"]["id"].as_str().unwrap().to_string();
        anon.send(
            &app,
            Method::POST,
            &format!("/api/v1/cart/{session_cart_id}/items"),
            Some(json!({"product_id": a, "quantity": 2})),
        )
        .await;

        let (status, merged) = Visitor::logged_in("new-device", "user-1")
            .send(&app, Method::POST, "/api/v1/cart", None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(merged["data"]["id"], user_cart_id.as_str());
        let quantity_of = |product: Uuid| {
            merged["data"]["items"]
                .as_array()
                .unwrap()
                .iter()
                .find(|i| i["product_id"] == product.to_string())
                .map(|i| i["quantity"].as_i64().unwrap())
        };
        assert_eq!(quantity_of(a), Some(3));
        assert_eq!(quantity_of(b), Some(3));

        // The absorbed session cart is gone; the anonymous device starts over.
        let (_, fresh) = anon.send(&app, Method::GET, "/api/v1/cart", None).await;
        assert_ne!(fresh["data"]["id"], session_cart_id.as_str());
        assert_ne!(fresh["data"]["id"], user_cart_id.as_str());
    }

    #[tokio::test]
    async fn user_header_without_proxy_secret_is_an_anonymous_session() {
        let app = test_app();
        let victim = Visitor::logged_in("victim-device", "victim");
        let (_, cart) = victim.send(&app, Method::GET, "/api/v1/cart", None).await;
        let victim_cart_id = cart["data"]["id"].as_str().unwrap().to_string();
        victim
            .send(
                &app,
                Method::POST,
                &format!("/api/v1/cart/{victim_cart_id}/items"),
                Some(json!({"product_id": Uuid::new_v4(), "quantity": 2})),
            )
            .await;

        for secret in [None, Some("guessed-secret")] {
            let spoofer = Visitor::claiming("other-device", "victim", secret);
            let (status, cart) = spoofer.send(&app, Method::GET, "/api/v1/cart", None).await;
            assert_eq!(status, StatusCode::OK);
            assert_ne!(cart["data"]["id"], victim_cart_id.as_str());
            assert!(cart["data"]["items"].as_array().unwrap().is_empty());

            let (status, _) = spoofer
                .send(
                    &app,
                    Method::DELETE,
                    &format!("/api/v1/cart/{victim_cart_id}"),
                    None,
                )
                .await;
            assert_eq!(status, StatusCode::FORBIDDEN);
        }

        let (_, cart) = victim.send(&app, Method::GET, "/api/v1/cart", None).await;
        assert_eq!(cart["data"]["id"], victim_cart_id.as_str());
        assert_eq!(cart["data"]["items"][0]["quantity"], 2);
    }
}
