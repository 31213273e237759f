pub mod activity;
pub mod auth;
mod extract;
pub mod health;
pub mod items;
pub mod join_requests;
pub mod pantry;
pub mod profile;
pub mod shopping;

use std::sync::Arc;

use axum::Router;

use crate::AppState;

/// Every authenticated API route. `/api/auth` and `/health` are mounted
/// separately so the auth endpoints can carry their own rate limiter.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/api/profile", profile::router())
        .nest("/api/pantry", pantry::router())
        .nest("/api/join-requests", join_requests::router())
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        routing::get,
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::test_support;

    fn app(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/health", get(health::health_check))
            .nest("/api/auth", auth::router())
            .merge(api_router())
            .with_state(state)
    }

    async fn call(app: &Router, method: &str, uri: &str, caller: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(email) = caller {
            req = req.header(auth::USER_HEADER, email);
        }
        let req = match body {
            Some(b) => req
                .header("content-type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn health_reports_database() {
        let app = app(test_support::state().await);
        let (status, body) = call(&app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["database"], "ok");
    }

    #[tokio::test]
    async fn missing_or_unknown_caller_is_unauthorized() {
        let app = app(test_support::state().await);

        let (status, body) = call(&app, "GET", "/api/pantry/items", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");

        let (status, _) = call(&app, "GET", "/api/profile", Some("ghost@example.com"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_bodies_and_queries_get_the_error_envelope() {
        let state = test_support::state().await;
        test_support::user(&state, "a@example.com", "A").await;
        let app = app(state);

        let (status, body) = call(&app, "POST", "/api/pantry/assign", Some("a@example.com"), Some(json!({}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert!(body["error"]["message"].as_str().unwrap().contains("pantryName"));

        let (status, body) = call(
            &app,
            "POST",
            "/api/join-requests",
            Some("a@example.com"),
            Some(json!({ "pantryName": 42 })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let (status, body) = call(&app, "GET", "/api/pantry/activity?limit=lots", Some("a@example.com"), None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn pantry_join_and_inventory_over_http() {
        let app = app(test_support::state().await);

        for (email, name) in [("a@example.com", "A"), ("b@example.com", "B")] {
            let (status, _) = call(
                &app,
                "POST",
                "/api/auth/signup",
                None,
                Some(json!({ "email": email, "password": "secret1", "displayName": name })),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, body) = call(
            &app,
            "POST",
            "/api/pantry/assign",
            Some("a@example.com"),
            Some(json!({ "pantryName": "Kitchen42" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isNewPantry"], true);

        let (status, body) = call(
            &app,
            "POST",
            "/api/join-requests",
            Some("b@example.com"),
            Some(json!({ "pantryName": "Kitchen42" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["outcome"], "pending");
        let request_id = body["request"]["id"].as_str().unwrap().to_string();

        let (status, body) = call(
            &app,
            "POST",
            &format!("/api/join-requests/{}/respond", request_id),
            Some("a@example.com"),
            Some(json!({ "action": "maybe" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let (status, body) = call(
            &app,
            "POST",
            &format!("/api/join-requests/{}/respond", request_id),
            Some("a@example.com"),
            Some(json!({ "action": "approve" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "approved");

        let (status, body) = call(
            &app,
            "POST",
            &format!("/api/join-requests/{}/respond", request_id),
            Some("a@example.com"),
            Some(json!({ "action": "reject" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "INVALID_STATE");

        let (status, _) = call(
            &app,
            "POST",
            "/api/pantry/items",
            Some("a@example.com"),
            Some(json!({ "name": "Egg", "amount": 2 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = call(
            &app,
            "POST",
            "/api/pantry/items",
            Some("b@example.com"),
            Some(json!({ "name": "egg", "amount": "3" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["merged"], true);
        assert_eq!(body["item"]["amount"], "5");

        let (_, body) = call(&app, "GET", "/api/pantry/items/names", Some("b@example.com"), None).await;
        assert_eq!(body["names"], json!(["Egg"]));

        let (_, body) = call(&app, "GET", "/api/pantry/members", Some("b@example.com"), None).await;
        assert_eq!(body.as_array().unwrap().len(), 2);

        let (_, body) = call(&app, "GET", "/api/pantry/activity?limit=1", Some("a@example.com"), None).await;
        assert_eq!(body[0]["activityType"], "item_merged");
        assert_eq!(body[0]["userName"], "B");
    }

    #[tokio::test]
    async fn duplicate_activity_is_reported_not_failed() {
        let state = test_support::state().await;
        test_support::user_in_pantry(&state, "ana@example.com", "Ana", "Kitchen42").await;
        let app = app(state);
        let event = json!({ "activityType": "recipe_cooked", "activityData": { "itemName": "Soup" } });

        let (status, first) = call(&app, "POST", "/api/pantry/activity", Some("ana@example.com"), Some(event.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["recorded"], true);
        assert_eq!(first["activity"]["description"], "Ana recipe cooked Soup");

        let (status, second) = call(&app, "POST", "/api/pantry/activity", Some("ana@example.com"), Some(event)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["recorded"], false);
    }

    #[tokio::test]
    async fn shopping_list_over_http() {
        let state = test_support::state().await;
        test_support::user_in_pantry(&state, "ana@example.com", "Ana", "Kitchen42").await;
        let app = app(state);
        let ana = Some("ana@example.com");

        let (status, _) = call(&app, "POST", "/api/pantry/items", ana, Some(json!({ "name": "Rice", "amount": 1 }))).await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, body) = call(&app, "GET", "/api/pantry/shopping/suggestions", ana, None).await;
        assert_eq!(body[0]["name"], "Rice");
        assert_eq!(body[0]["kind"], "running_low");

        let (status, body) = call(&app, "POST", "/api/pantry/shopping", ana, Some(json!({ "name": "Rice", "amount": 2 }))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["merged"], false);
        let id = body["item"]["id"].as_str().unwrap().to_string();

        let (_, body) = call(&app, "GET", "/api/pantry/shopping/suggestions", ana, None).await;
        assert_eq!(body, json!([]));

        let (_, body) = call(&app, "GET", "/api/pantry/shopping", ana, None).await;
        assert_eq!(body[0]["amount"], "2");
        assert_eq!(body[0]["addedBy"], "ana@example.com");

        let (status, _) = call(&app, "DELETE", &format!("/api/pantry/shopping/{}", id), ana, None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = call(&app, "DELETE", &format!("/api/pantry/shopping/{}", id), ana, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }
}
