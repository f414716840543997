//! HTTP API tests
//!
//! Exercises the router end to end over the in-memory store: JWT
//! authentication, permission checks, tenant scoping and error mapping.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use stock_transfer::{create_app, middleware::Claims, store::MemoryInventoryStore, AppState, Config};
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "api-test-secret-with-enough-length";

fn app() -> Router {
    let state = AppState::new(Arc::new(MemoryInventoryStore::new()), Config::in_memory(SECRET));
    create_app(state)
}

fn token(tenant_id: Uuid, permissions: &[&str]) -> String {
    let now = chrono::Utc::now().timestamp();
    Claims {
        sub: Uuid::new_v4().to_string(),
        tenant_id: tenant_id.to_string(),
        permissions: permissions.iter().map(|p| p.to_string()).collect(),
        exp: now + 3600,
        iat: now,
    }
    .encode(SECRET)
    .unwrap()
}

async fn call(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn create_location(app: &Router, token: &str, name: &str) -> String {
    let (status, body) = call(app, Method::POST, "/api/v1/locations", Some(token), Some(json!({ "name": name }))).await;
    assert_eq!(status, StatusCode::OK);
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_is_public() {
    let app = app();

    let (status, body) = call(&app, Method::GET, "/api/v1/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["storage"], "memory");
    assert_eq!(body["database"], "connected");
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let app = app();

    let (status, body) = call(&app, Method::GET, "/api/v1/transfers", None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_missing_permission_is_forbidden() {
    let app = app();
    let reader = token(Uuid::new_v4(), &["transfers:read"]);

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/stock/adjustments",
        Some(&reader),
        Some(json!({ "location_id": Uuid::new_v4(), "lines": [] })),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_PERMISSIONS");
}

#[tokio::test]
async fn test_transfer_lifecycle_over_http() {
    let app = app();
    let tenant = Uuid::new_v4();
    let operator = token(tenant, &["transfers:*", "stock:*", "locations:*"]);
    let origin = create_location(&app, &operator, "Bodega").await;
    let destination = create_location(&app, &operator, "Sucursal").await;
    let product = Uuid::new_v4();

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/v1/stock/adjustments",
        Some(&operator),
        Some(json!({ "location_id": origin, "lines": [{ "product_id": product, "delta": "10" }] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, draft) = call(
        &app,
        Method::POST,
        "/api/v1/transfers",
        Some(&operator),
        Some(json!({
            "origin_location_id": origin,
            "destination_location_id": destination,
            "lines": [{ "product_id": product, "quantity": "10" }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(draft["state"], "draft");
    let id = draft["id"].as_str().unwrap().to_string();
    let line_id = draft["lines"][0]["id"].as_str().unwrap().to_string();

    let (status, dispatched) = call(&app, Method::POST, &format!("/api/v1/transfers/{}/dispatch", id), Some(&operator), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dispatched["state"], "dispatched");

    let (status, receipt) = call(
        &app,
        Method::POST,
        &format!("/api/v1/transfers/{}/receive", id),
        Some(&operator),
        Some(json!({ "lines": [{ "line_id": line_id, "quantity_received": "8" }] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["transfer"]["state"], "received");
    assert_eq!(receipt["summary"]["discrepancies"][0]["discrepancy"]["kind"], "shortage");

    let (status, stock) = call(&app, Method::GET, &format!("/api/v1/stock/locations/{}", destination), Some(&operator), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stock[0]["quantity_on_hand"], "8");

    let (status, history) = call(&app, Method::GET, &format!("/api/v1/transfers/{}/history", id), Some(&operator), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 3);

    let code = draft["code"].as_str().unwrap();
    let (status, by_code) = call(&app, Method::GET, &format!("/api/v1/transfers/code/{}", code), Some(&operator), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_code["id"], id.as_str());
}

#[tokio::test]
async fn test_business_errors_map_to_statuses() {
    let app = app();
    let operator = token(Uuid::new_v4(), &["transfers:*", "locations:*"]);
    let origin = create_location(&app, &operator, "Bodega").await;
    let destination = create_location(&app, &operator, "Sucursal").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/transfers",
        Some(&operator),
        Some(json!({ "origin_location_id": origin, "destination_location_id": origin, "lines": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["field"], "destination_location_id");

    let (_, draft) = call(
        &app,
        Method::POST,
        "/api/v1/transfers",
        Some(&operator),
        Some(json!({
            "origin_location_id": origin,
            "destination_location_id": destination,
            "lines": [{ "product_id": Uuid::new_v4(), "quantity": "3" }]
        })),
    )
    .await;
    let id = draft["id"].as_str().unwrap().to_string();

    let (status, body) = call(&app, Method::POST, &format!("/api/v1/transfers/{}/dispatch", id), Some(&operator), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_STOCK");
    assert_eq!(body["error"]["details"]["shortfalls"][0]["available"], "0");

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/api/v1/transfers/{}/receive", id),
        Some(&operator),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INVALID_STATE");
    assert_eq!(body["error"]["details"]["current_state"], "draft");
    assert_eq!(body["error"]["details"]["allowed_actions"], json!(["edit", "dispatch", "cancel"]));
}

#[tokio::test]
async fn test_tenants_cannot_see_each_other() {
    let app = app();
    let ours = token(Uuid::new_v4(), &["transfers:*", "locations:*"]);
    let theirs = token(Uuid::new_v4(), &["transfers:*", "locations:*"]);
    let origin = create_location(&app, &ours, "Bodega").await;
    let destination = create_location(&app, &ours, "Sucursal").await;

    let (_, draft) = call(
        &app,
        Method::POST,
        "/api/v1/transfers",
        Some(&ours),
        Some(json!({ "origin_location_id": origin, "destination_location_id": destination })),
    )
    .await;
    let id = draft["id"].as_str().unwrap();

    let (status, _) = call(&app, Method::GET, &format!("/api/v1/transfers/{}", id), Some(&theirs), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, list) = call(&app, Method::GET, "/api/v1/locations", Some(&theirs), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(list.as_array().unwrap().is_empty());
}
