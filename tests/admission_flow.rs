// End-to-end admission tests: registration, authentication, rate limiting
// and deletion, driven through the full router with a canned upstream.
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, Response, StatusCode, header},
};
use dendrite::{
    GatewayService, HttpHandler, RequestForwarder, build_router,
    config::models::GatewayConfig,
    ports::http_client::{HttpClient, HttpClientResult},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt; // for oneshot

/// Upstream double that answers every request with a fixed JSON body.
struct StaticUpstream;

#[async_trait]
impl HttpClient for StaticUpstream {
    async fn send_request(&self, _req: Request<Body>) -> HttpClientResult<Response<Body>> {
        Ok(Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"ok":true}"#))
            .unwrap())
    }
}

const ADMIN_KEY: &str = "super-secret-admin-key";

fn test_config() -> Arc<GatewayConfig> {
    Arc::new(
        GatewayConfig::builder()
            .listen_addr("127.0.0.1:7000")
            .admin_key(ADMIN_KEY)
            .public_base_url("http://gateway.local:7000")
            .upstream("https://api.upstream.example/v1", "sk-upstream")
            .build(),
    )
}

fn test_app() -> Router {
    let config = test_config();
    let gateway = Arc::new(GatewayService::new(config.clone()));
    let forwarder = RequestForwarder::new(Arc::new(StaticUpstream), &config);
    build_router(Arc::new(HttpHandler::new(gateway, forwarder)))
}

async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn register_request(client_name: &str, client_api_key: &str, rate_limits: Value) -> Request<Body> {
    let mut body = json!({
        "adminKey": ADMIN_KEY,
        "clientName": client_name,
        "clientApiKey": client_api_key,
    });
    if !rate_limits.is_null() {
        body["rateLimits"] = rate_limits;
    }
    Request::builder()
        .method(Method::POST)
        .uri("/admin/register-client")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn proxy_request(api_key: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/v1/chat/completions")
        .header(header::AUTHORIZATION, format!("Bearer {api_key}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"model":"m","messages":[]}"#))
        .unwrap()
}

#[tokio::test]
async fn health_endpoint_is_open() {
    let app = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "OK");
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn register_then_minute_limit_applies() {
    let app = test_app();

    // Register k1 with a 2/minute quota
    let response = app
        .clone()
        .oneshot(register_request(
            "Test Client",
            "k1",
            json!({"perMinute": 2, "perDay": 100}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["clientApiKey"], "k1");
    assert_eq!(body["rateLimits"], json!({"perMinute": 2, "perDay": 100}));
    assert_eq!(body["message"], "Client Test Client registered successfully.");

    // First two requests reach the upstream
    for _ in 0..2 {
        let response = app.clone().oneshot(proxy_request("k1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"ok": true}));
    }

    // The third within the same window is denied with the minute scope
    let response = app.clone().oneshot(proxy_request("k1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        body_json(response).await["error"],
        "Rate limit exceeded. Maximum 2 requests per minute allowed."
    );

    // Usage counted the two admitted requests only; the window shows both
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/client/stats")
                .header(header::AUTHORIZATION, "Bearer k1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let stats = body_json(response).await;
    assert_eq!(stats["name"], "Test Client");
    assert_eq!(stats["apiKey"], "k1");
    assert_eq!(stats["usage"], 2);
    assert_eq!(stats["currentMinuteRequests"], 2);
    assert_eq!(stats["currentDayRequests"], 2);
    assert!(stats["lastRequest"].is_string());
}

#[tokio::test]
async fn proxy_requires_valid_bearer_key() {
    let app = test_app();

    // No Authorization header at all
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/v1/chat/completions")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        body_json(response).await["error"],
        "Access denied. No API key provided."
    );

    // A key nobody registered
    let response = app.clone().oneshot(proxy_request("ghost")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"], "Invalid API key.");
}

#[tokio::test]
async fn duplicate_registration_keeps_original_limits() {
    let app = test_app();

    let response = app
        .clone()
        .oneshot(register_request(
            "Original",
            "k1",
            json!({"perMinute": 5, "perDay": 50}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(register_request(
            "Impostor",
            "k1",
            json!({"perMinute": 999, "perDay": 9999}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Client with API key k1 already exists.");
    assert_eq!(body["existingClient"], "Original");

    // Admin enumeration still shows the original record
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/admin/client-stats?adminKey={ADMIN_KEY}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let clients = body["clients"].as_array().unwrap();
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0]["name"], "Original");
    assert_eq!(clients[0]["rateLimits"], json!({"perMinute": 5, "perDay": 50}));
}

#[tokio::test]
async fn delete_cascades_and_invalidates_key() {
    let app = test_app();

    app.clone()
        .oneshot(register_request("Doomed", "k1", Value::Null))
        .await
        .unwrap();
    // One admitted request so usage/window state exists before the delete
    let response = app.clone().oneshot(proxy_request("k1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::DELETE)
                .uri(format!("/admin/client/k1?adminKey={ADMIN_KEY}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await["message"],
        "Client Doomed deleted successfully."
    );

    // Gone from enumeration
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/admin/client-stats?adminKey={ADMIN_KEY}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    assert!(body["clients"].as_array().unwrap().is_empty());

    // The key no longer authenticates
    let response = app.clone().oneshot(proxy_request("k1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Deleting again reports not found
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::DELETE)
                .uri(format!("/admin/client/k1?adminKey={ADMIN_KEY}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "Client not found.");
}

#[tokio::test]
async fn admin_endpoints_reject_bad_admin_key() {
    let app = test_app();

    let mut register = json!({
        "adminKey": "wrong",
        "clientName": "c",
        "clientApiKey": "k",
    });
    register["rateLimits"] = Value::Null;
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/admin/register-client")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(register.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        body_json(response).await["error"],
        "Access denied. Invalid admin key."
    );

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/admin/client-stats?adminKey=wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::DELETE)
                .uri("/admin/client/k1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn client_stats_requires_bearer() {
    let app = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/client/stats")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
