// Response-shaping tests for the proxy path: JSON URL rewriting, opaque
// stream relay, and upstream error sanitization, driven through the full
// router with canned upstream responses.
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, Response, StatusCode, header},
};
use dendrite::{
    GatewayService, HttpHandler, RequestForwarder, build_router,
    config::models::GatewayConfig,
    ports::http_client::{HttpClient, HttpClientError, HttpClientResult},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt; // for oneshot

const ADMIN_KEY: &str = "super-secret-admin-key";

/// Upstream double yielding queued responses in order; connection errors
/// once the queue runs dry.
struct QueuedUpstream {
    responses: Mutex<VecDeque<Response<Body>>>,
}

impl QueuedUpstream {
    fn new(responses: Vec<Response<Body>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().collect()),
        })
    }
}

#[async_trait]
impl HttpClient for QueuedUpstream {
    async fn send_request(&self, _req: Request<Body>) -> HttpClientResult<Response<Body>> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| HttpClientError::ConnectionError("connection refused".to_string()))
    }
}

fn test_app(upstream: Arc<dyn HttpClient>) -> Router {
    let config = Arc::new(
        GatewayConfig::builder()
            .listen_addr("127.0.0.1:7000")
            .admin_key(ADMIN_KEY)
            .public_base_url("http://gateway.local:7000")
            .upstream("https://api.upstream.example/v1", "sk-upstream")
            .build(),
    );
    let gateway = Arc::new(GatewayService::new(config.clone()));
    let forwarder = RequestForwarder::new(upstream, &config);
    build_router(Arc::new(HttpHandler::new(gateway, forwarder)))
}

async fn register(app: &Router, api_key: &str) {
    let body = json!({
        "adminKey": ADMIN_KEY,
        "clientName": "Shaping Client",
        "clientApiKey": api_key,
        "rateLimits": {"perMinute": 100, "perDay": 1000},
    });
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/admin/register-client")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

fn bearer_request(method: Method, uri: &str, api_key: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {api_key}"))
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn image_generation_urls_are_rewritten_to_gateway() {
    let upstream_body = json!({
        "created": 1_700_000_000,
        "data": [
            {"url": "https://api.upstream.example/v1/images/serve/img-abc.png"},
            {"url": "https://cdn.elsewhere.example/img-def.png"}
        ]
    });
    let upstream = QueuedUpstream::new(vec![
        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(upstream_body.to_string()))
            .unwrap(),
    ]);
    let app = test_app(upstream);
    register(&app, "k1").await;

    let response = app
        .clone()
        .oneshot(bearer_request(
            Method::POST,
            "/v1/images/generations",
            "k1",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let data = body["data"].as_array().unwrap();
    // Upstream-hosted URL becomes gateway-hosted, image id preserved
    assert_eq!(
        data[0]["url"],
        "http://gateway.local:7000/v1/images/serve/img-abc.png"
    );
    // Foreign-host URL is left untouched
    assert_eq!(data[1]["url"], "https://cdn.elsewhere.example/img-def.png");
}

#[tokio::test]
async fn image_serving_is_relayed_as_stream() {
    let upstream = QueuedUpstream::new(vec![
        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "image/png")
            .header(header::CONTENT_LENGTH, "8")
            .header(header::TRANSFER_ENCODING, "chunked")
            .header("x-image-id", "img-abc")
            .body(Body::from(&b"\x89PNG\r\n\x1a\n"[..]))
            .unwrap(),
    ]);
    let app = test_app(upstream);
    register(&app, "k1").await;

    let response = app
        .clone()
        .oneshot(bearer_request(
            Method::GET,
            "/v1/images/serve/img-abc.png",
            "k1",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    // Framing headers from the upstream are dropped, the rest relayed
    assert!(response.headers().get(header::TRANSFER_ENCODING).is_none());
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "image/png"
    );
    assert_eq!(response.headers().get("x-image-id").unwrap(), "img-abc");

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"\x89PNG\r\n\x1a\n");
}

#[tokio::test]
async fn structured_upstream_error_is_sanitized() {
    let upstream = QueuedUpstream::new(vec![
        Response::builder()
            .status(StatusCode::BAD_GATEWAY)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({"error": {
                    "message": "failed at https://api.upstream.example/x",
                    "type": "x",
                    "code": "y"
                }})
                .to_string(),
            ))
            .unwrap(),
    ]);
    let app = test_app(upstream);
    register(&app, "k1").await;

    let response = app
        .clone()
        .oneshot(bearer_request(Method::POST, "/v1/chat/completions", "k1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(
        body_json(response).await,
        json!({"error": {"message": "failed at the service", "type": "x", "code": "y"}})
    );
}

#[tokio::test]
async fn plain_string_upstream_error_is_sanitized() {
    let upstream = QueuedUpstream::new(vec![
        Response::builder()
            .status(StatusCode::NOT_FOUND)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({"error": "model missing, see https://api.upstream.example/docs"})
                    .to_string(),
            ))
            .unwrap(),
    ]);
    let app = test_app(upstream);
    register(&app, "k1").await;

    let response = app
        .clone()
        .oneshot(bearer_request(Method::GET, "/v1/models/unknown", "k1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        body_json(response).await,
        json!({"error": "model missing, see the service"})
    );
}

#[tokio::test]
async fn upstream_transport_failure_is_internal_error() {
    // Empty queue: every send fails with a connection error
    let app = test_app(QueuedUpstream::new(vec![]));
    register(&app, "k1").await;

    let response = app
        .clone()
        .oneshot(bearer_request(Method::POST, "/v1/chat/completions", "k1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(response).await,
        json!({"error": "Internal server error"})
    );
}

#[tokio::test]
async fn responses_carry_cors_and_request_id() {
    let app = test_app(QueuedUpstream::new(vec![]));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("origin", "http://portal.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(
        headers.get("Access-Control-Allow-Origin").unwrap(),
        "http://portal.example"
    );
    assert_eq!(
        headers.get("Access-Control-Allow-Credentials").unwrap(),
        "true"
    );
    assert!(headers.contains_key("X-Request-ID"));
}
