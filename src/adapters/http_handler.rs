use std::sync::Arc;

use axum::{
    Router,
    body::Body as AxumBody,
    extract::Request,
    middleware::from_fn,
    routing::any,
};
use http::{HeaderMap, Method, Response, StatusCode, header};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

use crate::{
    adapters::{forwarder::RequestForwarder, middleware},
    config::RateLimits,
    core::{AdmissionError, GatewayService},
    metrics,
};

/// Admin request bodies are small; anything larger is malformed.
const MAX_ADMIN_BODY_BYTES: usize = 64 * 1024;

/// HTTP handler for the Dendrite gateway.
///
/// Dispatches the fixed management surface (/health, /admin/*, /client/stats)
/// and hands everything under /v1/ to the admission pipeline and forwarder.
pub struct HttpHandler {
    gateway: Arc<GatewayService>,
    forwarder: RequestForwarder,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterClientRequest {
    admin_key: Option<String>,
    client_name: Option<String>,
    client_api_key: Option<String>,
    rate_limits: Option<RateLimits>,
}

impl HttpHandler {
    pub fn new(gateway: Arc<GatewayService>, forwarder: RequestForwarder) -> Self {
        Self { gateway, forwarder }
    }

    /// Main request handler that routes requests appropriately
    pub async fn handle_request(&self, req: Request) -> Response<AxumBody> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let _timer = metrics::RequestTimer::new(&path, method.as_str());

        tracing::info!("Handling {} request to {}", method, path);

        let response = if method == Method::GET && path == "/health" {
            self.handle_health()
        } else if method == Method::POST && path == "/admin/register-client" {
            self.handle_register_client(req).await
        } else if method == Method::GET && path == "/admin/client-stats" {
            self.handle_admin_stats(req).await
        } else if method == Method::DELETE && path.starts_with("/admin/client/") {
            self.handle_delete_client(req, &path).await
        } else if method == Method::GET && path == "/client/stats" {
            self.handle_client_stats(req).await
        } else if let Some(endpoint) = path.strip_prefix("/v1/") {
            let endpoint = endpoint.to_string();
            self.handle_proxy(req, &endpoint).await
        } else {
            json_error(StatusCode::NOT_FOUND, "Not found.")
        };

        metrics::increment_request_total(&path, method.as_str(), response.status().as_u16());
        response
    }

    /// Health check endpoint: always 200, unauthenticated.
    fn handle_health(&self) -> Response<AxumBody> {
        json_response(
            StatusCode::OK,
            &json!({ "status": "OK", "message": "API gateway is running" }),
        )
    }

    /// Register a new client (admin only).
    async fn handle_register_client(&self, req: Request) -> Response<AxumBody> {
        let bytes = match axum::body::to_bytes(req.into_body(), MAX_ADMIN_BODY_BYTES).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Failed reading register-client body: {e}");
                return json_error(StatusCode::BAD_REQUEST, "Invalid request body.");
            }
        };
        let body: RegisterClientRequest = match serde_json::from_slice(&bytes) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("Malformed register-client body: {e}");
                return json_error(StatusCode::BAD_REQUEST, "Invalid JSON body.");
            }
        };

        if !self.is_admin(body.admin_key.as_deref()) {
            return json_error(StatusCode::FORBIDDEN, "Access denied. Invalid admin key.");
        }

        let (Some(client_name), Some(client_api_key)) = (body.client_name, body.client_api_key)
        else {
            return json_error(
                StatusCode::BAD_REQUEST,
                "Client name and API key are required.",
            );
        };

        match self
            .gateway
            .register_client(&client_api_key, &client_name, body.rate_limits)
            .await
        {
            Ok(record) => json_response(
                StatusCode::CREATED,
                &json!({
                    "message": format!("Client {client_name} registered successfully."),
                    "clientApiKey": record.api_key,
                    "rateLimits": record.rate_limits,
                }),
            ),
            Err(_) => {
                // Duplicate key: report the existing client, leave it untouched
                let existing = self
                    .gateway
                    .authenticate(Some(&client_api_key))
                    .await
                    .map(|record| record.name)
                    .unwrap_or_default();
                json_response(
                    StatusCode::CONFLICT,
                    &json!({
                        "error": format!("Client with API key {client_api_key} already exists."),
                        "existingClient": existing,
                    }),
                )
            }
        }
    }

    /// Enumerate stats for all clients (admin only).
    async fn handle_admin_stats(&self, req: Request) -> Response<AxumBody> {
        if !self.is_admin(query_param(&req, "adminKey").as_deref()) {
            return json_error(StatusCode::FORBIDDEN, "Access denied. Invalid admin key.");
        }

        let stats = self.gateway.all_client_stats().await;
        json_response(StatusCode::OK, &json!({ "clients": stats }))
    }

    /// Delete a client and all of its state (admin only).
    async fn handle_delete_client(&self, req: Request, path: &str) -> Response<AxumBody> {
        if !self.is_admin(query_param(&req, "adminKey").as_deref()) {
            return json_error(StatusCode::FORBIDDEN, "Access denied. Invalid admin key.");
        }

        let raw_key = path.trim_start_matches("/admin/client/");
        let api_key = urlencoding::decode(raw_key)
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| raw_key.to_string());

        match self.gateway.delete_client(&api_key).await {
            Ok(record) => json_response(
                StatusCode::OK,
                &json!({
                    "message": format!("Client {} deleted successfully.", record.name)
                }),
            ),
            Err(_) => json_error(StatusCode::NOT_FOUND, "Client not found."),
        }
    }

    /// A client's own stats (bearer auth, not rate limited).
    async fn handle_client_stats(&self, req: Request) -> Response<AxumBody> {
        match self.gateway.authenticate(bearer_token(req.headers())).await {
            Ok(record) => {
                let stats = self.gateway.client_stats(&record).await;
                match serde_json::to_value(&stats) {
                    Ok(value) => json_response(StatusCode::OK, &value),
                    Err(e) => {
                        tracing::error!("Failed to serialize client stats: {e}");
                        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
                    }
                }
            }
            Err(e) => json_error(e.status(), &e.to_string()),
        }
    }

    /// The proxy path: admission pipeline, then forwarding.
    async fn handle_proxy(&self, req: Request, endpoint: &str) -> Response<AxumBody> {
        match self.gateway.admit(bearer_token(req.headers())).await {
            Ok(record) => {
                tracing::debug!(client = %record.name, endpoint, "Request admitted");
                let method = req.method().clone();
                let query = req.uri().query().map(str::to_owned);
                self.forwarder
                    .forward(method, endpoint, query.as_deref(), req.into_body())
                    .await
            }
            Err(e) => {
                if let AdmissionError::RateLimited { scope, .. } = &e {
                    metrics::increment_rate_limited(&scope.to_string());
                }
                json_error(e.status(), &e.to_string())
            }
        }
    }

    fn is_admin(&self, provided: Option<&str>) -> bool {
        let admin_key = &self.gateway.config().admin_key;
        !admin_key.is_empty() && provided == Some(admin_key.as_str())
    }
}

/// Extract the bearer token from the Authorization header.
/// `Authorization: Bearer <clientApiKey>` — the token is the second
/// whitespace-separated field.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .split_whitespace()
        .nth(1)
}

/// Look up a single query parameter, percent-decoded.
fn query_param(req: &Request, name: &str) -> Option<String> {
    let query = req.uri().query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

fn json_response(status: StatusCode, value: &Value) -> Response<AxumBody> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(AxumBody::from(value.to_string()))
        .unwrap_or_else(|_| Response::new(AxumBody::from(value.to_string())))
}

fn json_error(status: StatusCode, message: &str) -> Response<AxumBody> {
    json_response(status, &json!({ "error": message }))
}

/// Assemble the Axum router: every path funnels into [`HttpHandler`], with
/// CORS, request-ID and timing middleware layered on top.
pub fn build_router(handler: Arc<HttpHandler>) -> Router {
    let make_request_route = |handler: Arc<HttpHandler>| {
        any(move |req: Request| {
            let handler = handler.clone();
            async move { handler.handle_request(req).await }
        })
    };

    Router::new()
        .route("/{*path}", make_request_route(handler.clone()))
        .route("/", make_request_route(handler))
        .layer(from_fn(middleware::request_timing_middleware))
        .layer(from_fn(middleware::request_id_middleware))
        .layer(from_fn(middleware::cors_middleware))
        .layer(TraceLayer::new_for_http())
}
