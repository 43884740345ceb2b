//! Response-shape-aware forwarding to the single upstream API.
//!
//! The forwarder builds the upstream request (attaching the upstream's own
//! credential, never the caller's), classifies the expected response shape
//! before issuing the call, and then either relays the body as an opaque
//! stream or buffers it for JSON inspection. Image-generation responses get
//! their upstream resource URLs rewritten to gateway-hosted ones, and
//! upstream error bodies are normalized with absolute URLs stripped so the
//! upstream's identity never leaks to clients.
use std::sync::Arc;

use axum::body::Body as AxumBody;
use bytes::Bytes;
use http::{Method, Request, Response, StatusCode, header};
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Value, json};
use url::Url;

use crate::{config::GatewayConfig, metrics, ports::http_client::HttpClient};

/// Endpoints under this prefix serve raw image bytes.
const IMAGE_SERVE_PREFIX: &str = "images/serve/";
/// The endpoint whose JSON response embeds upstream-hosted image URLs.
const IMAGE_GENERATION_ENDPOINT: &str = "images/generations";
/// Replacement token for stripped absolute URLs in error messages.
const URL_PLACEHOLDER: &str = "the service";

static ABSOLUTE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://[^\s]+").expect("valid URL pattern"));

/// How an upstream response body will be handled, decided from the endpoint
/// path before the call is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Opaque binary relay; bytes are forwarded as they arrive.
    Stream,
    /// Body is buffered so JSON can be inspected and rewritten.
    BufferedJson,
}

/// Classify an endpoint (the path after `/v1/`) into a response mode.
pub fn classify(endpoint: &str) -> ResponseMode {
    if endpoint.starts_with(IMAGE_SERVE_PREFIX)
        || endpoint.contains("audio")
        || endpoint.contains("tts")
    {
        ResponseMode::Stream
    } else {
        ResponseMode::BufferedJson
    }
}

/// Replace every absolute URL in `text` with a generic placeholder.
pub fn strip_urls(text: &str) -> String {
    ABSOLUTE_URL.replace_all(text, URL_PLACEHOLDER).into_owned()
}

/// Shape of an upstream error body, resolved once at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ErrorBody {
    Structured {
        message: String,
        kind: String,
        code: String,
    },
    Plain(String),
    Opaque,
}

impl ErrorBody {
    fn parse(bytes: &[u8]) -> Self {
        let Ok(value) = serde_json::from_slice::<Value>(bytes) else {
            return ErrorBody::Opaque;
        };
        match value.get("error") {
            Some(Value::Object(obj)) => ErrorBody::Structured {
                message: obj
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("Request failed")
                    .to_string(),
                kind: obj
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("api_error")
                    .to_string(),
                code: obj
                    .get("code")
                    .and_then(Value::as_str)
                    .unwrap_or("api_error")
                    .to_string(),
            },
            Some(Value::String(s)) => ErrorBody::Plain(s.clone()),
            _ => ErrorBody::Opaque,
        }
    }

    /// Normalized client-facing body, with URLs stripped from messages.
    fn into_response_value(self) -> Value {
        match self {
            ErrorBody::Structured {
                message,
                kind,
                code,
            } => json!({
                "error": {
                    "message": strip_urls(&message),
                    "type": kind,
                    "code": code,
                }
            }),
            ErrorBody::Plain(message) => json!({ "error": strip_urls(&message) }),
            ErrorBody::Opaque => json!({ "error": "Request failed" }),
        }
    }
}

/// Builds and issues upstream requests and shapes their responses for the
/// caller. Every failure path maps to a normalized JSON response; `forward`
/// itself is infallible.
pub struct RequestForwarder {
    http_client: Arc<dyn HttpClient>,
    upstream_base: String,
    upstream_origin: String,
    upstream_key: String,
    public_base: String,
}

impl RequestForwarder {
    pub fn new(http_client: Arc<dyn HttpClient>, config: &GatewayConfig) -> Self {
        let upstream_base = config.upstream.base_url.trim_end_matches('/').to_string();
        // The origin (scheme://host[:port]) decides which embedded URLs are
        // the upstream's own and therefore eligible for rewriting.
        let upstream_origin = Url::parse(&upstream_base)
            .map(|u| u.origin().ascii_serialization())
            .unwrap_or_else(|_| upstream_base.clone());

        Self {
            http_client,
            upstream_base,
            upstream_origin,
            upstream_key: config.upstream.api_key.clone(),
            public_base: config.public_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Forward a request for `endpoint` (the path after `/v1/`) upstream and
    /// shape the response per the classification rules.
    pub async fn forward(
        &self,
        method: Method,
        endpoint: &str,
        query: Option<&str>,
        body: AxumBody,
    ) -> Response<AxumBody> {
        // Decide the handling mode before issuing the call
        let mode = classify(endpoint);

        let mut target = format!("{}/{}", self.upstream_base, endpoint);
        if let Some(q) = query {
            target.push('?');
            target.push_str(q);
        }

        let request = match Request::builder()
            .method(method.clone())
            .uri(target.as_str())
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.upstream_key),
            )
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
        {
            Ok(req) => req,
            Err(e) => {
                tracing::error!("Failed to build upstream request for {target}: {e}");
                return internal_error_response();
            }
        };

        let response = match self.http_client.send_request(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Error forwarding request to the upstream API: {e}");
                return internal_error_response();
            }
        };

        let status = response.status();
        metrics::increment_upstream_request_total(endpoint, method.as_str(), status.as_u16());

        if status.is_client_error() || status.is_server_error() {
            return sanitize_error(response).await;
        }

        match mode {
            ResponseMode::Stream => relay_stream(response),
            ResponseMode::BufferedJson => self.relay_buffered(endpoint, response).await,
        }
    }

    /// Buffered handling: JSON bodies may be rewritten; anything with a
    /// non-JSON content-type falls back to the opaque stream relay.
    async fn relay_buffered(
        &self,
        endpoint: &str,
        response: Response<AxumBody>,
    ) -> Response<AxumBody> {
        if !has_json_content_type(response.headers()) {
            return relay_stream(response);
        }

        let (parts, body) = response.into_parts();
        let bytes: Bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                tracing::error!("Failed reading upstream response body: {e}");
                return internal_error_response();
            }
        };

        if endpoint == IMAGE_GENERATION_ENDPOINT {
            if let Ok(mut value) = serde_json::from_slice::<Value>(&bytes) {
                if value.get("data").is_some_and(Value::is_array) {
                    self.rewrite_image_urls(&mut value);
                    return json_response(parts.status, &value);
                }
            }
        }

        // Pass every other JSON body through unmodified
        match Response::builder()
            .status(parts.status)
            .header(header::CONTENT_TYPE, "application/json")
            .body(AxumBody::from(bytes))
        {
            Ok(resp) => resp,
            Err(e) => {
                tracing::error!("Failed to build proxied response: {e}");
                internal_error_response()
            }
        }
    }

    /// Rewrite `data[].url` entries that point at the upstream's own origin
    /// to gateway-hosted URLs on the image-serving path, preserving the
    /// trailing image identifier. Non-matching URLs are left untouched.
    fn rewrite_image_urls(&self, value: &mut Value) {
        let Some(items) = value.get_mut("data").and_then(Value::as_array_mut) else {
            return;
        };

        for item in items {
            let Some(item_url) = item.get("url").and_then(Value::as_str) else {
                continue;
            };
            if !item_url.starts_with(&self.upstream_origin) {
                continue;
            }
            let Some(image_id) = item_url.rsplit('/').next().filter(|id| !id.is_empty()) else {
                continue;
            };
            let rewritten = format!(
                "{}/v1/{}{}",
                self.public_base, IMAGE_SERVE_PREFIX, image_id
            );
            if let Some(obj) = item.as_object_mut() {
                obj.insert("url".to_string(), Value::String(rewritten));
            }
        }
    }
}

fn has_json_content_type(headers: &http::HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|ct| ct.to_str().ok())
        .is_some_and(|ct| ct.contains("application/json"))
}

/// Relay an upstream response verbatim, as a stream. Headers invalidated by
/// re-framing (Content-Length, Transfer-Encoding) are dropped; the body is
/// forwarded chunk by chunk, never buffered, so arbitrarily large or slow
/// bodies work and dropping the response cancels the upstream read.
fn relay_stream(response: Response<AxumBody>) -> Response<AxumBody> {
    let (parts, body) = response.into_parts();

    let mut builder = Response::builder().status(parts.status);
    for (name, value) in parts.headers.iter() {
        if *name == header::CONTENT_LENGTH || *name == header::TRANSFER_ENCODING {
            continue;
        }
        builder = builder.header(name, value);
    }

    match builder.body(body) {
        Ok(resp) => resp,
        Err(e) => {
            tracing::error!("Failed to build stream relay response: {e}");
            internal_error_response()
        }
    }
}

/// Normalize an upstream error response, stripping any absolute URLs so the
/// upstream's identity is never exposed. The upstream status is preserved.
async fn sanitize_error(response: Response<AxumBody>) -> Response<AxumBody> {
    let (parts, body) = response.into_parts();
    let error_body = match body.collect().await {
        Ok(collected) => ErrorBody::parse(&collected.to_bytes()),
        Err(e) => {
            tracing::warn!("Failed reading upstream error body: {e}");
            ErrorBody::Opaque
        }
    };

    json_response(parts.status, &error_body.into_response_value())
}

fn json_response(status: StatusCode, value: &Value) -> Response<AxumBody> {
    match Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(AxumBody::from(value.to_string()))
    {
        Ok(resp) => resp,
        Err(e) => {
            tracing::error!("Failed to build JSON response: {e}");
            internal_error_response()
        }
    }
}

/// Generic response for transport failures and unexpected errors.
fn internal_error_response() -> Response<AxumBody> {
    let body = json!({ "error": "Internal server error" }).to_string();
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/json")
        .body(AxumBody::from(body))
        .unwrap_or_else(|_| Response::new(AxumBody::from("Internal server error")))
}
