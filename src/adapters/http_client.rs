use async_trait::async_trait;
use axum::body::Body as AxumBody;
use eyre::Result;
use hyper::{Request, Response, Version, header::HeaderValue};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use rustls_native_certs::load_native_certs;

use crate::ports::http_client::{HttpClient, HttpClientError, HttpClientResult};

/// HTTP client adapter using Hyper with Rustls (HTTP/1.1 + HTTP/2).
///
/// Responsibilities:
/// * Forces request version to HTTP/1.1 while allowing ALPN to negotiate h2
/// * Sets the Host header from the outgoing URI
/// * Converts between Hyper body and Axum body types
///
/// This adapter is intentionally minimal; no retries and no gateway-imposed
/// timeout — a single upstream failure surfaces immediately and the upstream
/// is the only source of deadlines.
pub struct UpstreamClientAdapter {
    client: Client<HttpsConnector<HttpConnector>, AxumBody>,
}

impl UpstreamClientAdapter {
    /// Create a new HTTP client adapter.
    pub fn new() -> Result<Self> {
        // Install default crypto provider for rustls if not already set
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false); // Allow HTTPS URLs

        let mut root_cert_store = rustls::RootCertStore::empty();
        let native_certs = load_native_certs();

        for cert in native_certs.certs {
            if root_cert_store.add(cert).is_err() {
                tracing::warn!("Failed to add native certificate to rustls RootCertStore");
            }
        }
        if !native_certs.errors.is_empty() {
            tracing::warn!(
                "Some native certificates failed to load: {:?}",
                native_certs.errors
            );
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_cert_store)
            .with_no_client_auth();

        let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let client = Client::builder(TokioExecutor::new()).build::<_, AxumBody>(https_connector);

        tracing::debug!("Created upstream HTTP client with HTTP/2 and HTTP/1.1 support");
        Ok(Self { client })
    }
}

impl Default for UpstreamClientAdapter {
    fn default() -> Self {
        Self::new().expect("Failed to create HTTP client")
    }
}

#[async_trait]
impl HttpClient for UpstreamClientAdapter {
    async fn send_request(
        &self,
        mut req: Request<AxumBody>,
    ) -> HttpClientResult<Response<AxumBody>> {
        let client = self.client.clone();

        let upstream_identifier = format!(
            "{}://{}",
            req.uri().scheme_str().unwrap_or("http"),
            req.uri()
                .authority()
                .map_or_else(|| "unknown".to_string(), |a| a.to_string())
        );
        let request_path = req.uri().path().to_string();
        let request_method = req.method().to_string();

        let span = tracing::info_span!(
            "upstream_request",
            upstream.url = %upstream_identifier,
            http.method = %request_method,
            http.path = %request_path,
            http.status_code = tracing::field::Empty,
        );
        let _enter = span.enter();

        // Set Host header from the outgoing URI
        if let Some(host_str) = req.uri().host() {
            let host_header_val = if let Some(port) = req.uri().port() {
                HeaderValue::from_str(&format!("{host_str}:{}", port.as_u16()))
                    .unwrap_or_else(|_| HeaderValue::from_static(""))
            } else {
                HeaderValue::from_str(host_str).unwrap_or_else(|_| HeaderValue::from_static(""))
            };
            if !host_header_val.is_empty() {
                req.headers_mut()
                    .insert(hyper::header::HOST, host_header_val);
            }
        } else {
            tracing::error!("Outgoing URI has no host: {}", req.uri());
            return Err(HttpClientError::InvalidRequest(
                "Outgoing URI has no host".to_string(),
            ));
        }

        let (mut parts, body) = req.into_parts();
        parts.version = Version::HTTP_11;

        tracing::debug!(
            "Sending upstream request: {} {} (Version set to HTTP/1.1, ALPN negotiates actual version)",
            parts.method,
            parts.uri
        );

        let outgoing_request = Request::from_parts(parts, body);
        let method_for_error_log = outgoing_request.method().clone();
        let uri_for_error_log = outgoing_request.uri().clone();

        match client.request(outgoing_request).await {
            Ok(response) => {
                tracing::Span::current().record("http.status_code", response.status().as_u16());

                // Convert the Hyper response body back to AxumBody. The body
                // stays a stream; nothing is buffered here.
                let (parts, hyper_body) = response.into_parts();
                Ok(Response::from_parts(parts, AxumBody::new(hyper_body)))
            }
            Err(e) => {
                tracing::Span::current().record("http.status_code", 599u16);
                tracing::error!(
                    "Error making request to upstream {} ({} {}): {}",
                    upstream_identifier,
                    method_for_error_log,
                    uri_for_error_log,
                    e
                );
                Err(HttpClientError::ConnectionError(format!(
                    "Request to {method_for_error_log} {uri_for_error_log} failed: {e}"
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_http_client_creation() {
        let client = UpstreamClientAdapter::new();
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_request_without_host_rejected() {
        let client = UpstreamClientAdapter::new().unwrap();
        let req = Request::builder()
            .uri("/no-host")
            .body(AxumBody::empty())
            .unwrap();

        match client.send_request(req).await {
            Err(HttpClientError::InvalidRequest(_)) => {}
            other => panic!("Expected InvalidRequest, got {other:?}"),
        }
    }
}
